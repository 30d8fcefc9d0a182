use flowshift_types::{Incident, Job};

use super::FacetContext;
use crate::error::{InstanceValidationReport, InstanceViolation};

/// Move incidents along with the job or execution they were raised on.
///
/// Only the anchor and the definition change. An incident whose anchor does
/// not survive blocks the migration.
pub(crate) fn migrate(
    ctx: &FacetContext<'_>,
    jobs: &[Job],
    report: &mut InstanceValidationReport,
) -> Vec<Incident> {
    let mut migrated = Vec::new();
    for incident in &ctx.snapshot.incidents {
        let anchor = match incident.configuration.as_deref() {
            Some(job_id) if ctx.snapshot.jobs.iter().any(|j| j.id == job_id) => jobs
                .iter()
                .find(|j| j.id == job_id)
                .map(|j| (j.execution_id.clone(), j.activity_id.clone())),
            _ => ctx
                .owners
                .executed(&incident.execution_id, &incident.activity_id)
                .and_then(|owner| ctx.surviving_node(owner))
                .and_then(|node| {
                    Some((node.executing_execution.clone()?, node.activity_id.clone()))
                }),
        };

        match anchor {
            Some((execution_id, activity_id)) => migrated.push(Incident {
                execution_id,
                activity_id,
                process_definition_id: ctx.triggers.process_definition_id.to_string(),
                ..incident.clone()
            }),
            None => ctx.report_instance(report, 0, InstanceViolation::UnmigratedIncidents),
        }
    }
    migrated
}
