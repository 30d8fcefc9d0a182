use flowshift_types::{EventTrigger, Job, JobKind};
use tracing::debug;

use super::{FacetContext, trigger_anchor};

/// Re-anchor jobs at the execution of the instance they belong to.
///
/// Timers follow their event like subscriptions do. Async continuations
/// follow their transition instance and listener timeouts their task. Due
/// dates of timers are recomputed only when the trigger is updated.
pub(crate) fn migrate(ctx: &FacetContext<'_>) -> Vec<Job> {
    let mut migrated = Vec::new();
    for job in &ctx.snapshot.jobs {
        let moved = match &job.kind {
            JobKind::TimerEvent => migrate_timer(ctx, job),
            JobKind::AsyncContinuation => ctx
                .owners
                .transition(&job.execution_id)
                .and_then(|t| ctx.tree.node_of_transition(t))
                .and_then(|n| ctx.tree.node(n))
                .and_then(|node| {
                    Some(Job {
                        execution_id: node.executing_execution.clone()?,
                        activity_id: node.activity_id.clone(),
                        ..job.clone()
                    })
                }),
            JobKind::TimeoutListener { .. } => ctx
                .owners
                .executed(&job.execution_id, &job.activity_id)
                .and_then(|owner| ctx.surviving_node(owner))
                .and_then(|node| {
                    Some(Job {
                        execution_id: node.executing_execution.clone()?,
                        activity_id: node.activity_id.clone(),
                        ..job.clone()
                    })
                }),
        };

        match moved {
            Some(moved) => migrated.push(Job {
                process_definition_id: ctx.triggers.process_definition_id.to_string(),
                ..moved
            }),
            None => debug!(job = %job.id, activity = %job.activity_id, "removing job"),
        }
    }
    migrated
}

fn migrate_timer(ctx: &FacetContext<'_>, job: &Job) -> Option<Job> {
    let source_event = ctx.source.activity(&job.activity_id)?;
    let owner = ctx.owners.trigger_owner(source_event, &job.execution_id)?;
    let node = ctx.surviving_node(owner)?;
    let target_event = ctx
        .plan
        .target_of(&source_event.id)
        .and_then(|t| ctx.target.activity(t))?;
    let anchor = trigger_anchor(target_event, node)?;

    let mut moved = Job {
        execution_id: anchor,
        activity_id: target_event.id.clone(),
        configuration: Some(target_event.id.clone()),
        ..job.clone()
    };
    if ctx.updates_trigger(&source_event.id, target_event)
        && let Some(EventTrigger::Timer(timer)) = &target_event.trigger
    {
        moved.due_date = Some(timer.due_date(ctx.triggers.now));
    }
    Some(moved)
}
