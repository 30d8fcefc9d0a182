use crate::error::PlanViolation;
use crate::plan::RawInstruction;

use super::{PlanContext, Resolved};

/// Resolve both activities, or report every missing or null id.
pub(crate) fn resolve<'a>(
    ctx: &PlanContext<'a>,
    raw: &'a RawInstruction,
) -> Result<Resolved<'a>, Vec<PlanViolation>> {
    let mut missing = Vec::new();

    let source = match raw.source_activity_id.as_deref() {
        None => {
            missing.push(PlanViolation::SourceActivityIdNull);
            None
        }
        Some(id) => {
            let activity = ctx.source.activity(id);
            if activity.is_none() {
                missing.push(PlanViolation::SourceActivityMissing {
                    activity_id: id.to_string(),
                });
            }
            activity
        }
    };
    let target = match raw.target_activity_id.as_deref() {
        None => {
            missing.push(PlanViolation::TargetActivityIdNull);
            None
        }
        Some(id) => {
            let activity = ctx.target.activity(id);
            if activity.is_none() {
                missing.push(PlanViolation::TargetActivityMissing {
                    activity_id: id.to_string(),
                });
            }
            activity
        }
    };

    match (source, target) {
        (Some(source), Some(target)) => Ok(Resolved {
            raw,
            source,
            target,
        }),
        _ => Err(missing),
    }
}

/// Each source activity may appear in at most one instruction.
pub(crate) fn check_unique(ctx: &PlanContext<'_>, raw: &RawInstruction) -> Result<(), PlanViolation> {
    let Some(source_id) = raw.source_activity_id.as_deref() else {
        return Ok(());
    };
    let count = ctx
        .instructions
        .iter()
        .filter(|other| other.source_activity_id.as_deref() == Some(source_id))
        .count();
    if count > 1 {
        return Err(PlanViolation::MultipleMappings {
            activity_id: source_id.to_string(),
        });
    }
    Ok(())
}
