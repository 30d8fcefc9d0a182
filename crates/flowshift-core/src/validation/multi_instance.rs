use crate::error::PlanViolation;

use super::{PlanContext, Resolved};

pub(crate) fn check(ctx: &PlanContext<'_>, resolved: &Resolved<'_>, violations: &mut Vec<PlanViolation>) {
    let (source, target) = (resolved.source, resolved.target);

    // Entering a multi-instance body requires an instance of the body itself.
    for body in ctx
        .target
        .ancestors(&target.id)
        .into_iter()
        .filter(|a| a.is_multi_instance_body())
    {
        if !ctx.is_target_mapped(&body.id) {
            violations.push(PlanViolation::UnmappedMultiInstanceBody {
                target_activity: target.id.clone(),
                body: body.id.clone(),
            });
        }
    }

    if source.is_multi_instance_body()
        && let Some(inner) = ctx.source.inner_activity(&source.id)
        && ctx.mapped_target(&inner.id).is_none()
    {
        violations.push(PlanViolation::RemovedMultiInstanceInnerActivity);
    }

    if target.is_multi_instance_body()
        && let Some(inner) = ctx.target.inner_activity(&target.id)
        && !ctx.is_target_mapped(&inner.id)
    {
        violations.push(PlanViolation::UnmappedMultiInstanceInnerActivity);
    }
}
