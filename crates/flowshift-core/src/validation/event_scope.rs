use crate::error::PlanViolation;

use super::{PlanContext, Resolved};

/// Boundary and event-subprocess start events migrate only together with the
/// activity they react to.
pub(crate) fn check(ctx: &PlanContext<'_>, resolved: &Resolved<'_>) -> Result<(), PlanViolation> {
    let (Some(source_scope), Some(target_scope)) = (
        resolved.source.event_scope_id.as_deref(),
        resolved.target.event_scope_id.as_deref(),
    ) else {
        return Ok(());
    };
    if ctx.is_mapped(source_scope, target_scope) {
        return Ok(());
    }
    Err(PlanViolation::EventScopeNotMapped {
        source_scope: source_scope.to_string(),
        target_scope: target_scope.to_string(),
    })
}
