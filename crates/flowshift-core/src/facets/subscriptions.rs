use flowshift_types::{EventSubscription, EventTrigger, SubscriptionType, VariableInstance};
use tracing::debug;

use super::triggers::resolve_name;
use super::{FacetContext, trigger_anchor};
use crate::error::InstanceValidationReport;

/// Re-anchor message, signal and conditional subscriptions.
///
/// A subscription survives when the activity instance owning it survives and
/// its event is mapped. With a trigger update the name or condition is taken
/// from the target event, otherwise the subscription is kept as is.
pub(crate) fn migrate(
    ctx: &FacetContext<'_>,
    variables: &[VariableInstance],
    report: &mut InstanceValidationReport,
) -> Vec<EventSubscription> {
    let mut migrated = Vec::new();
    for subscription in &ctx.snapshot.subscriptions {
        if subscription.event_type == SubscriptionType::Compensate {
            continue;
        }
        let Some(source_event) = ctx.source.activity(&subscription.activity_id) else {
            continue;
        };
        let Some(owner) = ctx
            .owners
            .trigger_owner(source_event, &subscription.execution_id)
        else {
            debug!(subscription = %subscription.id, "dropping subscription without owner");
            continue;
        };
        let Some(node) = ctx.surviving_node(owner) else {
            continue;
        };
        let Some(target_event) = ctx
            .plan
            .target_of(&source_event.id)
            .and_then(|t| ctx.target.activity(t))
        else {
            debug!(subscription = %subscription.id, event = %source_event.id, "removing unmapped trigger");
            continue;
        };
        let Some(anchor) = trigger_anchor(target_event, node) else {
            continue;
        };

        let mut moved = EventSubscription {
            execution_id: anchor.clone(),
            process_definition_id: ctx.triggers.process_definition_id.to_string(),
            activity_id: target_event.id.clone(),
            ..subscription.clone()
        };

        if ctx.updates_trigger(&source_event.id, target_event) {
            match &target_event.trigger {
                Some(EventTrigger::Message { name }) | Some(EventTrigger::Signal { name }) => {
                    match resolve_name(&ctx.triggers, name, ctx.executions, variables, &anchor) {
                        Ok(resolved) => moved.event_name = Some(resolved),
                        Err(violation) => {
                            ctx.report_instance(report, owner, violation);
                            continue;
                        }
                    }
                }
                Some(EventTrigger::Conditional { condition }) => {
                    moved.configuration = Some(condition.clone());
                }
                _ => {}
            }
        }
        migrated.push(moved);
    }
    migrated
}
