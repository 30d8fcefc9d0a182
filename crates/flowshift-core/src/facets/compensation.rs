use flowshift_types::{ActivityKind, EventSubscription, SubscriptionType};
use tracing::debug;

use super::FacetContext;
use crate::error::{EntityKind, InstanceValidationReport, InstanceViolation};

/// The owner of a compensation subscription, for placement and reporting.
#[derive(Clone, Copy, Debug)]
enum Host {
    Instance(usize),
    EventScope(usize),
}

/// Migrate compensation subscriptions.
///
/// A subscription is migrated through the event that triggers its handler: the
/// compensation boundary event for handlers, the compensation start event for
/// compensation event subprocesses, and the compensated activity itself for
/// subscriptions pointing at a completed scope. The subscription stays with
/// the closest migrating scope; its event-scope configuration is kept.
pub(crate) fn migrate(
    ctx: &FacetContext<'_>,
    report: &mut InstanceValidationReport,
) -> Vec<EventSubscription> {
    let mut migrated = Vec::new();
    for subscription in &ctx.snapshot.subscriptions {
        if subscription.event_type != SubscriptionType::Compensate {
            continue;
        }
        let Some(host) = host_of(ctx, subscription) else {
            debug!(subscription = %subscription.id, "dropping compensation subscription without scope");
            continue;
        };

        let handler = match target_handler(ctx, &subscription.activity_id) {
            Ok(handler) => handler,
            Err(Some(violation)) => {
                report_host(ctx, report, host, violation);
                continue;
            }
            Err(None) => continue,
        };

        let anchor = match host {
            Host::Instance(idx) => ctx
                .tree
                .node_of_instance(ctx.matched.migrating_ancestor(idx)),
            Host::EventScope(e) => ctx.tree.node_of_event_scope(e),
        }
        .and_then(|n| ctx.tree.node(n))
        .and_then(|node| node.scope_execution.clone());
        let Some(anchor) = anchor else {
            continue;
        };

        migrated.push(EventSubscription {
            execution_id: anchor,
            process_definition_id: ctx.triggers.process_definition_id.to_string(),
            activity_id: handler,
            ..subscription.clone()
        });
    }
    migrated
}

fn host_of(ctx: &FacetContext<'_>, subscription: &EventSubscription) -> Option<Host> {
    if let Some(scope) = ctx.owners.event_scope(&subscription.execution_id) {
        return Some(Host::EventScope(scope));
    }
    let scope = ctx
        .snapshot
        .executions
        .scope_execution_of(&subscription.execution_id)?;
    ctx.owners.scope_instance(&scope.id).map(Host::Instance)
}

/// Target handler for source handler `handler_id`.
///
/// `Err(None)` means the subscription is dropped without a failure of its own
/// because the activity it compensates already fails the instance.
fn target_handler(
    ctx: &FacetContext<'_>,
    handler_id: &str,
) -> Result<String, Option<InstanceViolation>> {
    let Some(handler) = ctx.source.activity(handler_id) else {
        return Err(None);
    };

    if handler.is_for_compensation {
        return ctx
            .source
            .compensation_boundary_for(handler_id)
            .and_then(|boundary| ctx.plan.target_of(&boundary.id))
            .and_then(|t| ctx.target.activity(t))
            .and_then(|boundary| boundary.compensation_handler.clone())
            .ok_or_else(|| {
                Some(InstanceViolation::UnmappedCompensationBoundary {
                    handler: handler_id.to_string(),
                })
            });
    }

    if handler.kind == ActivityKind::EventSubProcess
        && let Some(start) = ctx.source.compensation_start_of(handler_id)
    {
        return ctx
            .plan
            .target_of(&start.id)
            .and_then(|t| ctx.target.activity(t))
            .and_then(|start| start.parent_id.clone())
            .ok_or_else(|| {
                Some(InstanceViolation::UnmappedCompensationStart {
                    handler: handler_id.to_string(),
                })
            });
    }

    ctx.plan
        .target_of(handler_id)
        .map(str::to_string)
        .ok_or(None)
}

fn report_host(
    ctx: &FacetContext<'_>,
    report: &mut InstanceValidationReport,
    host: Host,
    violation: InstanceViolation,
) {
    match host {
        Host::Instance(idx) => ctx.report_instance(report, idx, violation),
        Host::EventScope(e) => {
            if let Some(scope) = ctx.matched.view.event_scopes.get(e) {
                report.add(
                    EntityKind::EventScopeInstance,
                    scope.execution_id.as_str(),
                    &scope.activity_id,
                    violation,
                );
            }
        }
    }
}
