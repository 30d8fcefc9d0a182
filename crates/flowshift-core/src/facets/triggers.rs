use chrono::{DateTime, Utc};
use flowshift_types::{
    Activity, EventSubscription, EventTrigger, ExecutionId, ExecutionTree, IdGenerator, Job,
    JobKind, ProcessModel, SubscriptionType, VariableInstance,
};

use super::variables::lookup_visible;
use crate::error::InstanceViolation;
use crate::expression::ExpressionResolver;
use crate::plan::MigrationPlan;
use crate::transform::{NodeOrigin, TargetNode};

/// Inputs for arming triggers from a model.
#[derive(Clone, Copy)]
pub(crate) struct TriggerContext<'a> {
    pub(crate) process_definition_id: &'a str,
    pub(crate) resolver: &'a dyn ExpressionResolver,
    pub(crate) now: DateTime<Utc>,
    pub(crate) default_job_retries: u32,
}

/// A trigger armed at an execution.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Armed {
    Subscription(EventSubscription),
    Job(Job),
}

/// Events of scope node `node` that need a fresh trigger.
///
/// Newly entered scopes arm every event. Scopes that existed before keep the
/// triggers they had, so only events no instruction maps onto are armed.
pub(crate) fn pending_events<'m>(
    model: &'m ProcessModel,
    node: &TargetNode,
    plan: Option<&MigrationPlan>,
) -> Vec<&'m Activity> {
    if !node.owns_scope() {
        return Vec::new();
    }
    model
        .events_of_scope(&node.activity_id)
        .filter(|event| event.has_persistent_trigger())
        .filter(|event| match (plan, node.origin) {
            (None, _) | (_, NodeOrigin::Emerging) => true,
            (Some(plan), _) => !plan.is_target_mapped(&event.id),
        })
        .collect()
}

/// Resolve a message or signal name against the variables visible from `anchor`.
pub(crate) fn resolve_name(
    ctx: &TriggerContext<'_>,
    expression: &str,
    executions: &ExecutionTree,
    variables: &[VariableInstance],
    anchor: &ExecutionId,
) -> Result<String, InstanceViolation> {
    let lookup = |name: &str| {
        lookup_visible(executions, variables, anchor, name).map(|v| v.value.as_text())
    };
    ctx.resolver.resolve(expression, &lookup)
}

/// Arm the trigger `event` declares at `anchor`, if it persists while armed.
pub(crate) fn arm(
    ctx: &TriggerContext<'_>,
    event: &Activity,
    anchor: &ExecutionId,
    executions: &ExecutionTree,
    variables: &[VariableInstance],
    ids: &mut IdGenerator,
) -> Result<Option<Armed>, InstanceViolation> {
    let subscription = |event_type, event_name, configuration, id| EventSubscription {
        id,
        execution_id: anchor.clone(),
        process_definition_id: ctx.process_definition_id.to_string(),
        activity_id: event.id.clone(),
        event_type,
        event_name,
        configuration,
        created: ctx.now,
    };

    let armed = match &event.trigger {
        Some(EventTrigger::Message { name }) => {
            let name = resolve_name(ctx, name, executions, variables, anchor)?;
            Armed::Subscription(subscription(
                SubscriptionType::Message,
                Some(name),
                None,
                ids.next_id("subscription"),
            ))
        }
        Some(EventTrigger::Signal { name }) => {
            let name = resolve_name(ctx, name, executions, variables, anchor)?;
            Armed::Subscription(subscription(
                SubscriptionType::Signal,
                Some(name),
                None,
                ids.next_id("subscription"),
            ))
        }
        Some(EventTrigger::Conditional { condition }) => Armed::Subscription(subscription(
            SubscriptionType::Conditional,
            None,
            Some(condition.clone()),
            ids.next_id("subscription"),
        )),
        Some(EventTrigger::Timer(timer)) => Armed::Job(Job {
            id: ids.next_id("job"),
            execution_id: anchor.clone(),
            process_definition_id: ctx.process_definition_id.to_string(),
            activity_id: event.id.clone(),
            kind: JobKind::TimerEvent,
            due_date: Some(timer.due_date(ctx.now)),
            retries: ctx.default_job_retries,
            priority: 0,
            configuration: Some(event.id.clone()),
            exception_message: None,
        }),
        _ => return Ok(None),
    };
    Ok(Some(armed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::PlaceholderResolver;
    use crate::plan::MigrationPlanBuilder;
    use crate::transform::NodeKind;
    use flowshift_types::{Execution, TimerDefinition, TypedValue};
    use std::sync::Arc;

    fn model() -> ProcessModel {
        ProcessModel::builder("proc:2")
            .user_task("userTask")
            .boundary_event(
                "message",
                "userTask",
                EventTrigger::Message {
                    name: "msg-${suffix}".into(),
                },
            )
            .boundary_event(
                "timer",
                "userTask",
                EventTrigger::Timer(TimerDefinition::Duration { seconds: 30 }),
            )
            .boundary_event("error", "userTask", EventTrigger::Error { code: None })
            .build()
            .unwrap()
    }

    fn executions() -> ExecutionTree {
        let mut tree = ExecutionTree::new();
        tree.insert_root(Execution {
            is_scope: true,
            ..Execution::new("pi".into(), None, "pi", "proc:2")
        })
        .unwrap();
        tree
    }

    #[test]
    fn arms_subscriptions_and_timers() {
        let model = model();
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let ctx = TriggerContext {
            process_definition_id: "proc:2",
            resolver: &PlaceholderResolver,
            now,
            default_job_retries: 3,
        };
        let executions = executions();
        let variables = vec![VariableInstance {
            id: "v1".into(),
            name: "suffix".into(),
            value: TypedValue::from("a"),
            execution_id: "pi".into(),
            activity_instance_id: "pi".into(),
        }];
        let mut ids = IdGenerator::new("pi");
        let anchor = ExecutionId::from("pi");

        let message = model.activity("message").unwrap();
        let Some(Armed::Subscription(sub)) =
            arm(&ctx, message, &anchor, &executions, &variables, &mut ids).unwrap()
        else {
            panic!("expected a subscription");
        };
        assert_eq!(sub.event_name.as_deref(), Some("msg-a"));
        assert_eq!(sub.event_type, SubscriptionType::Message);

        let timer = model.activity("timer").unwrap();
        let Some(Armed::Job(job)) =
            arm(&ctx, timer, &anchor, &executions, &variables, &mut ids).unwrap()
        else {
            panic!("expected a job");
        };
        assert_eq!(job.due_date, Some(now + chrono::Duration::seconds(30)));
        assert_eq!(job.retries, 3);

        let error = model.activity("error").unwrap();
        assert_eq!(arm(&ctx, error, &anchor, &executions, &variables, &mut ids), Ok(None));
    }

    #[test]
    fn unresolvable_names_fail() {
        let model = model();
        let ctx = TriggerContext {
            process_definition_id: "proc:2",
            resolver: &PlaceholderResolver,
            now: DateTime::<Utc>::UNIX_EPOCH,
            default_job_retries: 3,
        };
        let err = arm(
            &ctx,
            model.activity("message").unwrap(),
            &ExecutionId::from("pi"),
            &executions(),
            &[],
            &mut IdGenerator::new("pi"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot resolve expression 'msg-${suffix}': unknown variable 'suffix'"
        );
    }

    #[test]
    fn migrated_scopes_only_arm_unmapped_events() {
        let source = Arc::new(model());
        let target = Arc::new(model());
        let plan = MigrationPlanBuilder::new(source, target.clone())
            .map_activities("userTask", "userTask")
            .map_activities("timer", "timer")
            .build()
            .unwrap();
        let migrated = TargetNode::new("userTask", NodeKind::Scope, NodeOrigin::ActivityInstance(1));
        let emerging = TargetNode::new("userTask", NodeKind::Scope, NodeOrigin::Emerging);

        let ids = |events: Vec<&Activity>| events.iter().map(|a| a.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(pending_events(&target, &migrated, Some(&plan))), vec!["message"]);
        assert_eq!(
            ids(pending_events(&target, &emerging, Some(&plan))),
            vec!["message", "timer"]
        );
    }
}
