//! Instantiate a process model directly at a set of activities.
//!
//! The builder lays out the requested activities the same way migration lays
//! out a target tree, so the resulting snapshot is in normal form: scopes are
//! entered on the way down, siblings become concurrent, every entered scope
//! has its boundary and event-subprocess triggers armed, and active catch
//! events and receive tasks wait on their own trigger.

use chrono::{DateTime, Utc};
use flowshift_types::{
    ActivityKind, AsyncPhase, EventSubscription, ExecutionId, IdGenerator, Incident, IncidentType,
    InstanceSnapshot, Job, JobKind, ModelError, PendingTransition, ProcessModel, SubscriptionType,
    TypedValue, VariableInstance,
};

use crate::error::InstanceViolation;
use crate::expression::PlaceholderResolver;
use crate::facets::TriggerContext;
use crate::facets::triggers::{Armed, arm, pending_events};
use crate::facets::variables::reporting_instance_id;
use crate::transform::{NodeKind, NodeOrigin, TargetNode, TargetTree, materialize};

/// An execution waiting on an asynchronous continuation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveTransition {
    activity_id: String,
    pending: PendingTransition,
}

impl ActiveTransition {
    pub fn before(activity_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            pending: PendingTransition {
                phase: AsyncPhase::Before,
                instantiating: false,
            },
        }
    }

    pub fn after(activity_id: impl Into<String>, sequence_flow: Option<&str>) -> Self {
        Self {
            activity_id: activity_id.into(),
            pending: PendingTransition {
                phase: AsyncPhase::After {
                    sequence_flow: sequence_flow.map(str::to_string),
                },
                instantiating: false,
            },
        }
    }

    /// The first step of a process instance started asynchronously.
    pub fn instantiating(activity_id: impl Into<String>) -> Self {
        Self {
            activity_id: activity_id.into(),
            pending: PendingTransition {
                phase: AsyncPhase::Before,
                instantiating: true,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotBuildError {
    #[error("activity '{0}' does not exist")]
    UnknownActivity(String),
    #[error("no active instance of activity '{0}'")]
    NotActive(String),
    #[error("activity '{activity_id}' cannot be instantiated: {violation}")]
    Placement {
        activity_id: String,
        violation: InstanceViolation,
    },
    #[error("trigger of '{activity_id}' cannot be armed: {violation}")]
    Trigger {
        activity_id: String,
        violation: InstanceViolation,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Clone, Debug)]
enum Entry {
    Active(String),
    Transition(ActiveTransition),
    /// A completed activity whose compensation boundary event subscribed its handler.
    Completed(String),
    /// A completed scope kept alive for compensation, with handlers subscribed inside it.
    CompensationScope { scope: String, handlers: Vec<String> },
}

#[derive(Clone, Debug)]
enum VariableTarget {
    Root,
    Local(String),
    ConcurrentLocal(String),
}

#[derive(Clone, Debug)]
enum PlannedIncident {
    FailedJob { activity_id: String, message: String },
    ExternalTask { activity_id: String, message: String },
}

pub struct SnapshotBuilder<'m> {
    model: &'m ProcessModel,
    process_instance_id: String,
    entries: Vec<Entry>,
    variables: Vec<(VariableTarget, String, TypedValue)>,
    incidents: Vec<PlannedIncident>,
    now: DateTime<Utc>,
    default_job_retries: u32,
}

impl<'m> SnapshotBuilder<'m> {
    pub fn new(model: &'m ProcessModel, process_instance_id: impl Into<String>) -> Self {
        Self {
            model,
            process_instance_id: process_instance_id.into(),
            entries: Vec::new(),
            variables: Vec::new(),
            incidents: Vec::new(),
            now: DateTime::<Utc>::UNIX_EPOCH,
            default_job_retries: 3,
        }
    }

    pub fn active(mut self, activity_id: impl Into<String>) -> Self {
        self.entries.push(Entry::Active(activity_id.into()));
        self
    }

    pub fn transition(mut self, transition: ActiveTransition) -> Self {
        self.entries.push(Entry::Transition(transition));
        self
    }

    pub fn completed(mut self, activity_id: impl Into<String>) -> Self {
        self.entries.push(Entry::Completed(activity_id.into()));
        self
    }

    pub fn compensation_scope(mut self, scope: impl Into<String>, handlers: &[&str]) -> Self {
        self.entries.push(Entry::CompensationScope {
            scope: scope.into(),
            handlers: handlers.iter().map(|h| h.to_string()).collect(),
        });
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.variables
            .push((VariableTarget::Root, name.into(), value.into()));
        self
    }

    /// Variable on the scope execution of `activity_id`, or on the execution running it.
    pub fn local_variable(
        mut self,
        activity_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<TypedValue>,
    ) -> Self {
        self.variables.push((
            VariableTarget::Local(activity_id.into()),
            name.into(),
            value.into(),
        ));
        self
    }

    /// Variable on the concurrent execution that `activity_id` runs under.
    pub fn concurrent_local_variable(
        mut self,
        activity_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<TypedValue>,
    ) -> Self {
        self.variables.push((
            VariableTarget::ConcurrentLocal(activity_id.into()),
            name.into(),
            value.into(),
        ));
        self
    }

    /// Exhaust the retries of the job of `activity_id` and raise an incident for it.
    pub fn failed_job(mut self, activity_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.incidents.push(PlannedIncident::FailedJob {
            activity_id: activity_id.into(),
            message: message.into(),
        });
        self
    }

    pub fn external_task_incident(
        mut self,
        activity_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.incidents.push(PlannedIncident::ExternalTask {
            activity_id: activity_id.into(),
            message: message.into(),
        });
        self
    }

    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build(self) -> Result<InstanceSnapshot, SnapshotBuildError> {
        let model = self.model;
        let pi = self.process_instance_id.as_str();
        let mut ids = IdGenerator::new(pi).with_taken([pi]);
        let mut tree = TargetTree::with_root(model.id(), Some(pi.to_string()), Some(pi.into()));

        let mut compensation = Vec::new();
        for (n, entry) in self.entries.iter().enumerate() {
            match entry {
                Entry::Active(activity_id) => {
                    let activity = model
                        .activity(activity_id)
                        .ok_or_else(|| SnapshotBuildError::UnknownActivity(activity_id.clone()))?;
                    let kind = if activity.is_scope {
                        NodeKind::Scope
                    } else {
                        NodeKind::Leaf
                    };
                    let mut node =
                        TargetNode::new(activity_id, kind, NodeOrigin::ActivityInstance(n + 1));
                    node.activity_instance_id = Some(ids.next_activity_instance_id(activity_id));
                    attach(&mut tree, model, node)?;
                }
                Entry::Transition(transition) => {
                    if !model.contains(&transition.activity_id) {
                        return Err(SnapshotBuildError::UnknownActivity(
                            transition.activity_id.clone(),
                        ));
                    }
                    let node = TargetNode::new(
                        &transition.activity_id,
                        NodeKind::Transition(transition.pending.clone()),
                        NodeOrigin::Transition(n),
                    );
                    attach(&mut tree, model, node)?;
                }
                Entry::Completed(activity_id) => {
                    let host = enter_flow_scope(&mut tree, model, activity_id)?;
                    let handlers = model
                        .events_of_scope(activity_id)
                        .filter_map(|e| e.compensation_handler.clone());
                    for handler in handlers {
                        compensation.push((host, handler, None));
                    }
                }
                Entry::CompensationScope { scope, handlers } => {
                    let host = enter_flow_scope(&mut tree, model, scope)?;
                    let mut node = TargetNode::new(scope, NodeKind::EventScope, NodeOrigin::EventScope(n));
                    node.activity_instance_id = Some(ids.next_activity_instance_id(scope));
                    let event_scope = tree.push_child(host, node);
                    for handler in handlers {
                        compensation.push((event_scope, handler.clone(), None));
                    }
                    compensation.push((host, scope.clone(), Some(event_scope)));
                }
            }
        }

        let executions = materialize(&mut tree, pi, model.id(), &mut ids)?;
        let mut snapshot = InstanceSnapshot::new(pi, model.id());

        for (target, name, value) in &self.variables {
            let execution_id = match target {
                VariableTarget::Root => ExecutionId::from(pi),
                VariableTarget::Local(activity_id) => {
                    let node = active_node(&tree, activity_id)?;
                    node.scope_execution
                        .clone()
                        .or_else(|| node.executing_execution.clone())
                        .ok_or_else(|| SnapshotBuildError::NotActive(activity_id.clone()))?
                }
                VariableTarget::ConcurrentLocal(activity_id) => {
                    let node = active_node(&tree, activity_id)?;
                    let own = node
                        .scope_execution
                        .as_ref()
                        .or(node.executing_execution.as_ref())
                        .ok_or_else(|| SnapshotBuildError::NotActive(activity_id.clone()))?;
                    std::iter::once(executions.get(own))
                        .chain(std::iter::once(executions.parent(own)))
                        .flatten()
                        .find(|e| e.is_concurrent)
                        .map(|e| e.id.clone())
                        .ok_or_else(|| SnapshotBuildError::NotActive(activity_id.clone()))?
                }
            };
            snapshot.variables.push(VariableInstance {
                id: ids.next_id("variable"),
                name: name.clone(),
                value: value.clone(),
                activity_instance_id: reporting_instance_id(&executions, &execution_id)
                    .unwrap_or_else(|| pi.to_string()),
                execution_id,
            });
        }

        let resolver = PlaceholderResolver;
        let ctx = TriggerContext {
            process_definition_id: model.id(),
            resolver: &resolver,
            now: self.now,
            default_job_retries: self.default_job_retries,
        };
        for idx in tree.pre_order() {
            let Some(node) = tree.node(idx) else {
                continue;
            };
            let mut triggers: Vec<(_, ExecutionId)> = Vec::new();
            if let Some(scope) = &node.scope_execution {
                triggers.extend(
                    pending_events(model, node, None)
                        .into_iter()
                        .map(|e| (e, scope.clone())),
                );
            }
            if let (NodeOrigin::ActivityInstance(_), Some(executing)) =
                (node.origin, &node.executing_execution)
                && let Some(activity) = model.activity(&node.activity_id)
                && waits_on_own_trigger(activity)
            {
                triggers.push((activity, executing.clone()));
            }

            for (event, anchor) in triggers {
                let armed = arm(&ctx, event, &anchor, &executions, &snapshot.variables, &mut ids)
                    .map_err(|violation| SnapshotBuildError::Trigger {
                        activity_id: event.id.clone(),
                        violation,
                    })?;
                match armed {
                    Some(Armed::Subscription(subscription)) => {
                        snapshot.subscriptions.push(subscription)
                    }
                    Some(Armed::Job(job)) => snapshot.jobs.push(job),
                    None => {}
                }
            }

            if let (NodeKind::Transition(pending), Some(executing)) =
                (&node.kind, &node.executing_execution)
            {
                let phase = match pending.phase {
                    AsyncPhase::Before => "async-before",
                    AsyncPhase::After { .. } => "async-after",
                };
                snapshot.jobs.push(Job {
                    id: ids.next_id("job"),
                    execution_id: executing.clone(),
                    process_definition_id: model.id().to_string(),
                    activity_id: node.activity_id.clone(),
                    kind: JobKind::AsyncContinuation,
                    due_date: None,
                    retries: self.default_job_retries,
                    priority: 0,
                    configuration: Some(phase.to_string()),
                    exception_message: None,
                });
            }
        }

        for (host, handler, event_scope) in compensation {
            let (Some(execution_id), configuration) = (
                tree.node(host).and_then(|n| n.scope_execution.clone()),
                event_scope
                    .and_then(|e| tree.node(e))
                    .and_then(|n| n.scope_execution.as_ref())
                    .map(ToString::to_string),
            ) else {
                continue;
            };
            snapshot.subscriptions.push(EventSubscription {
                id: ids.next_id("subscription"),
                execution_id,
                process_definition_id: model.id().to_string(),
                activity_id: handler,
                event_type: SubscriptionType::Compensate,
                event_name: None,
                configuration,
                created: self.now,
            });
        }

        for planned in &self.incidents {
            let incident = match planned {
                PlannedIncident::FailedJob {
                    activity_id,
                    message,
                } => {
                    let job = snapshot
                        .jobs
                        .iter_mut()
                        .find(|j| &j.activity_id == activity_id)
                        .ok_or_else(|| SnapshotBuildError::NotActive(activity_id.clone()))?;
                    job.retries = 0;
                    job.exception_message = Some(message.clone());
                    Incident {
                        id: ids.next_id("incident"),
                        incident_type: IncidentType::FailedJob,
                        execution_id: job.execution_id.clone(),
                        activity_id: job.activity_id.clone(),
                        process_definition_id: model.id().to_string(),
                        configuration: Some(job.id.clone()),
                        incident_timestamp: self.now,
                        message: Some(message.clone()),
                    }
                }
                PlannedIncident::ExternalTask {
                    activity_id,
                    message,
                } => {
                    let node = active_node(&tree, activity_id)?;
                    Incident {
                        id: ids.next_id("incident"),
                        incident_type: IncidentType::FailedExternalTask,
                        execution_id: node
                            .executing_execution
                            .clone()
                            .ok_or_else(|| SnapshotBuildError::NotActive(activity_id.clone()))?,
                        activity_id: activity_id.clone(),
                        process_definition_id: model.id().to_string(),
                        configuration: None,
                        incident_timestamp: self.now,
                        message: Some(message.clone()),
                    }
                }
            };
            snapshot.incidents.push(incident);
        }

        snapshot.executions = executions;
        Ok(snapshot)
    }
}

fn attach(
    tree: &mut TargetTree,
    model: &ProcessModel,
    node: TargetNode,
) -> Result<usize, SnapshotBuildError> {
    let activity_id = node.activity_id.clone();
    tree.attach(model, 0, node)
        .map_err(|violation| SnapshotBuildError::Placement {
            activity_id,
            violation,
        })
}

fn enter_flow_scope(
    tree: &mut TargetTree,
    model: &ProcessModel,
    activity_id: &str,
) -> Result<usize, SnapshotBuildError> {
    let scope = model
        .flow_scope(activity_id)
        .ok_or_else(|| SnapshotBuildError::UnknownActivity(activity_id.to_string()))?;
    tree.enter_scope(model, 0, &scope.id)
        .map_err(|violation| SnapshotBuildError::Placement {
            activity_id: activity_id.to_string(),
            violation,
        })
}

fn active_node<'t>(tree: &'t TargetTree, activity_id: &str) -> Result<&'t TargetNode, SnapshotBuildError> {
    tree.nodes
        .iter()
        .find(|n| n.activity_id == activity_id && !n.is_emerging())
        .or_else(|| tree.nodes.iter().find(|n| n.activity_id == activity_id))
        .ok_or_else(|| SnapshotBuildError::NotActive(activity_id.to_string()))
}

/// Catch events and receive tasks subscribe for themselves while active.
fn waits_on_own_trigger(activity: &flowshift_types::Activity) -> bool {
    matches!(
        activity.kind,
        ActivityKind::IntermediateCatchEvent | ActivityKind::ReceiveTask
    ) && activity.trigger.as_ref().is_some_and(|t| t.is_persistent())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree_invariants::check_tree;
    use flowshift_types::{ActivityInstanceTree, EventTrigger, TimerDefinition};

    fn render(snapshot: &InstanceSnapshot) -> String {
        ActivityInstanceTree::derive(&snapshot.executions).render()
    }

    #[test]
    fn single_task_runs_on_root() {
        let model = ProcessModel::builder("proc:1").user_task("userTask").build().unwrap();
        let snapshot = SnapshotBuilder::new(&model, "pi").active("userTask").build().unwrap();

        assert_eq!(snapshot.executions.len(), 1);
        let root = snapshot.executions.root().unwrap();
        assert_eq!(root.id.as_str(), "pi");
        assert_eq!(root.activity_id.as_deref(), Some("userTask"));
        assert_eq!(check_tree(&snapshot.executions), vec![]);
    }

    #[test]
    fn nested_concurrent_tasks_share_their_scope() {
        let model = ProcessModel::builder("proc:1")
            .sub_process("subProcess", |s| s.user_task("userTask1").user_task("userTask2"))
            .build()
            .unwrap();
        let snapshot = SnapshotBuilder::new(&model, "pi")
            .active("userTask1")
            .active("userTask2")
            .build()
            .unwrap();

        insta::assert_snapshot!(render(&snapshot), @r"
        proc:1
          subProcess
            userTask1
            userTask2
        ");
        assert_eq!(snapshot.executions.len(), 4);
        assert_eq!(check_tree(&snapshot.executions), vec![]);
    }

    #[test]
    fn entered_scopes_arm_their_triggers() {
        let model = ProcessModel::builder("proc:1")
            .user_task("userTask")
            .boundary_event(
                "boundary",
                "userTask",
                EventTrigger::Message {
                    name: "Message".into(),
                },
            )
            .intermediate_catch_event(
                "timerCatch",
                EventTrigger::Timer(TimerDefinition::Duration { seconds: 60 }),
            )
            .build()
            .unwrap();
        let snapshot = SnapshotBuilder::new(&model, "pi")
            .active("userTask")
            .active("timerCatch")
            .build()
            .unwrap();

        assert_eq!(snapshot.subscriptions.len(), 1);
        let subscription = &snapshot.subscriptions[0];
        assert_eq!(subscription.event_name.as_deref(), Some("Message"));
        let task_scope = snapshot.executions_at("userTask")[0];
        assert!(task_scope.is_scope);
        assert_eq!(subscription.execution_id, task_scope.id);

        assert_eq!(snapshot.jobs.len(), 1);
        assert_eq!(snapshot.jobs[0].activity_id, "timerCatch");
        assert_eq!(
            snapshot.jobs[0].execution_id,
            snapshot.executions_at("timerCatch")[0].id
        );
    }

    #[test]
    fn transitions_get_async_jobs() {
        let model = ProcessModel::builder("proc:1")
            .user_task("userTask")
            .async_before()
            .build()
            .unwrap();
        let snapshot = SnapshotBuilder::new(&model, "pi")
            .transition(ActiveTransition::before("userTask"))
            .failed_job("userTask", "boom")
            .build()
            .unwrap();

        assert_eq!(render(&snapshot), "proc:1\n  -> userTask\n");
        let job = &snapshot.jobs[0];
        assert_eq!(job.kind, JobKind::AsyncContinuation);
        assert_eq!(job.retries, 0);
        let incident = &snapshot.incidents[0];
        assert_eq!(incident.configuration.as_deref(), Some(job.id.as_str()));
        assert_eq!(incident.execution_id, job.execution_id);
    }

    #[test]
    fn compensation_scope_keeps_event_scope_execution() {
        let model = ProcessModel::builder("proc:1")
            .sub_process("subProcess", |s| {
                s.user_task("subTask")
                    .compensation_boundary_event("compensationBoundary", "subTask", "undoSubTask")
                    .compensation_handler("undoSubTask")
            })
            .user_task("userTask")
            .build()
            .unwrap();
        let snapshot = SnapshotBuilder::new(&model, "pi")
            .active("userTask")
            .compensation_scope("subProcess", &["undoSubTask"])
            .build()
            .unwrap();

        let view = snapshot.activity_instances();
        assert_eq!(view.event_scopes.len(), 1);
        let event_scope = &view.event_scopes[0].execution_id;
        let inner: Vec<_> = snapshot
            .subscriptions_at(event_scope)
            .iter()
            .map(|s| s.activity_id.clone())
            .collect();
        assert_eq!(inner, vec!["undoSubTask"]);
        let outer = snapshot.subscriptions_at(&"pi".into());
        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].activity_id, "subProcess");
        assert_eq!(outer[0].configuration.as_deref(), Some(event_scope.as_str()));
        assert_eq!(check_tree(&snapshot.executions), vec![]);
    }

    #[test]
    fn unknown_activity_is_an_error() {
        let model = ProcessModel::builder("proc:1").user_task("userTask").build().unwrap();
        let err = SnapshotBuilder::new(&model, "pi").active("missing").build().unwrap_err();
        assert_eq!(err.to_string(), "activity 'missing' does not exist");
    }
}
