//! Migration of one process instance snapshot.
//!
//! [`migrate_instance`] runs the matcher, the tree transformer and every facet
//! migrator in one synchronous pass and either returns the complete migrated
//! snapshot or every failure it found. The input snapshot is never modified.

use chrono::{DateTime, Utc};
use flowshift_types::{IdGenerator, InstanceSnapshot, ProcessModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{InstanceMigrationError, InstanceValidationReport};
use crate::expression::{ExpressionResolver, PlaceholderResolver};
use crate::facets::triggers::{Armed, arm, pending_events};
use crate::facets::{self, FacetContext, OwnerIndex, TriggerContext};
use crate::lifecycle::{NoopListener, ScopeEvent, ScopeLifecycleListener, scope_events};
use crate::matcher::match_instance;
use crate::plan::MigrationPlan;
use crate::status::{MigrationProgress, MigrationStep};
use crate::transform::{materialize, place};
use crate::tree_invariants::check_tree;

/// Per-batch switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    pub skip_custom_listeners: bool,
    pub skip_io_mappings: bool,
    /// Re-arm every migrated persistent trigger from the target model.
    pub update_event_triggers: bool,
}

/// Everything shared by the instance migrations of one batch.
#[derive(Clone, Copy)]
pub struct MigrationContext<'a> {
    pub plan: &'a MigrationPlan,
    pub source: &'a ProcessModel,
    pub target: &'a ProcessModel,
    pub options: MigrationOptions,
    /// Reference time for every due date computed in the batch.
    pub now: DateTime<Utc>,
    pub resolver: &'a dyn ExpressionResolver,
    pub listener: &'a dyn ScopeLifecycleListener,
    pub default_job_retries: u32,
    pub verify_tree: bool,
}

impl<'a> MigrationContext<'a> {
    pub fn new(plan: &'a MigrationPlan, source: &'a ProcessModel, target: &'a ProcessModel) -> Self {
        Self {
            plan,
            source,
            target,
            options: MigrationOptions::default(),
            now: DateTime::<Utc>::UNIX_EPOCH,
            resolver: &PlaceholderResolver,
            listener: &NoopListener,
            default_job_retries: 3,
            verify_tree: true,
        }
    }

    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn ExpressionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_listener(mut self, listener: &'a dyn ScopeLifecycleListener) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_default_job_retries(mut self, retries: u32) -> Self {
        self.default_job_retries = retries;
        self
    }

    pub fn with_verify_tree(mut self, verify_tree: bool) -> Self {
        self.verify_tree = verify_tree;
        self
    }
}

/// A transformed instance, ready to be committed by the caller.
#[derive(Clone, Debug)]
pub struct MigratedInstance {
    pub snapshot: InstanceSnapshot,
    /// Scope removals and creations that were reported to the listener.
    pub lifecycle: Vec<ScopeEvent>,
    pub progress: MigrationProgress,
}

#[instrument(
    skip_all,
    fields(process_instance_id = %snapshot.process_instance_id)
)]
pub fn migrate_instance(
    ctx: &MigrationContext<'_>,
    snapshot: &InstanceSnapshot,
) -> Result<MigratedInstance, InstanceMigrationError> {
    let pi = snapshot.process_instance_id.as_str();
    if snapshot.process_definition_id != ctx.plan.source_model_id() {
        return Err(InstanceMigrationError::DefinitionMismatch {
            process_instance_id: pi.to_string(),
            actual: snapshot.process_definition_id.clone(),
            expected: ctx.plan.source_model_id().to_string(),
        });
    }

    let mut progress = MigrationProgress::new();
    progress.advance(MigrationStep::Validate)?;
    if snapshot.executions.root().is_none() {
        return Err(reject(
            &mut progress,
            InstanceMigrationError::MissingRoot(pi.to_string()),
        ));
    }

    let mut report = InstanceValidationReport::new(pi);
    let matched = match_instance(ctx.plan, ctx.source, ctx.target, snapshot, &mut report);
    if !report.has_failures() {
        progress.advance(MigrationStep::Match)?;
    }

    let mut tree = place(&matched, &snapshot.executions, ctx.target, &mut report);
    let mut ids = IdGenerator::new(pi).with_taken(snapshot.used_ids());
    let executions = match materialize(&mut tree, pi, ctx.target.id(), &mut ids) {
        Ok(executions) => executions,
        Err(err) => {
            warn!(error = %err, "cannot build the migrated execution tree");
            return Err(reject(&mut progress, err));
        }
    };

    let facet_ctx = FacetContext {
        plan: ctx.plan,
        source: ctx.source,
        target: ctx.target,
        update_event_triggers: ctx.options.update_event_triggers,
        snapshot,
        matched: &matched,
        tree: &tree,
        executions: &executions,
        owners: OwnerIndex::new(&matched.view),
        triggers: TriggerContext {
            process_definition_id: ctx.target.id(),
            resolver: ctx.resolver,
            now: ctx.now,
            default_job_retries: ctx.default_job_retries,
        },
    };
    let variables = facets::variables::migrate(&facet_ctx, &mut ids, &mut report);
    let mut subscriptions = facets::subscriptions::migrate(&facet_ctx, &variables, &mut report);
    subscriptions.extend(facets::compensation::migrate(&facet_ctx, &mut report));
    let mut jobs = facets::jobs::migrate(&facet_ctx);
    for armed in arm_emerging_triggers(&facet_ctx, &variables, &mut ids, &mut report) {
        match armed {
            Armed::Subscription(subscription) => subscriptions.push(subscription),
            Armed::Job(job) => jobs.push(job),
        }
    }
    let incidents = facets::incidents::migrate(&facet_ctx, &jobs, &mut report);

    if report.has_failures() {
        warn!(
            failures = report.failures.len(),
            matched = matched.view.instances.len(),
            "rejecting process instance"
        );
        return Err(reject(&mut progress, InstanceMigrationError::Rejected(report)));
    }

    if ctx.verify_tree {
        let violations = check_tree(&executions);
        if !violations.is_empty() {
            warn!(violations = violations.len(), "migrated execution tree is malformed");
            return Err(reject(
                &mut progress,
                InstanceMigrationError::MalformedTree(violations),
            ));
        }
    }

    let lifecycle = scope_events(
        &matched,
        &tree,
        pi,
        ctx.source.id(),
        ctx.target.id(),
        ctx.options.skip_custom_listeners,
        ctx.options.skip_io_mappings,
    );
    for event in &lifecycle {
        if let Err(err) = ctx.listener.on_scope_event(event) {
            warn!(activity = %err.activity_id, "scope listener failed");
            return Err(reject(&mut progress, err));
        }
    }

    progress.advance(MigrationStep::Transform)?;
    debug!(
        executions = executions.len(),
        subscriptions = subscriptions.len(),
        jobs = jobs.len(),
        incidents = incidents.len(),
        variables = variables.len(),
        scope_events = lifecycle.len(),
        "transformed process instance"
    );

    Ok(MigratedInstance {
        snapshot: InstanceSnapshot {
            process_instance_id: pi.to_string(),
            process_definition_id: ctx.target.id().to_string(),
            executions,
            subscriptions,
            jobs,
            incidents,
            variables,
        },
        lifecycle,
        progress,
    })
}

/// Move `progress` to `Rejected` and hand back the error that caused it.
fn reject(
    progress: &mut MigrationProgress,
    error: impl Into<InstanceMigrationError>,
) -> InstanceMigrationError {
    match progress.advance(MigrationStep::Reject) {
        Ok(_) => error.into(),
        Err(illegal) => illegal.into(),
    }
}

/// Arm boundary and event-subprocess triggers that no migrated trigger covers.
fn arm_emerging_triggers(
    ctx: &FacetContext<'_>,
    variables: &[flowshift_types::VariableInstance],
    ids: &mut IdGenerator,
    report: &mut InstanceValidationReport,
) -> Vec<Armed> {
    let mut armed = Vec::new();
    for idx in ctx.tree.pre_order() {
        let Some(node) = ctx.tree.node(idx) else {
            continue;
        };
        let Some(anchor) = node.scope_execution.as_ref() else {
            continue;
        };
        for event in pending_events(ctx.target, node, Some(ctx.plan)) {
            match arm(&ctx.triggers, event, anchor, ctx.executions, variables, ids) {
                Ok(Some(trigger)) => {
                    debug!(event = %event.id, execution = %anchor, "arming trigger");
                    armed.push(trigger);
                }
                Ok(None) => {}
                Err(violation) => {
                    if let Some(instance) = ctx.tree.reporting_origin(idx) {
                        ctx.report_instance(report, instance, violation);
                    }
                }
            }
        }
    }
    armed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EntityKind, InstanceViolation};
    use crate::lifecycle::{ListenerError, ScopeTransition};
    use crate::plan::MigrationPlanBuilder;
    use crate::snapshot_builder::{ActiveTransition, SnapshotBuilder};
    use crate::status::MigrationState;
    use flowshift_types::{EventTrigger, ExecutionId, SubscriptionType, TypedValue, VariableInstance};
    use std::sync::{Arc, Mutex};

    fn plan(source: &Arc<ProcessModel>, target: &Arc<ProcessModel>, pairs: &[(&str, &str)]) -> MigrationPlan {
        pairs
            .iter()
            .fold(
                MigrationPlanBuilder::new(source.clone(), target.clone()),
                |b, (s, t)| b.map_activities(*s, *t),
            )
            .build()
            .unwrap()
    }

    fn single_task(id: &str) -> Arc<ProcessModel> {
        Arc::new(ProcessModel::builder(id).user_task("userTask").build().unwrap())
    }

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<ScopeEvent>>,
        fail_on: Option<&'static str>,
    }

    impl ScopeLifecycleListener for Recorder {
        fn on_scope_event(&self, event: &ScopeEvent) -> Result<(), ListenerError> {
            if self.fail_on == Some(event.activity_id.as_str()) {
                return Err(ListenerError {
                    activity_id: event.activity_id.clone(),
                    message: "start listener threw".into(),
                });
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test_log::test]
    fn adding_a_scope_notifies_the_listener() {
        let source = single_task("proc:1");
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .sub_process("subProcess", |s| s.user_task("userTask"))
                .build()
                .unwrap(),
        );
        let plan = plan(&source, &target, &[("userTask", "userTask")]);
        let snapshot = SnapshotBuilder::new(&source, "pi").active("userTask").build().unwrap();
        let recorder = Recorder::default();
        let options = MigrationOptions {
            skip_io_mappings: true,
            ..MigrationOptions::default()
        };
        let ctx = MigrationContext::new(&plan, &source, &target)
            .with_listener(&recorder)
            .with_options(options);

        let migrated = migrate_instance(&ctx, &snapshot).unwrap();

        assert_eq!(migrated.progress.state(), MigrationState::Transformed);
        assert_eq!(migrated.snapshot.process_definition_id, "proc:2");
        insta::assert_snapshot!(migrated.snapshot.activity_instances().render(), @r"
        proc:2
          subProcess
            userTask
        ");
        let events = recorder.events.lock().unwrap();
        assert_eq!(*events, migrated.lifecycle);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, ScopeTransition::Created);
        assert_eq!(events[0].activity_id, "subProcess");
        assert!(events[0].skip_io_mappings);
        assert!(!events[0].skip_custom_listeners);
    }

    #[test]
    fn listener_failure_rejects_the_instance() {
        let source = single_task("proc:1");
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .sub_process("subProcess", |s| s.user_task("userTask"))
                .build()
                .unwrap(),
        );
        let plan = plan(&source, &target, &[("userTask", "userTask")]);
        let snapshot = SnapshotBuilder::new(&source, "pi").active("userTask").build().unwrap();
        let recorder = Recorder {
            fail_on: Some("subProcess"),
            ..Recorder::default()
        };
        let ctx = MigrationContext::new(&plan, &source, &target).with_listener(&recorder);

        let err = migrate_instance(&ctx, &snapshot).unwrap_err();
        assert!(matches!(err, InstanceMigrationError::Listener(_)));
        assert_eq!(
            err.to_string(),
            "listener for scope 'subProcess' failed: start listener threw"
        );
    }

    #[test]
    fn foreign_definition_is_rejected_before_matching() {
        let source = single_task("proc:1");
        let target = single_task("proc:2");
        let other = single_task("proc:3");
        let plan = plan(&source, &target, &[("userTask", "userTask")]);
        let snapshot = SnapshotBuilder::new(&other, "pi").active("userTask").build().unwrap();

        let err = migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "process instance 'pi' belongs to process definition 'proc:3', expected 'proc:1'"
        );
    }

    #[test]
    fn added_boundary_event_gets_a_subscription() {
        let source = single_task("proc:1");
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .user_task("userTask")
                .boundary_event(
                    "boundary",
                    "userTask",
                    EventTrigger::Message {
                        name: "Message".into(),
                    },
                )
                .build()
                .unwrap(),
        );
        let plan = plan(&source, &target, &[("userTask", "userTask")]);
        let snapshot = SnapshotBuilder::new(&source, "pi").active("userTask").build().unwrap();
        assert!(snapshot.subscriptions.is_empty());

        let migrated =
            migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot).unwrap();

        let subscriptions = &migrated.snapshot.subscriptions;
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].event_type, SubscriptionType::Message);
        assert_eq!(subscriptions[0].event_name.as_deref(), Some("Message"));
        assert_eq!(subscriptions[0].activity_id, "boundary");
        let task_scope = migrated.snapshot.executions_at("userTask")[0];
        assert!(task_scope.is_scope);
        assert_eq!(subscriptions[0].execution_id, task_scope.id);
    }

    #[test]
    fn incidents_keep_id_and_timestamp() {
        let source = Arc::new(
            ProcessModel::builder("proc:1")
                .user_task("userTask")
                .async_before()
                .build()
                .unwrap(),
        );
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .user_task("userTask")
                .async_before()
                .build()
                .unwrap(),
        );
        let plan = plan(&source, &target, &[("userTask", "userTask")]);
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .transition(ActiveTransition::before("userTask"))
            .failed_job("userTask", "boom")
            .build()
            .unwrap();

        let migrated =
            migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot).unwrap();

        let before = &snapshot.incidents[0];
        let after = &migrated.snapshot.incidents[0];
        assert_eq!(after.id, before.id);
        assert_eq!(after.incident_timestamp, before.incident_timestamp);
        assert_eq!(after.process_definition_id, "proc:2");
        assert_eq!(after.configuration, before.configuration);
        assert_eq!(migrated.snapshot.jobs[0].id, snapshot.jobs[0].id);
        assert_eq!(migrated.snapshot.jobs[0].process_definition_id, "proc:2");
    }

    #[test]
    fn scope_and_concurrent_local_variables_collide() {
        let source = Arc::new(
            ProcessModel::builder("proc:1")
                .user_task("userTask1")
                .scope()
                .user_task("userTask2")
                .build()
                .unwrap(),
        );
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .user_task("userTask1")
                .user_task("userTask2")
                .build()
                .unwrap(),
        );
        let plan = plan(
            &source,
            &target,
            &[("userTask1", "userTask1"), ("userTask2", "userTask2")],
        );
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .active("userTask1")
            .active("userTask2")
            .local_variable("userTask1", "foo", "scope")
            .concurrent_local_variable("userTask1", "foo", "concurrent")
            .build()
            .unwrap();

        let err = migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot)
            .unwrap_err();
        let InstanceMigrationError::Rejected(report) = err else {
            panic!("expected rejection, got {err}");
        };
        similar_asserts::assert_eq!(
            report.activity_instance_failures("userTask1"),
            vec![
                InstanceViolation::VariableCollision { name: "foo".into() }.to_string()
            ]
        );
    }

    #[test]
    fn unmapped_compensation_boundary_fails_on_the_root() {
        let model = |id: &str| {
            Arc::new(
                ProcessModel::builder(id)
                    .user_task("userTask1")
                    .compensation_boundary_event("compensationBoundary", "userTask1", "compensationHandler")
                    .compensation_handler("compensationHandler")
                    .user_task("userTask2")
                    .build()
                    .unwrap(),
            )
        };
        let (source, target) = (model("proc:1"), model("proc:2"));
        let plan = plan(&source, &target, &[("userTask2", "userTask2")]);
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .completed("userTask1")
            .active("userTask2")
            .build()
            .unwrap();
        assert_eq!(snapshot.subscriptions.len(), 1);

        let err = migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot)
            .unwrap_err();
        let InstanceMigrationError::Rejected(report) = err else {
            panic!("expected rejection, got {err}");
        };
        assert_eq!(
            report.activity_instance_failures("proc:1"),
            vec![
                "Cannot migrate subscription for compensation handler 'compensationHandler'. \
                 There is no migration instruction for the compensation boundary event"
                    .to_string()
            ]
        );
    }

    #[test]
    fn mapped_compensation_boundary_moves_the_subscription() {
        let model = |id: &str| {
            Arc::new(
                ProcessModel::builder(id)
                    .user_task("userTask1")
                    .compensation_boundary_event("compensationBoundary", "userTask1", "compensationHandler")
                    .compensation_handler("compensationHandler")
                    .user_task("userTask2")
                    .build()
                    .unwrap(),
            )
        };
        let (source, target) = (model("proc:1"), model("proc:2"));
        let plan = plan(
            &source,
            &target,
            &[
                ("userTask1", "userTask1"),
                ("compensationBoundary", "compensationBoundary"),
                ("userTask2", "userTask2"),
            ],
        );
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .completed("userTask1")
            .active("userTask2")
            .build()
            .unwrap();

        let migrated =
            migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot).unwrap();

        let subscription = &migrated.snapshot.subscriptions[0];
        assert_eq!(subscription.id, snapshot.subscriptions[0].id);
        assert_eq!(subscription.activity_id, "compensationHandler");
        assert_eq!(subscription.process_definition_id, "proc:2");
        assert_eq!(subscription.execution_id.as_str(), "pi");
    }

    #[test]
    fn plan_variables_land_on_the_root() {
        let source = single_task("proc:1");
        let target = single_task("proc:2");
        let plan = MigrationPlanBuilder::new(source.clone(), target.clone())
            .map_activities("userTask", "userTask")
            .set_variable("foo", TypedValue::from("new"))
            .set_variable("bar", TypedValue::from(7_i64))
            .build()
            .unwrap();
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .active("userTask")
            .variable("foo", "old")
            .build()
            .unwrap();

        let migrated =
            migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot).unwrap();

        let foo = migrated.snapshot.variable("foo").unwrap();
        assert_eq!(foo.id, snapshot.variable("foo").unwrap().id);
        assert_eq!(foo.value, TypedValue::from("new"));
        let bar = migrated.snapshot.variable("bar").unwrap();
        assert_eq!(bar.execution_id.as_str(), "pi");
        assert_eq!(bar.value, TypedValue::from(7_i64));
    }

    #[test]
    fn every_failure_is_collected() {
        let source = Arc::new(
            ProcessModel::builder("proc:1")
                .user_task("userTask1")
                .user_task("userTask2")
                .build()
                .unwrap(),
        );
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .user_task("userTask1")
                .user_task("userTask2")
                .build()
                .unwrap(),
        );
        let plan = MigrationPlanBuilder::new(source.clone(), target.clone())
            .build()
            .unwrap();
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .active("userTask1")
            .active("userTask2")
            .build()
            .unwrap();

        let err = migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot)
            .unwrap_err();
        let InstanceMigrationError::Rejected(report) = err else {
            panic!("expected rejection, got {err}");
        };
        let no_instruction = InstanceViolation::NoInstruction.to_string();
        assert_eq!(report.activity_instance_failures("userTask1"), vec![no_instruction.clone()]);
        assert_eq!(report.activity_instance_failures("userTask2"), vec![no_instruction]);
    }

    fn compensating_sub_process(id: &str) -> Arc<ProcessModel> {
        Arc::new(
            ProcessModel::builder(id)
                .sub_process("subProcess", |s| {
                    s.user_task("subTask")
                        .compensation_boundary_event("compensationBoundary", "subTask", "undoSubTask")
                        .compensation_handler("undoSubTask")
                })
                .user_task("userTask")
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn sibling_event_scopes_keep_their_own_variables() {
        let (source, target) = (compensating_sub_process("proc:1"), compensating_sub_process("proc:2"));
        let plan = plan(
            &source,
            &target,
            &[
                ("subProcess", "subProcess"),
                ("subTask", "subTask"),
                ("compensationBoundary", "compensationBoundary"),
                ("userTask", "userTask"),
            ],
        );
        let mut snapshot = SnapshotBuilder::new(&source, "pi")
            .active("userTask")
            .compensation_scope("subProcess", &["undoSubTask"])
            .compensation_scope("subProcess", &["undoSubTask"])
            .build()
            .unwrap();
        let event_scopes: Vec<ExecutionId> = snapshot
            .activity_instances()
            .event_scopes
            .iter()
            .map(|e| e.execution_id.clone())
            .collect();
        assert_eq!(event_scopes.len(), 2);
        for (n, execution_id) in event_scopes.iter().enumerate() {
            let activity_instance_id = snapshot
                .executions
                .get(execution_id)
                .and_then(|e| e.scope_instance_id.clone())
                .unwrap_or_else(|| "pi".to_string());
            snapshot.variables.push(VariableInstance {
                id: format!("variable-{n}"),
                name: "item".into(),
                value: TypedValue::from(n as i64),
                execution_id: execution_id.clone(),
                activity_instance_id,
            });
        }

        let migrated =
            migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot).unwrap();

        let after = &migrated.snapshot;
        assert_eq!(after.executions.len(), snapshot.executions.len());
        assert_eq!(check_tree(&after.executions), vec![]);
        for (n, execution_id) in event_scopes.iter().enumerate() {
            let execution = after.executions.get(execution_id).unwrap();
            assert!(execution.is_event_scope);

            let handlers: Vec<_> = after
                .subscriptions_at(execution_id)
                .iter()
                .map(|s| s.activity_id.as_str())
                .collect();
            assert_eq!(handlers, vec!["undoSubTask"]);

            let variables = after.variables_at(execution_id);
            assert_eq!(variables.len(), 1);
            assert_eq!(variables[0].id, format!("variable-{n}"));
            assert_eq!(variables[0].value, TypedValue::from(n as i64));
        }
        let mut hosts: Vec<_> = after
            .subscriptions_at(&"pi".into())
            .iter()
            .filter_map(|s| s.configuration.clone())
            .collect();
        hosts.sort();
        let mut expected: Vec<_> = event_scopes.iter().map(ToString::to_string).collect();
        expected.sort();
        assert_eq!(hosts, expected);
    }

    #[test]
    fn unmapped_compensation_start_fails_the_event_scope() {
        let model = |id: &str| {
            Arc::new(
                ProcessModel::builder(id)
                    .sub_process("subProcess", |s| {
                        s.user_task("subTask").event_sub_process("compensationSubProcess", |e| {
                            e.start_event_with("compensationStart", EventTrigger::Compensation)
                                .user_task("undoSubTask")
                        })
                    })
                    .user_task("userTask")
                    .build()
                    .unwrap(),
            )
        };
        let (source, target) = (model("proc:1"), model("proc:2"));
        let plan = plan(
            &source,
            &target,
            &[
                ("subProcess", "subProcess"),
                ("subTask", "subTask"),
                ("userTask", "userTask"),
            ],
        );
        let snapshot = SnapshotBuilder::new(&source, "pi")
            .active("userTask")
            .compensation_scope("subProcess", &["compensationSubProcess"])
            .build()
            .unwrap();

        let err = migrate_instance(&MigrationContext::new(&plan, &source, &target), &snapshot)
            .unwrap_err();
        let InstanceMigrationError::Rejected(report) = err else {
            panic!("expected rejection, got {err}");
        };
        assert_eq!(
            report.failures_for(EntityKind::EventScopeInstance, "subProcess"),
            vec![
                "Cannot migrate subscription for compensation handler 'compensationSubProcess'. \
                 There is no migration instruction for the compensation start event"
                    .to_string()
            ]
        );
    }

    #[test]
    fn rejecting_moves_progress_to_rejected() {
        let mut validating = MigrationProgress::new();
        validating.advance(MigrationStep::Validate).unwrap();
        let err = reject(&mut validating, InstanceMigrationError::MissingRoot("pi".into()));
        assert!(matches!(err, InstanceMigrationError::MissingRoot(_)));
        assert_eq!(validating.state(), MigrationState::Rejected);

        let mut matched = MigrationProgress::new();
        matched.advance(MigrationStep::Validate).unwrap();
        matched.advance(MigrationStep::Match).unwrap();
        let err = reject(&mut matched, flowshift_types::ModelError::UnknownExecution("x".into()));
        assert!(matches!(err, InstanceMigrationError::Model(_)));
        assert_eq!(matched.state(), MigrationState::Rejected);

        let mut planned = MigrationProgress::new();
        let err = reject(&mut planned, InstanceMigrationError::MissingRoot("pi".into()));
        assert!(matches!(err, InstanceMigrationError::State(_)));
    }
}
