//! Facet migrators: everything attached to executions besides the tree itself.
//!
//! Each migrator reads the source snapshot, looks up the activity instance that
//! owns a facet, and re-anchors the facet at the execution the tree transformer
//! produced for that instance. Facets of removed instances are dropped.
//!
//! - [`variables`]: re-anchoring, collision detection and plan variables.
//! - [`subscriptions`]: message, signal and conditional subscriptions.
//! - [`jobs`]: timers, async continuations and listener timeouts.
//! - [`incidents`]: incidents follow their job or execution.
//! - [`compensation`]: compensation subscriptions and their event scopes.
//! - [`triggers`]: arming triggers of scopes that gained events.

pub(crate) mod compensation;
pub(crate) mod incidents;
pub(crate) mod jobs;
pub(crate) mod subscriptions;
pub(crate) mod triggers;
pub(crate) mod variables;

use flowshift_types::{
    Activity, ActivityInstanceTree, ExecutionId, ExecutionTree, InstanceSnapshot, ProcessModel,
};
use std::collections::HashMap;

use crate::error::{EntityKind, InstanceValidationReport, InstanceViolation};
use crate::matcher::MatchedInstance;
use crate::plan::MigrationPlan;
use crate::transform::{TargetNode, TargetTree};

pub(crate) use triggers::TriggerContext;

/// Lookup from source executions to the view entries they belong to.
#[derive(Debug, Default)]
pub(crate) struct OwnerIndex {
    scope_instances: HashMap<ExecutionId, usize>,
    executed: HashMap<(ExecutionId, String), usize>,
    transitions: HashMap<ExecutionId, usize>,
    event_scopes: HashMap<ExecutionId, usize>,
}

impl OwnerIndex {
    pub(crate) fn new(view: &ActivityInstanceTree) -> Self {
        let mut index = Self::default();
        for (idx, instance) in view.instances.iter().enumerate() {
            let Some(execution) = instance.execution_ids.first() else {
                continue;
            };
            if instance.is_scope_instance {
                index.scope_instances.insert(execution.clone(), idx);
            }
            index
                .executed
                .insert((execution.clone(), instance.activity_id.clone()), idx);
        }
        for (idx, transition) in view.transitions.iter().enumerate() {
            index.transitions.insert(transition.execution_id.clone(), idx);
        }
        for (idx, scope) in view.event_scopes.iter().enumerate() {
            index.event_scopes.insert(scope.execution_id.clone(), idx);
        }
        index
    }

    pub(crate) fn scope_instance(&self, execution: &ExecutionId) -> Option<usize> {
        self.scope_instances.get(execution).copied()
    }

    /// Activity instance of `activity_id` run by `execution`.
    pub(crate) fn executed(&self, execution: &ExecutionId, activity_id: &str) -> Option<usize> {
        self.executed
            .get(&(execution.clone(), activity_id.to_string()))
            .copied()
    }

    pub(crate) fn transition(&self, execution: &ExecutionId) -> Option<usize> {
        self.transitions.get(execution).copied()
    }

    pub(crate) fn event_scope(&self, execution: &ExecutionId) -> Option<usize> {
        self.event_scopes.get(execution).copied()
    }

    /// Activity instance whose lifetime bounds a trigger of `event` on `execution`.
    ///
    /// Boundary and event-subprocess start triggers belong to the scope they
    /// listen on; catch events and receive tasks to their own instance.
    pub(crate) fn trigger_owner(&self, event: &Activity, execution: &ExecutionId) -> Option<usize> {
        if is_scope_trigger(event) {
            self.scope_instance(execution)
        } else {
            self.executed(execution, &event.id)
        }
    }
}

pub(crate) fn is_scope_trigger(event: &Activity) -> bool {
    event.is_boundary_event() || event.is_event_subprocess_start()
}

/// Execution a trigger of `event` is anchored at once `node` is materialized.
pub(crate) fn trigger_anchor(event: &Activity, node: &TargetNode) -> Option<ExecutionId> {
    if is_scope_trigger(event) {
        node.scope_execution.clone()
    } else {
        node.executing_execution.clone()
    }
}

/// Everything a facet migrator needs to know about one instance migration.
pub(crate) struct FacetContext<'a> {
    pub(crate) plan: &'a MigrationPlan,
    pub(crate) source: &'a ProcessModel,
    pub(crate) target: &'a ProcessModel,
    pub(crate) update_event_triggers: bool,
    pub(crate) snapshot: &'a InstanceSnapshot,
    pub(crate) matched: &'a MatchedInstance,
    pub(crate) tree: &'a TargetTree,
    pub(crate) executions: &'a ExecutionTree,
    pub(crate) owners: OwnerIndex,
    pub(crate) triggers: TriggerContext<'a>,
}

impl FacetContext<'_> {
    /// Target node of a surviving activity instance.
    pub(crate) fn surviving_node(&self, instance: usize) -> Option<&TargetNode> {
        if !self.matched.is_migrating(instance) {
            return None;
        }
        self.tree
            .node_of_instance(instance)
            .and_then(|n| self.tree.node(n))
    }

    /// Whether the trigger of `target_event` is re-armed from the target model.
    pub(crate) fn updates_trigger(&self, source_event_id: &str, target_event: &Activity) -> bool {
        let requested = self
            .plan
            .instruction_for(source_event_id)
            .is_some_and(|i| i.update_event_trigger);
        requested || (self.update_event_triggers && target_event.has_persistent_trigger())
    }

    pub(crate) fn report_instance(
        &self,
        report: &mut InstanceValidationReport,
        instance: usize,
        violation: InstanceViolation,
    ) {
        if let Some(ai) = self.matched.view.instances.get(instance) {
            report.add(EntityKind::ActivityInstance, &ai.id, &ai.activity_id, violation);
        }
    }
}
