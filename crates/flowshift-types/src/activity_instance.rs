//! Activity-instance view derived from an execution tree.
//!
//! Activity instances are never stored; they are recomputed from the
//! `scope_*` and `activity_*` fields of executions. Event-scope executions are
//! kept out of the activity-instance tree and reported separately, as are
//! executions waiting on an asynchronous continuation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ids::ExecutionId;
use crate::runtime::{AsyncPhase, Execution, ExecutionTree};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInstance {
    pub id: String,
    pub activity_id: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub transitions: Vec<usize>,
    pub execution_ids: Vec<ExecutionId>,
    /// Whether the instance is owned by a scope execution.
    pub is_scope_instance: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionInstance {
    /// Transition instances are identified by their execution.
    pub id: String,
    pub activity_id: String,
    pub execution_id: ExecutionId,
    pub parent: usize,
    pub phase: AsyncPhase,
    pub instantiating: bool,
}

/// An execution kept alive only to host compensation subscriptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScopeInstance {
    pub execution_id: ExecutionId,
    pub activity_id: String,
    /// Enclosing activity instance.
    pub parent: usize,
    /// Enclosing event-scope instance, for nested compensation scopes.
    pub parent_event_scope: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInstanceTree {
    pub instances: Vec<ActivityInstance>,
    pub transitions: Vec<TransitionInstance>,
    pub event_scopes: Vec<EventScopeInstance>,
}

impl ActivityInstanceTree {
    /// Derive the view from `tree`. The root activity instance has index 0.
    pub fn derive(tree: &ExecutionTree) -> Self {
        let mut view = Self::default();
        let mut scope_instance: HashMap<&ExecutionId, usize> = HashMap::new();
        let mut event_scope: HashMap<&ExecutionId, usize> = HashMap::new();

        for execution in tree.pre_order() {
            if execution.is_root() {
                let idx = view.push_instance(None, scope_owner(execution), execution, true);
                scope_instance.insert(&execution.id, idx);
                view.push_executed(&scope_instance, tree, execution);
                continue;
            }

            if execution.is_event_scope {
                let parent_event_scope = execution
                    .parent_id
                    .as_ref()
                    .and_then(|p| event_scope.get(p).copied());
                let Some(parent) = enclosing_instance(&scope_instance, tree, execution) else {
                    continue;
                };
                let idx = view.event_scopes.len();
                view.event_scopes.push(EventScopeInstance {
                    execution_id: execution.id.clone(),
                    activity_id: execution
                        .scope_activity_id
                        .clone()
                        .or_else(|| execution.activity_id.clone())
                        .unwrap_or_default(),
                    parent,
                    parent_event_scope,
                    children: Vec::new(),
                });
                if let Some(p) = parent_event_scope {
                    view.event_scopes[p].children.push(idx);
                }
                event_scope.insert(&execution.id, idx);
                continue;
            }

            // Executions below an event scope belong to the compensated state.
            if tree.ancestors(&execution.id).iter().any(|e| e.is_event_scope) {
                continue;
            }

            if execution.is_scope {
                let Some(parent) = enclosing_instance(&scope_instance, tree, execution) else {
                    continue;
                };
                let idx =
                    view.push_instance(Some(parent), scope_owner(execution), execution, true);
                scope_instance.insert(&execution.id, idx);
            }
            view.push_executed(&scope_instance, tree, execution);
        }

        view
    }

    fn push_instance(
        &mut self,
        parent: Option<usize>,
        (activity_id, instance_id): (String, String),
        execution: &Execution,
        is_scope_instance: bool,
    ) -> usize {
        let idx = self.instances.len();
        self.instances.push(ActivityInstance {
            id: instance_id,
            activity_id,
            parent,
            children: Vec::new(),
            transitions: Vec::new(),
            execution_ids: vec![execution.id.clone()],
            is_scope_instance,
        });
        if let Some(p) = parent {
            self.instances[p].children.push(idx);
        }
        idx
    }

    /// Record the non-scope activity or transition that `execution` runs.
    fn push_executed(
        &mut self,
        scope_instance: &HashMap<&ExecutionId, usize>,
        tree: &ExecutionTree,
        execution: &Execution,
    ) {
        let Some(activity_id) = execution.activity_id.clone() else {
            return;
        };
        let owner = if execution.is_scope {
            scope_instance.get(&execution.id).copied()
        } else {
            enclosing_instance(scope_instance, tree, execution)
        };
        let Some(owner) = owner else {
            return;
        };

        if let Some(transition) = &execution.transition {
            let idx = self.transitions.len();
            self.transitions.push(TransitionInstance {
                id: execution.id.to_string(),
                activity_id,
                execution_id: execution.id.clone(),
                parent: owner,
                phase: transition.phase.clone(),
                instantiating: transition.instantiating,
            });
            self.instances[owner].transitions.push(idx);
            return;
        }

        let Some(instance_id) = execution.activity_instance_id.clone() else {
            return;
        };
        if execution.is_scope && execution.scope_instance_id.as_ref() == Some(&instance_id) {
            // Leaf scope activity: already represented by its scope instance.
            return;
        }
        self.push_instance(Some(owner), (activity_id, instance_id), execution, false);
    }

    pub fn root(&self) -> Option<&ActivityInstance> {
        self.instances.first()
    }

    pub fn by_activity(&self, activity_id: &str) -> Vec<&ActivityInstance> {
        self.instances
            .iter()
            .filter(|i| i.activity_id == activity_id)
            .collect()
    }

    pub fn transitions_for(&self, activity_id: &str) -> Vec<&TransitionInstance> {
        self.transitions
            .iter()
            .filter(|t| t.activity_id == activity_id)
            .collect()
    }

    /// Whether the instance has neither child instances nor transitions.
    pub fn is_leaf(&self, idx: usize) -> bool {
        self.instances
            .get(idx)
            .is_some_and(|i| i.children.is_empty() && i.transitions.is_empty())
    }

    /// Indented rendering of activity ids; transitions are prefixed with `->`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.instances.is_empty() {
            self.render_node(0, 0, &mut out);
        }
        out
    }

    fn render_node(&self, idx: usize, depth: usize, out: &mut String) {
        let instance = &self.instances[idx];
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), instance.activity_id);
        for child in &instance.children {
            self.render_node(*child, depth + 1, out);
        }
        for t in &instance.transitions {
            let _ = writeln!(
                out,
                "{}-> {}",
                "  ".repeat(depth + 1),
                self.transitions[*t].activity_id
            );
        }
    }
}

fn scope_owner(execution: &Execution) -> (String, String) {
    (
        execution
            .scope_activity_id
            .clone()
            .unwrap_or_else(|| execution.process_definition_id.clone()),
        execution
            .scope_instance_id
            .clone()
            .unwrap_or_else(|| execution.process_instance_id.clone()),
    )
}

/// Activity instance of the nearest scope execution strictly above `execution`.
fn enclosing_instance(
    scope_instance: &HashMap<&ExecutionId, usize>,
    tree: &ExecutionTree,
    execution: &Execution,
) -> Option<usize> {
    tree.ancestors(&execution.id)
        .into_iter()
        .filter(|e| e.is_scope && !e.is_event_scope)
        .find_map(|e| scope_instance.get(&e.id).copied())
}
