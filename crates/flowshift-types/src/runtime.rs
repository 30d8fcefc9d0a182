use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ModelError;
use crate::ids::ExecutionId;

/// Phase of an asynchronous continuation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncPhase {
    /// Waiting to enter the activity.
    Before,
    /// The activity completed; waiting to leave over `sequence_flow`
    /// (`None` when the activity has at most one outgoing flow).
    After { sequence_flow: Option<String> },
}

/// Work in flight on an execution that is between two activities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub phase: AsyncPhase,
    /// Set when this continuation is the very first step of the process instance.
    pub instantiating: bool,
}

/// One node of the execution tree.
///
/// Scope executions carry the activity instance they own in
/// `scope_activity_id`/`scope_instance_id`. An execution that currently runs a
/// non-scope activity (or a leaf scope activity) carries it in
/// `activity_id`/`activity_instance_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub parent_id: Option<ExecutionId>,
    pub children: Vec<ExecutionId>,
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub is_scope: bool,
    pub is_concurrent: bool,
    pub is_active: bool,
    pub is_event_scope: bool,
    pub activity_id: Option<String>,
    pub activity_instance_id: Option<String>,
    pub scope_activity_id: Option<String>,
    pub scope_instance_id: Option<String>,
    pub transition: Option<PendingTransition>,
}

impl Execution {
    /// A bare execution with no activity and no flags set.
    pub fn new(
        id: ExecutionId,
        parent_id: Option<ExecutionId>,
        process_instance_id: impl Into<String>,
        process_definition_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            parent_id,
            children: Vec::new(),
            process_instance_id: process_instance_id.into(),
            process_definition_id: process_definition_id.into(),
            is_scope: false,
            is_concurrent: false,
            is_active: false,
            is_event_scope: false,
            activity_id: None,
            activity_instance_id: None,
            scope_activity_id: None,
            scope_instance_id: None,
            transition: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this execution currently occupies an activity (or waits on a transition).
    pub fn is_executing(&self) -> bool {
        self.activity_id.is_some()
    }
}

/// Flat execution table keyed by id with explicit parent/child links.
///
/// Children keep insertion order, which makes tree rendering and derived views
/// deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTree {
    executions: BTreeMap<ExecutionId, Execution>,
    root: Option<ExecutionId>,
}

impl ExecutionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn root_id(&self) -> Option<&ExecutionId> {
        self.root.as_ref()
    }

    pub fn root(&self) -> Option<&Execution> {
        self.root.as_ref().and_then(|id| self.executions.get(id))
    }

    pub fn get(&self, id: &ExecutionId) -> Option<&Execution> {
        self.executions.get(id)
    }

    pub fn get_mut(&mut self, id: &ExecutionId) -> Option<&mut Execution> {
        self.executions.get_mut(id)
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.executions.contains_key(id)
    }

    /// All executions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Execution> {
        self.executions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Execution> {
        self.executions.values_mut()
    }

    pub fn children(&self, id: &ExecutionId) -> impl Iterator<Item = &Execution> {
        self.executions
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|child| self.executions.get(child))
    }

    pub fn parent(&self, id: &ExecutionId) -> Option<&Execution> {
        self.executions
            .get(id)?
            .parent_id
            .as_ref()
            .and_then(|p| self.executions.get(p))
    }

    /// Executions above `id`, nearest first.
    pub fn ancestors(&self, id: &ExecutionId) -> Vec<&Execution> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(execution) = current {
            chain.push(execution);
            current = self.parent(&execution.id);
        }
        chain
    }

    /// The nearest scope execution at or above `id`.
    pub fn scope_execution_of(&self, id: &ExecutionId) -> Option<&Execution> {
        let execution = self.executions.get(id)?;
        if execution.is_scope {
            return Some(execution);
        }
        self.ancestors(id).into_iter().find(|e| e.is_scope)
    }

    /// Depth-first pre-order starting at the root.
    pub fn pre_order(&self) -> Vec<&Execution> {
        let mut order = Vec::with_capacity(self.executions.len());
        let mut stack: Vec<&ExecutionId> = self.root.iter().collect();
        while let Some(id) = stack.pop() {
            let Some(execution) = self.executions.get(id) else {
                continue;
            };
            order.push(execution);
            stack.extend(execution.children.iter().rev());
        }
        order
    }

    pub fn insert_root(&mut self, mut execution: Execution) -> Result<(), ModelError> {
        if self.executions.contains_key(&execution.id) {
            return Err(ModelError::DuplicateExecution(execution.id.to_string()));
        }
        execution.parent_id = None;
        self.root = Some(execution.id.clone());
        self.executions.insert(execution.id.clone(), execution);
        Ok(())
    }

    /// Insert `execution` under its `parent_id`, appending it to the parent's children.
    pub fn insert_child(&mut self, execution: Execution) -> Result<(), ModelError> {
        if self.executions.contains_key(&execution.id) {
            return Err(ModelError::DuplicateExecution(execution.id.to_string()));
        }
        let parent_id = execution
            .parent_id
            .clone()
            .ok_or_else(|| ModelError::UnknownExecution("<none>".into()))?;
        let parent = self
            .executions
            .get_mut(&parent_id)
            .ok_or_else(|| ModelError::UnknownExecution(parent_id.to_string()))?;
        parent.children.push(execution.id.clone());
        self.executions.insert(execution.id.clone(), execution);
        Ok(())
    }

    /// Remove an execution that has no children.
    pub fn remove_leaf(&mut self, id: &ExecutionId) -> Result<Execution, ModelError> {
        let execution = self
            .executions
            .get(id)
            .ok_or_else(|| ModelError::UnknownExecution(id.to_string()))?;
        if !execution.children.is_empty() {
            return Err(ModelError::ExecutionHasChildren(id.to_string()));
        }
        if let Some(parent_id) = execution.parent_id.clone()
            && let Some(parent) = self.executions.get_mut(&parent_id)
        {
            parent.children.retain(|c| c != id);
        }
        if self.root.as_ref() == Some(id) {
            self.root = None;
        }
        self.executions
            .remove(id)
            .ok_or_else(|| ModelError::UnknownExecution(id.to_string()))
    }

    /// Move `id` (with its subtree) under `new_parent`.
    pub fn reparent(&mut self, id: &ExecutionId, new_parent: &ExecutionId) -> Result<(), ModelError> {
        if !self.executions.contains_key(new_parent) {
            return Err(ModelError::UnknownExecution(new_parent.to_string()));
        }
        let old_parent = self
            .executions
            .get(id)
            .ok_or_else(|| ModelError::UnknownExecution(id.to_string()))?
            .parent_id
            .clone();
        if let Some(old) = old_parent.and_then(|p| self.executions.get_mut(&p)) {
            old.children.retain(|c| c != id);
        }
        if let Some(parent) = self.executions.get_mut(new_parent) {
            parent.children.push(id.clone());
        }
        if let Some(execution) = self.executions.get_mut(id) {
            execution.parent_id = Some(new_parent.clone());
        }
        Ok(())
    }
}
