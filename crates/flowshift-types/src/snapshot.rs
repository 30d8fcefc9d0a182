use serde::{Deserialize, Serialize};

use crate::activity_instance::ActivityInstanceTree;
use crate::facets::{EventSubscription, Incident, Job, VariableInstance};
use crate::ids::ExecutionId;
use crate::runtime::{Execution, ExecutionTree};

/// Complete runtime state of one process instance, as loaded for migration.
///
/// The snapshot is a value: migration never mutates it in place but produces
/// a new snapshot, so a rejected instance is simply the unchanged input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub process_instance_id: String,
    pub process_definition_id: String,
    pub executions: ExecutionTree,
    pub subscriptions: Vec<EventSubscription>,
    pub jobs: Vec<Job>,
    pub incidents: Vec<Incident>,
    pub variables: Vec<VariableInstance>,
}

impl InstanceSnapshot {
    pub fn new(
        process_instance_id: impl Into<String>,
        process_definition_id: impl Into<String>,
    ) -> Self {
        Self {
            process_instance_id: process_instance_id.into(),
            process_definition_id: process_definition_id.into(),
            executions: ExecutionTree::new(),
            subscriptions: Vec::new(),
            jobs: Vec::new(),
            incidents: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn activity_instances(&self) -> ActivityInstanceTree {
        ActivityInstanceTree::derive(&self.executions)
    }

    /// Whether the instance has run to completion.
    pub fn is_ended(&self) -> bool {
        self.executions.is_empty()
    }

    /// Executions currently running `activity_id` (leaf occupancy, not scope ownership).
    pub fn executions_at(&self, activity_id: &str) -> Vec<&Execution> {
        self.executions
            .pre_order()
            .into_iter()
            .filter(|e| e.activity_id.as_deref() == Some(activity_id))
            .collect()
    }

    pub fn variables_at(&self, execution_id: &ExecutionId) -> Vec<&VariableInstance> {
        self.variables
            .iter()
            .filter(|v| &v.execution_id == execution_id)
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInstance> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn subscriptions_at(&self, execution_id: &ExecutionId) -> Vec<&EventSubscription> {
        self.subscriptions
            .iter()
            .filter(|s| &s.execution_id == execution_id)
            .collect()
    }

    /// Every id in use by this instance, for collision-free id generation.
    pub fn used_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for execution in self.executions.iter() {
            ids.push(execution.id.to_string());
            ids.extend(execution.activity_instance_id.iter().cloned());
            ids.extend(execution.scope_instance_id.iter().cloned());
        }
        ids.extend(self.subscriptions.iter().map(|s| s.id.clone()));
        ids.extend(self.jobs.iter().map(|j| j.id.clone()));
        ids.extend(self.incidents.iter().map(|i| i.id.clone()));
        ids.extend(self.variables.iter().map(|v| v.id.clone()));
        ids
    }
}
