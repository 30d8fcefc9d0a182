//! Scope lifecycle notifications.
//!
//! Removing a scope runs its end listeners and output mappings; creating one
//! runs start listeners and input mappings. The core does not execute either,
//! it reports the scopes to a [`ScopeLifecycleListener`] once the instance has
//! been transformed and validated.

use flowshift_types::ExecutionId;
use serde::{Deserialize, Serialize};

use crate::matcher::MatchedInstance;
use crate::transform::TargetTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeTransition {
    Removed,
    Created,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeEvent {
    pub transition: ScopeTransition,
    pub process_instance_id: String,
    /// Source definition for removed scopes, target definition for created ones.
    pub process_definition_id: String,
    pub activity_id: String,
    pub activity_instance_id: String,
    pub execution_id: ExecutionId,
    pub skip_custom_listeners: bool,
    pub skip_io_mappings: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("listener for scope '{activity_id}' failed: {message}")]
pub struct ListenerError {
    pub activity_id: String,
    pub message: String,
}

/// Invokes listeners and I/O mappings of scopes touched by a migration.
pub trait ScopeLifecycleListener: Send + Sync {
    fn on_scope_event(&self, event: &ScopeEvent) -> Result<(), ListenerError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl ScopeLifecycleListener for NoopListener {
    fn on_scope_event(&self, _event: &ScopeEvent) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Removed scopes innermost first, then created scopes outermost first.
pub fn scope_events(
    matched: &MatchedInstance,
    tree: &TargetTree,
    process_instance_id: &str,
    source_definition_id: &str,
    target_definition_id: &str,
    skip_custom_listeners: bool,
    skip_io_mappings: bool,
) -> Vec<ScopeEvent> {
    let event = |transition, definition: &str, activity_id: &str, instance: &str, execution: &ExecutionId| {
        ScopeEvent {
            transition,
            process_instance_id: process_instance_id.to_string(),
            process_definition_id: definition.to_string(),
            activity_id: activity_id.to_string(),
            activity_instance_id: instance.to_string(),
            execution_id: execution.clone(),
            skip_custom_listeners,
            skip_io_mappings,
        }
    };

    let removed = matched.removed_post_order().into_iter().filter_map(|idx| {
        let instance = matched.view.instances.get(idx)?;
        let execution = instance.execution_ids.first()?;
        Some(event(
            ScopeTransition::Removed,
            source_definition_id,
            &instance.activity_id,
            &instance.id,
            execution,
        ))
    });

    let created = tree.pre_order().into_iter().filter_map(|idx| {
        let node = tree.node(idx)?;
        if !node.is_emerging() {
            return None;
        }
        Some(event(
            ScopeTransition::Created,
            target_definition_id,
            &node.activity_id,
            node.activity_instance_id.as_deref()?,
            node.scope_execution.as_ref()?,
        ))
    });

    removed.chain(created).collect()
}
