//! Minimal continuation of migrated instances, enough to drive them to their end.

use flowshift_types::{
    Execution, ExecutionId, ExecutionTree, InstanceSnapshot, ModelError, SubscriptionType,
};

/// Complete the activity `activity_id` and let the instance continue to its end events.
pub fn complete_activity(
    snapshot: &mut InstanceSnapshot,
    activity_id: &str,
) -> Result<(), ModelError> {
    let id = snapshot
        .executions
        .iter()
        .find(|e| !e.is_event_scope && e.activity_id.as_deref() == Some(activity_id))
        .map(|e| e.id.clone())
        .ok_or_else(|| ModelError::UnknownActivity(activity_id.to_string()))?;
    if let Some(execution) = snapshot.executions.get_mut(&id) {
        execution.activity_id = None;
        execution.activity_instance_id = None;
    }
    end_execution(&mut snapshot.executions, &id)?;
    prune(snapshot);
    Ok(())
}

/// Deliver message `name` to its subscription. The catching event interrupts its
/// scope and completes. Returns the id of the catching event.
pub fn correlate_message(
    snapshot: &mut InstanceSnapshot,
    name: &str,
) -> Result<String, ModelError> {
    let (anchor, activity_id) = snapshot
        .subscriptions
        .iter()
        .find(|s| s.event_type == SubscriptionType::Message && s.event_name.as_deref() == Some(name))
        .map(|s| (s.execution_id.clone(), s.activity_id.clone()))
        .ok_or_else(|| ModelError::UnknownActivity(name.to_string()))?;
    let children: Vec<ExecutionId> = snapshot
        .executions
        .children(&anchor)
        .map(|c| c.id.clone())
        .collect();
    for child in &children {
        remove_subtree(&mut snapshot.executions, child)?;
    }
    if let Some(execution) = snapshot.executions.get_mut(&anchor) {
        execution.activity_id = None;
        execution.activity_instance_id = None;
    }
    end_execution(&mut snapshot.executions, &anchor)?;
    prune(snapshot);
    Ok(activity_id)
}

fn end_execution(tree: &mut ExecutionTree, id: &ExecutionId) -> Result<(), ModelError> {
    let execution = tree
        .get(id)
        .cloned()
        .ok_or_else(|| ModelError::UnknownExecution(id.to_string()))?;
    let Some(parent_id) = execution.parent_id.clone() else {
        *tree = ExecutionTree::new();
        return Ok(());
    };
    remove_subtree(tree, id)?;
    if execution.is_concurrent {
        compact(tree, &parent_id)
    } else {
        end_execution(tree, &parent_id)
    }
}

/// Collapse a scope execution that is left with a single concurrent child.
fn compact(tree: &mut ExecutionTree, scope_id: &ExecutionId) -> Result<(), ModelError> {
    let remaining: Vec<Execution> = tree
        .children(scope_id)
        .filter(|c| !c.is_event_scope)
        .cloned()
        .collect();
    match remaining.as_slice() {
        [] => end_execution(tree, scope_id),
        [only] if only.is_concurrent => {
            let hosted: Vec<ExecutionId> = tree.children(&only.id).map(|c| c.id.clone()).collect();
            if hosted.is_empty() {
                if let Some(scope) = tree.get_mut(scope_id) {
                    scope.activity_id = only.activity_id.clone();
                    scope.activity_instance_id = only.activity_instance_id.clone();
                    scope.transition = only.transition.clone();
                }
            }
            for child in &hosted {
                tree.reparent(child, scope_id)?;
            }
            tree.remove_leaf(&only.id).map(|_| ())
        }
        _ => Ok(()),
    }
}

fn remove_subtree(tree: &mut ExecutionTree, id: &ExecutionId) -> Result<(), ModelError> {
    let children: Vec<ExecutionId> = tree.children(id).map(|c| c.id.clone()).collect();
    for child in &children {
        remove_subtree(tree, child)?;
    }
    tree.remove_leaf(id).map(|_| ())
}

fn prune(snapshot: &mut InstanceSnapshot) {
    let tree = &snapshot.executions;
    snapshot.subscriptions.retain(|s| tree.contains(&s.execution_id));
    snapshot.jobs.retain(|j| tree.contains(&j.execution_id));
    snapshot.incidents.retain(|i| tree.contains(&i.execution_id));
    snapshot.variables.retain(|v| tree.contains(&v.execution_id));
}
