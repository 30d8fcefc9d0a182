use flowshift_types::{ExecutionId, ExecutionTree, IdGenerator, VariableInstance};
use std::collections::HashMap;
use tracing::debug;

use super::FacetContext;
use crate::error::{EntityKind, InstanceValidationReport, InstanceViolation};

/// Who a source variable belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Owner {
    /// Set on the instance's scope execution, or on the execution running it.
    Instance { idx: usize, concurrent_local: bool },
    Transition(usize),
    EventScope(usize),
}

impl Owner {
    /// Pre-order position: owners further down the source tree sort later.
    fn depth_key(&self, ctx: &FacetContext<'_>) -> (usize, u8) {
        match *self {
            Self::Instance {
                idx,
                concurrent_local: true,
            } => (idx, 0),
            Self::Instance { idx, .. } => (idx, 1),
            Self::Transition(t) => (
                ctx.matched.view.transitions.get(t).map_or(0, |t| t.parent),
                2,
            ),
            Self::EventScope(e) => (
                ctx.matched.view.event_scopes.get(e).map_or(0, |e| e.parent),
                3,
            ),
        }
    }
}

fn owner_of(ctx: &FacetContext<'_>, execution_id: &ExecutionId) -> Option<Owner> {
    if let Some(scope) = ctx.owners.event_scope(execution_id) {
        return Some(Owner::EventScope(scope));
    }
    let execution = ctx.snapshot.executions.get(execution_id)?;
    if execution.is_scope {
        return ctx
            .owners
            .scope_instance(execution_id)
            .map(|idx| Owner::Instance {
                idx,
                concurrent_local: false,
            });
    }
    if execution.transition.is_some() {
        return ctx.owners.transition(execution_id).map(Owner::Transition);
    }
    if let Some(activity) = execution.activity_id.as_deref() {
        return ctx
            .owners
            .executed(execution_id, activity)
            .map(|idx| Owner::Instance {
                idx,
                concurrent_local: true,
            });
    }
    // A concurrent execution hosting a scope child.
    ctx.snapshot
        .executions
        .children(execution_id)
        .find(|c| c.is_scope && !c.is_event_scope)
        .and_then(|c| ctx.owners.scope_instance(&c.id))
        .map(|idx| Owner::Instance {
            idx,
            concurrent_local: true,
        })
}

/// Target node and execution a variable of `owner` moves to.
fn anchor_of(ctx: &FacetContext<'_>, owner: Owner) -> Option<(usize, ExecutionId)> {
    let node_idx = match owner {
        Owner::Instance { idx, .. } => {
            if !ctx.matched.is_migrating(idx) {
                return None;
            }
            ctx.tree.node_of_instance(idx)?
        }
        Owner::Transition(t) => ctx.tree.node_of_transition(t)?,
        Owner::EventScope(e) => ctx.tree.node_of_event_scope(e)?,
    };
    let node = ctx.tree.node(node_idx)?;

    let execution = match owner {
        Owner::Transition(_) => node.executing_execution.clone(),
        Owner::EventScope(_) => node.scope_execution.clone(),
        Owner::Instance {
            concurrent_local, ..
        } => {
            if !node.owns_scope() {
                node.executing_execution.clone()
            } else if concurrent_local {
                let scope = node.scope_execution.as_ref()?;
                ctx.executions
                    .parent(scope)
                    .filter(|p| p.is_concurrent)
                    .map(|p| p.id.clone())
                    .or_else(|| Some(scope.clone()))
            } else {
                node.scope_execution.clone()
            }
        }
    }?;
    Some((node_idx, execution))
}

/// Activity-instance id recorded on a variable anchored at `execution_id`.
///
/// Scope executions report their own instance and concurrent executions
/// running a leaf report the leaf. Every other execution reports the
/// enclosing scope's instance, even when it runs an activity of its own.
pub(crate) fn reporting_instance_id(
    executions: &ExecutionTree,
    execution_id: &ExecutionId,
) -> Option<String> {
    let execution = executions.get(execution_id)?;
    if execution.is_scope {
        return execution.scope_instance_id.clone();
    }
    if execution.is_concurrent && execution.transition.is_none() && execution.activity_id.is_some()
    {
        return execution.activity_instance_id.clone();
    }
    executions
        .ancestors(execution_id)
        .into_iter()
        .find(|e| e.is_scope)
        .and_then(|e| e.scope_instance_id.clone())
}

/// Variable `name` as seen from `execution`: local first, then up the tree.
pub(crate) fn lookup_visible<'v>(
    executions: &ExecutionTree,
    variables: &'v [VariableInstance],
    execution: &ExecutionId,
    name: &str,
) -> Option<&'v VariableInstance> {
    std::iter::once(execution)
        .chain(executions.ancestors(execution).into_iter().map(|e| &e.id))
        .find_map(|id| {
            variables
                .iter()
                .find(|v| &v.execution_id == id && v.name == name)
        })
}

pub(crate) fn migrate(
    ctx: &FacetContext<'_>,
    ids: &mut IdGenerator,
    report: &mut InstanceValidationReport,
) -> Vec<VariableInstance> {
    let mut owned: Vec<(Owner, &VariableInstance)> = ctx
        .snapshot
        .variables
        .iter()
        .filter_map(|v| match owner_of(ctx, &v.execution_id) {
            Some(owner) => Some((owner, v)),
            None => {
                debug!(variable = %v.name, execution = %v.execution_id, "dropping variable without owner");
                None
            }
        })
        .collect();
    owned.sort_by_key(|(owner, _)| owner.depth_key(ctx));

    let mut migrated: Vec<VariableInstance> = Vec::new();
    let mut placed: HashMap<(ExecutionId, String), (usize, usize)> = HashMap::new();
    for (owner, variable) in owned {
        let Some((node, execution)) = anchor_of(ctx, owner) else {
            debug!(variable = %variable.name, "dropping variable of removed scope");
            continue;
        };
        let moved = VariableInstance {
            execution_id: execution.clone(),
            activity_instance_id: reporting_instance_id(ctx.executions, &execution)
                .unwrap_or_else(|| variable.activity_instance_id.clone()),
            ..variable.clone()
        };

        match placed.get(&(execution.clone(), variable.name.clone())) {
            Some((previous_node, _)) if *previous_node == node => {
                report_collision(ctx, report, owner, &variable.name);
            }
            Some((_, slot)) => migrated[*slot] = moved,
            None => {
                placed.insert((execution, variable.name.clone()), (node, migrated.len()));
                migrated.push(moved);
            }
        }
    }

    set_plan_variables(ctx, ids, &mut migrated);
    migrated
}

fn report_collision(
    ctx: &FacetContext<'_>,
    report: &mut InstanceValidationReport,
    owner: Owner,
    name: &str,
) {
    let violation = InstanceViolation::VariableCollision {
        name: name.to_string(),
    };
    match owner {
        Owner::Instance { idx, .. } => ctx.report_instance(report, idx, violation),
        Owner::Transition(t) => {
            if let Some(transition) = ctx.matched.view.transitions.get(t) {
                report.add(
                    EntityKind::TransitionInstance,
                    &transition.id,
                    &transition.activity_id,
                    violation,
                );
            }
        }
        Owner::EventScope(e) => {
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

/// Plan variables land on the root execution, replacing values of the same name.
fn set_plan_variables(
    ctx: &FacetContext<'_>,
    ids: &mut IdGenerator,
    migrated: &mut Vec<VariableInstance>,
) {
    let Some(root) = ctx.executions.root() else {
        return;
    };
    for (name, value) in ctx.plan.variables() {
        if let Some(existing) = migrated
            .iter_mut()
            .find(|v| v.execution_id == root.id && &v.name == name)
        {
            existing.value = value.clone();
            continue;
        }
        migrated.push(VariableInstance {
            id: ids.next_id("variable"),
            name: name.clone(),
            value: value.clone(),
            execution_id: root.id.clone(),
            activity_instance_id: root
                .scope_instance_id
                .clone()
                .unwrap_or_else(|| root.process_instance_id.clone()),
        });
    }
}
