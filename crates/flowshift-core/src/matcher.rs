//! Assign every activity, transition and event-scope instance of a running
//! instance to an instruction of the plan.
//!
//! Unmapped leaves fail the instance. Unmapped inner activity instances are
//! removed along with their scope; their children are re-attached by the tree
//! transformer to the closest migrating ancestor.

use flowshift_types::{
    ActivityInstanceTree, AsyncPhase, InstanceSnapshot, ProcessModel, TransitionInstance,
};
use tracing::debug;

use crate::error::{EntityKind, InstanceValidationReport, InstanceViolation};
use crate::plan::{MigrationInstruction, MigrationPlan};

/// Instruction assignment, indexed like the activity-instance view.
#[derive(Clone, Debug)]
pub struct MatchedInstance {
    pub view: ActivityInstanceTree,
    pub instances: Vec<Option<MigrationInstruction>>,
    /// Unmapped inner instances dropped together with their scope.
    pub removed: Vec<bool>,
    pub transitions: Vec<Option<MigrationInstruction>>,
    pub event_scopes: Vec<Option<MigrationInstruction>>,
}

impl MatchedInstance {
    pub fn instance_target(&self, idx: usize) -> Option<&str> {
        self.instances
            .get(idx)?
            .as_ref()
            .map(|i| i.target_activity_id.as_str())
    }

    pub fn is_migrating(&self, idx: usize) -> bool {
        self.instances.get(idx).is_some_and(Option::is_some)
    }

    /// Whether the instance is dropped together with its scope. Unmapped
    /// leaves are failures, not removals.
    pub fn is_removed(&self, idx: usize) -> bool {
        self.removed.get(idx).copied().unwrap_or(false)
    }

    /// Closest migrating activity instance at or above `idx`. The root always migrates.
    pub fn migrating_ancestor(&self, idx: usize) -> usize {
        let mut current = Some(idx);
        while let Some(i) = current {
            if !self.is_removed(i) {
                return i;
            }
            current = self.view.instances.get(i).and_then(|a| a.parent);
        }
        0
    }

    /// Instances dropped by the migration, children before parents.
    pub fn removed_post_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        if !self.view.instances.is_empty() {
            self.collect_removed(0, &mut order);
        }
        order
    }

    fn collect_removed(&self, idx: usize, order: &mut Vec<usize>) {
        for child in &self.view.instances[idx].children {
            self.collect_removed(*child, order);
        }
        if self.is_removed(idx) {
            order.push(idx);
        }
    }
}

pub fn match_instance(
    plan: &MigrationPlan,
    source: &ProcessModel,
    target: &ProcessModel,
    snapshot: &InstanceSnapshot,
    report: &mut InstanceValidationReport,
) -> MatchedInstance {
    let view = snapshot.activity_instances();

    let (instances, removed): (Vec<_>, Vec<_>) = view
        .instances
        .iter()
        .enumerate()
        .map(|(idx, instance)| {
            if idx == 0 {
                let root = MigrationInstruction {
                    source_activity_id: source.id().to_string(),
                    target_activity_id: target.id().to_string(),
                    update_event_trigger: false,
                };
                return (Some(root), false);
            }
            let instruction = plan.instruction_for(&instance.activity_id).cloned();
            let supported = source
                .activity(&instance.activity_id)
                .is_some_and(|a| a.is_migratable());
            let is_leaf = view.is_leaf(idx);

            if instruction.is_none() && (is_leaf || !supported) {
                report.add(
                    EntityKind::ActivityInstance,
                    &instance.id,
                    &instance.activity_id,
                    InstanceViolation::NoInstruction,
                );
            }
            if !supported {
                report.add(
                    EntityKind::ActivityInstance,
                    &instance.id,
                    &instance.activity_id,
                    InstanceViolation::UnsupportedActivityInstance,
                );
            }
            let removed = instruction.is_none() && !is_leaf && supported;
            if removed {
                debug!(activity_instance = %instance.id, "removing unmapped scope instance");
            }
            (instruction, removed)
        })
        .unzip();

    let transitions = view
        .transitions
        .iter()
        .map(|transition| {
            let instruction = plan.instruction_for(&transition.activity_id).cloned();
            match &instruction {
                None => report.add(
                    EntityKind::TransitionInstance,
                    &transition.id,
                    &transition.activity_id,
                    InstanceViolation::NoInstruction,
                ),
                Some(instruction) => {
                    for violation in check_transition(target, transition, instruction) {
                        report.add(
                            EntityKind::TransitionInstance,
                            &transition.id,
                            &transition.activity_id,
                            violation,
                        );
                    }
                }
            }
            instruction
        })
        .collect();

    let event_scopes = view
        .event_scopes
        .iter()
        .map(|scope| {
            let instruction = plan.instruction_for(&scope.activity_id).cloned();
            if instruction.is_none() {
                report.add(
                    EntityKind::EventScopeInstance,
                    scope.execution_id.as_str(),
                    &scope.activity_id,
                    InstanceViolation::NoInstruction,
                );
            }
            instruction
        })
        .collect();

    MatchedInstance {
        view,
        instances,
        removed,
        transitions,
        event_scopes,
    }
}

fn check_transition(
    target: &ProcessModel,
    transition: &TransitionInstance,
    instruction: &MigrationInstruction,
) -> Vec<InstanceViolation> {
    let mut violations = Vec::new();
    let Some(activity) = target.activity(&instruction.target_activity_id) else {
        return violations;
    };

    if transition.instantiating && activity.parent_id.as_deref() != Some(target.id()) {
        violations.push(InstanceViolation::InstantiatingTransitionNotAtProcessLevel);
    }

    match &transition.phase {
        AsyncPhase::Before => {
            if !activity.async_before {
                violations.push(InstanceViolation::TargetNotAsyncBefore);
            }
        }
        AsyncPhase::After { sequence_flow } => {
            if !activity.async_after {
                violations.push(InstanceViolation::TargetNotAsyncAfter);
            }
            let outgoing: Vec<&str> = target
                .outgoing(&activity.id)
                .map(|f| f.id.as_str())
                .collect();
            let matched = match sequence_flow {
                None => outgoing.len() <= 1,
                Some(flow) => outgoing.contains(&flow.as_str()),
            };
            if !matched {
                violations.push(InstanceViolation::UnmatchedSequenceFlow);
            }
        }
    }
    violations
}
