use flowshift_types::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lifecycle::ListenerError;
use crate::plan::RawInstruction;
use crate::status::IllegalTransition;
use crate::tree_invariants::TreeViolation;

/// One reason a migration plan cannot be built.
///
/// The `Display` output of every variant is a stable, user-facing message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanViolation {
    SourceActivityIdNull,
    TargetActivityIdNull,
    SourceActivityMissing { activity_id: String },
    TargetActivityMissing { activity_id: String },
    SourceActivityNotSupported,
    TargetActivityNotSupported,
    /// Attached to every instruction sharing the same source activity.
    MultipleMappings { activity_id: String },
    IncompatibleTypes { source_behavior: String, target_behavior: String },
    DifferentEventTypes { source_type: String, target_type: String },
    EventScopeNotMapped { source_scope: String, target_scope: String },
    /// The closest mapped source ancestor is mapped outside the target's ancestors.
    AncestorMismatch { ancestor: String, mapped_scope: String, target_scope: String },
    TriggerNotUpdatable,
    ConditionalEventWithoutTriggerUpdate,
    UnmappedMultiInstanceBody { target_activity: String, body: String },
    RemovedMultiInstanceInnerActivity,
    UnmappedMultiInstanceInnerActivity,
    GatewayFlowScopeNotMapped { flow_scope: String },
    GatewayMappedMoreThanOnce { target_gateway: String },
    GatewayMissingIncomingFlows,
    JavaSerializedVariable { name: String },
}

impl fmt::Display for PlanViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceActivityIdNull => write!(f, "Source activity id is null"),
            Self::TargetActivityIdNull => write!(f, "Target activity id is null"),
            Self::SourceActivityMissing { activity_id } => {
                write!(f, "Source activity '{activity_id}' does not exist")
            }
            Self::TargetActivityMissing { activity_id } => {
                write!(f, "Target activity '{activity_id}' does not exist")
            }
            Self::SourceActivityNotSupported => write!(
                f,
                "The type of the source activity is not supported for activity migration"
            ),
            Self::TargetActivityNotSupported => write!(
                f,
                "The type of the target activity is not supported for activity migration"
            ),
            Self::MultipleMappings { activity_id } => write!(
                f,
                "There are multiple mappings for source activity id '{activity_id}'"
            ),
            Self::IncompatibleTypes {
                source_behavior,
                target_behavior,
            } => write!(
                f,
                "Activities have incompatible types ({source_behavior} is not compatible with {target_behavior})"
            ),
            Self::DifferentEventTypes {
                source_type,
                target_type,
            } => write!(
                f,
                "Events are not of the same type ({source_type} != {target_type})"
            ),
            Self::EventScopeNotMapped {
                source_scope,
                target_scope,
            } => write!(
                f,
                "The source activity's event scope ({source_scope}) must be mapped to the target activity's event scope ({target_scope})"
            ),
            Self::AncestorMismatch {
                ancestor,
                mapped_scope,
                target_scope,
            } => write!(
                f,
                "The closest mapped ancestor '{ancestor}' is mapped to scope '{mapped_scope}' which is not an ancestor of target scope '{target_scope}'"
            ),
            Self::TriggerNotUpdatable => write!(
                f,
                "Cannot update event trigger because the activity does not define a persistent event trigger"
            ),
            Self::ConditionalEventWithoutTriggerUpdate => {
                write!(f, "Conditional event has to migrate with update event trigger.")
            }
            Self::UnmappedMultiInstanceBody {
                target_activity,
                body,
            } => write!(
                f,
                "Target activity '{target_activity}' is a descendant of multi-instance body '{body}' that is not mapped from the source process definition."
            ),
            Self::RemovedMultiInstanceInnerActivity => write!(
                f,
                "Cannot remove the inner activity of a multi-instance body when the body is mapped"
            ),
            Self::UnmappedMultiInstanceInnerActivity => write!(
                f,
                "Must map the inner activity of a multi-instance body when the body is mapped"
            ),
            Self::GatewayFlowScopeNotMapped { flow_scope } => {
                write!(f, "The gateway's flow scope '{flow_scope}' must be mapped")
            }
            Self::GatewayMappedMoreThanOnce { target_gateway } => write!(
                f,
                "Only one gateway can be mapped to gateway '{target_gateway}'"
            ),
            Self::GatewayMissingIncomingFlows => write!(
                f,
                "The target gateway must have at least the same number of incoming sequence flows that the source gateway has"
            ),
            Self::JavaSerializedVariable { name } => write!(
                f,
                "Cannot set variable with name {name}. Java serialization format is prohibited"
            ),
        }
    }
}

/// Failures recorded against one raw instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionReport {
    pub instruction: RawInstruction,
    pub failures: Vec<PlanViolation>,
}

/// Failures recorded against one variable of the plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableReport {
    pub name: String,
    pub failures: Vec<PlanViolation>,
}

/// Every plan-level failure, grouped by instruction and by variable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanValidationReport {
    pub source_model_id: String,
    pub target_model_id: String,
    pub instruction_reports: Vec<InstructionReport>,
    pub variable_reports: Vec<VariableReport>,
}

impl PlanValidationReport {
    pub fn has_failures(&self) -> bool {
        !self.instruction_reports.is_empty() || !self.variable_reports.is_empty()
    }

    /// Flattened `(key, message)` pairs: instruction failures keyed by source
    /// activity id (`"null"` when absent), then variable failures keyed by name.
    pub fn failures(&self) -> Vec<(String, String)> {
        let instructions = self.instruction_reports.iter().flat_map(|r| {
            let key = r
                .instruction
                .source_activity_id
                .clone()
                .unwrap_or_else(|| "null".to_string());
            r.failures.iter().map(move |f| (key.clone(), f.to_string()))
        });
        let variables = self
            .variable_reports
            .iter()
            .flat_map(|r| r.failures.iter().map(|f| (r.name.clone(), f.to_string())));
        instructions.chain(variables).collect()
    }

    /// Messages reported for instructions with the given source activity.
    pub fn instruction_failures(&self, source_activity_id: &str) -> Vec<String> {
        self.instruction_reports
            .iter()
            .filter(|r| r.instruction.source_activity_id.as_deref() == Some(source_activity_id))
            .flat_map(|r| r.failures.iter().map(ToString::to_string))
            .collect()
    }

    pub fn variable_failures(&self, name: &str) -> Vec<String> {
        self.variable_reports
            .iter()
            .filter(|r| r.name == name)
            .flat_map(|r| r.failures.iter().map(ToString::to_string))
            .collect()
    }
}

impl fmt::Display for PlanValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Migration plan for process definition '{}' to '{}' is not valid:",
            self.source_model_id, self.target_model_id
        )?;
        for report in &self.instruction_reports {
            write!(f, "\n\t Migration instruction {} is not valid:", report.instruction)?;
            for failure in &report.failures {
                write!(f, "\n\t\t{failure}")?;
            }
        }
        for report in &self.variable_reports {
            write!(f, "\n\t Variable '{}' is not valid:", report.name)?;
            for failure in &report.failures {
                write!(f, "\n\t\t{failure}")?;
            }
        }
        Ok(())
    }
}

/// Raised when a plan has at least one failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PlanValidationError(pub PlanValidationReport);

impl PlanValidationError {
    pub fn report(&self) -> &PlanValidationReport {
        &self.0
    }
}

/// One reason a running instance cannot be migrated by a plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceViolation {
    NoInstruction,
    UnsupportedActivityInstance,
    InstantiatingTransitionNotAtProcessLevel,
    TargetNotAsyncBefore,
    TargetNotAsyncAfter,
    UnmatchedSequenceFlow,
    UnmappedCompensationBoundary { handler: String },
    UnmappedCompensationStart { handler: String },
    VariableCollision { name: String },
    UnmigratedIncidents,
    UnresolvableExpression { expression: String, variable: String },
    TargetScopeUnreachable { target_activity: String, scope: String },
}

impl fmt::Display for InstanceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInstruction => write!(
                f,
                "There is no migration instruction for this instance's activity"
            ),
            Self::UnsupportedActivityInstance => write!(
                f,
                "The type of the source activity is not supported for activity instance migration"
            ),
            Self::InstantiatingTransitionNotAtProcessLevel => write!(
                f,
                "A transition instance that instantiates the process can only be migrated to a process-level flow node"
            ),
            Self::TargetNotAsyncBefore => write!(f, "Target activity is not asyncBefore"),
            Self::TargetNotAsyncAfter => write!(f, "Target activity is not asyncAfter"),
            Self::UnmatchedSequenceFlow => write!(
                f,
                "Transition instance is assigned to a sequence flow that cannot be matched in the target activity"
            ),
            Self::UnmappedCompensationBoundary { handler } => write!(
                f,
                "Cannot migrate subscription for compensation handler '{handler}'. There is no migration instruction for the compensation boundary event"
            ),
            Self::UnmappedCompensationStart { handler } => write!(
                f,
                "Cannot migrate subscription for compensation handler '{handler}'. There is no migration instruction for the compensation start event"
            ),
            Self::VariableCollision { name } => write!(
                f,
                "The variable '{name}' exists in both, this scope and concurrent local in the parent scope. Migrating to a non-scope activity would overwrite one of them."
            ),
            Self::UnmigratedIncidents => {
                write!(f, "Process instance contains not migrated incidents")
            }
            Self::UnresolvableExpression {
                expression,
                variable,
            } => write!(
                f,
                "Cannot resolve expression '{expression}': unknown variable '{variable}'"
            ),
            Self::TargetScopeUnreachable {
                target_activity,
                scope,
            } => write!(
                f,
                "Target activity '{target_activity}' cannot be placed below scope '{scope}'"
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    ActivityInstance,
    TransitionInstance,
    EventScopeInstance,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivityInstance => write!(f, "activity instance"),
            Self::TransitionInstance => write!(f, "transition instance"),
            Self::EventScopeInstance => write!(f, "event scope instance"),
        }
    }
}

/// Failures of one activity/transition/event-scope instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub kind: EntityKind,
    pub entity_id: String,
    /// Source activity of the failing instance.
    pub activity_id: String,
    pub violations: Vec<InstanceViolation>,
}

/// Every instance-level failure of one process instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceValidationReport {
    pub process_instance_id: String,
    pub failures: Vec<EntityFailure>,
}

impl InstanceValidationReport {
    pub fn new(process_instance_id: impl Into<String>) -> Self {
        Self {
            process_instance_id: process_instance_id.into(),
            failures: Vec::new(),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Append a violation, merging it into an existing entry for the same entity.
    pub fn add(
        &mut self,
        kind: EntityKind,
        entity_id: &str,
        activity_id: &str,
        violation: InstanceViolation,
    ) {
        if let Some(entry) = self
            .failures
            .iter_mut()
            .find(|f| f.kind == kind && f.entity_id == entity_id)
        {
            if !entry.violations.contains(&violation) {
                entry.violations.push(violation);
            }
            return;
        }
        self.failures.push(EntityFailure {
            kind,
            entity_id: entity_id.to_string(),
            activity_id: activity_id.to_string(),
            violations: vec![violation],
        });
    }

    /// Flattened `(entity kind, entity id, message)` triples.
    pub fn entries(&self) -> Vec<(EntityKind, String, String)> {
        self.failures
            .iter()
            .flat_map(|f| {
                f.violations
                    .iter()
                    .map(move |v| (f.kind, f.entity_id.clone(), v.to_string()))
            })
            .collect()
    }

    /// Messages reported for instances of the given source activity and kind.
    pub fn failures_for(&self, kind: EntityKind, activity_id: &str) -> Vec<String> {
        self.failures
            .iter()
            .filter(|f| f.kind == kind && f.activity_id == activity_id)
            .flat_map(|f| f.violations.iter().map(ToString::to_string))
            .collect()
    }

    pub fn activity_instance_failures(&self, activity_id: &str) -> Vec<String> {
        self.failures_for(EntityKind::ActivityInstance, activity_id)
    }

    pub fn transition_instance_failures(&self, activity_id: &str) -> Vec<String> {
        self.failures_for(EntityKind::TransitionInstance, activity_id)
    }
}

impl fmt::Display for InstanceValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot migrate process instance '{}':",
            self.process_instance_id
        )?;
        for failure in &self.failures {
            write!(
                f,
                "\n\tCannot migrate {} '{}':",
                failure.kind, failure.entity_id
            )?;
            for violation in &failure.violations {
                write!(f, "\n\t\t{violation}")?;
            }
        }
        Ok(())
    }
}

/// Errors produced while migrating a single instance snapshot.
#[derive(Debug, thiserror::Error)]
pub enum InstanceMigrationError {
    #[error("{0}")]
    Rejected(InstanceValidationReport),
    #[error(
        "process instance '{process_instance_id}' belongs to process definition '{actual}', expected '{expected}'"
    )]
    DefinitionMismatch {
        process_instance_id: String,
        actual: String,
        expected: String,
    },
    #[error("process instance '{0}' has no root execution")]
    MissingRoot(String),
    #[error("migrated execution tree is malformed: {}", join_violations(.0))]
    MalformedTree(Vec<TreeViolation>),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    State(#[from] IllegalTransition),
    #[error(transparent)]
    Model(#[from] ModelError),
}

fn join_violations(violations: &[TreeViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
