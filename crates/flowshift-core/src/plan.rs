use flowshift_types::{ProcessModel, TypedValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::equal_ids;
use crate::error::{PlanValidationError, PlanValidationReport};
use crate::validation;

/// An instruction as submitted by a caller, before validation.
///
/// Ids are optional because callers may pass null ids; those are reported as
/// plan violations rather than rejected up front.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawInstruction {
    pub source_activity_id: Option<String>,
    pub target_activity_id: Option<String>,
    pub update_event_trigger: bool,
}

impl RawInstruction {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_activity_id: Some(source.into()),
            target_activity_id: Some(target.into()),
            update_event_trigger: false,
        }
    }

    pub fn with_update_event_trigger(mut self) -> Self {
        self.update_event_trigger = true;
        self
    }
}

impl fmt::Display for RawInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.source_activity_id.as_deref().unwrap_or("null"),
            self.target_activity_id.as_deref().unwrap_or("null")
        )?;
        if self.update_event_trigger {
            write!(f, " (update event trigger)")?;
        }
        Ok(())
    }
}

/// A validated activity mapping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationInstruction {
    pub source_activity_id: String,
    pub target_activity_id: String,
    pub update_event_trigger: bool,
}

/// An immutable, validated migration plan.
///
/// Plans are built once per batch and shared read-only by every worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    source_model_id: String,
    target_model_id: String,
    instructions: Vec<MigrationInstruction>,
    variables: BTreeMap<String, TypedValue>,
}

impl MigrationPlan {
    pub fn source_model_id(&self) -> &str {
        &self.source_model_id
    }

    pub fn target_model_id(&self) -> &str {
        &self.target_model_id
    }

    pub fn instructions(&self) -> &[MigrationInstruction] {
        &self.instructions
    }

    pub fn variables(&self) -> &BTreeMap<String, TypedValue> {
        &self.variables
    }

    pub fn instruction_for(&self, source_activity_id: &str) -> Option<&MigrationInstruction> {
        self.instructions
            .iter()
            .find(|i| i.source_activity_id == source_activity_id)
    }

    pub fn target_of(&self, source_activity_id: &str) -> Option<&str> {
        self.instruction_for(source_activity_id)
            .map(|i| i.target_activity_id.as_str())
    }

    /// Whether some instruction maps onto `target_activity_id`.
    pub fn is_target_mapped(&self, target_activity_id: &str) -> bool {
        self.instructions
            .iter()
            .any(|i| i.target_activity_id == target_activity_id)
    }
}

/// Fluent builder for [`MigrationPlan`].
///
/// Explicit mappings come first, then mappings derived by
/// [`map_equal_activities`](Self::map_equal_activities). Nothing is checked until
/// [`build`](Self::build), which runs every plan rule and returns all failures at once.
#[derive(Clone, Debug)]
pub struct MigrationPlanBuilder {
    source: Arc<ProcessModel>,
    target: Arc<ProcessModel>,
    explicit: Vec<RawInstruction>,
    map_equal: bool,
    update_equal_triggers: bool,
    variables: BTreeMap<String, TypedValue>,
}

impl MigrationPlanBuilder {
    pub fn new(source: Arc<ProcessModel>, target: Arc<ProcessModel>) -> Self {
        Self {
            source,
            target,
            explicit: Vec::new(),
            map_equal: false,
            update_equal_triggers: false,
            variables: BTreeMap::new(),
        }
    }

    pub fn map_activities(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.explicit.push(RawInstruction::new(source, target));
        self
    }

    /// Add an instruction as submitted, possibly with missing ids.
    pub fn map_raw(mut self, instruction: RawInstruction) -> Self {
        self.explicit.push(instruction);
        self
    }

    /// Request a trigger update for the most recent explicit mapping.
    pub fn update_event_trigger(mut self) -> Self {
        if let Some(last) = self.explicit.last_mut() {
            last.update_event_trigger = true;
        }
        self
    }

    pub fn map_equal_activities(mut self) -> Self {
        self.map_equal = true;
        self
    }

    /// Request trigger updates for every equal-id mapping that supports one.
    pub fn update_event_triggers(mut self) -> Self {
        self.update_equal_triggers = true;
        self
    }

    pub fn set_variable(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn set_variables<I, K>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, TypedValue)>,
        K: Into<String>,
    {
        self.variables
            .extend(variables.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// The raw instruction list `build` would validate.
    pub fn instructions(&self) -> Vec<RawInstruction> {
        let mut all = self.explicit.clone();
        if self.map_equal {
            all.extend(equal_ids::generate(
                &self.source,
                &self.target,
                self.update_equal_triggers,
            ));
        }
        all
    }

    pub fn build(self) -> Result<MigrationPlan, PlanValidationError> {
        let raw = self.instructions();
        let report = validation::validate_plan(&self.source, &self.target, &raw, &self.variables);
        if report.has_failures() {
            return Err(PlanValidationError(report));
        }
        Ok(MigrationPlan::assemble(
            &self.source,
            &self.target,
            raw,
            self.variables,
        ))
    }
}

impl MigrationPlan {
    /// Assemble a plan from instructions that already passed validation.
    fn assemble(
        source: &ProcessModel,
        target: &ProcessModel,
        raw: Vec<RawInstruction>,
        variables: BTreeMap<String, TypedValue>,
    ) -> Self {
        let instructions = raw
            .into_iter()
            .filter_map(|r| {
                Some(MigrationInstruction {
                    source_activity_id: r.source_activity_id?,
                    target_activity_id: r.target_activity_id?,
                    update_event_trigger: r.update_event_trigger,
                })
            })
            .collect();
        Self {
            source_model_id: source.id().to_string(),
            target_model_id: target.id().to_string(),
            instructions,
            variables,
        }
    }
}

/// Validate `raw` against both models without building a plan.
pub fn validate_instructions(
    source: &ProcessModel,
    target: &ProcessModel,
    raw: &[RawInstruction],
    variables: &BTreeMap<String, TypedValue>,
) -> PlanValidationReport {
    validation::validate_plan(source, target, raw, variables)
}
