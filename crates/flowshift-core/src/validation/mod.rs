//! Migration plan validation.
//!
//! Every instruction runs through all rule groups and failures are collected
//! per instruction; nothing short-circuits except the existence group, since the
//! remaining rules need both activities to resolve. Variable checks run
//! independently and are reported alongside instruction failures.
//!
//! Rule groups:
//! - [`existence`]: null and unknown activity ids, duplicate source mappings.
//! - [`behavior`]: supported activity kinds, matching behavior and event type.
//! - [`event_scope`]: events move only together with the scope they attach to.
//! - [`ancestor`]: the closest mapped source ancestor stays an ancestor in the target.
//! - [`multi_instance`]: multi-instance bodies and inner activities move as a pair.
//! - [`gateway`]: flow scope, single mapping and incoming flows of joining gateways.
//! - [`trigger`]: event trigger update eligibility.
//! - [`variables`]: values set by the plan.

pub(crate) mod ancestor;
pub(crate) mod behavior;
pub(crate) mod event_scope;
pub(crate) mod existence;
pub(crate) mod gateway;
pub(crate) mod multi_instance;
pub(crate) mod trigger;
pub(crate) mod variables;

use flowshift_types::{Activity, ProcessModel, TypedValue};
use std::collections::{BTreeMap, HashMap};

use crate::error::{InstructionReport, PlanValidationReport, PlanViolation, VariableReport};
use crate::plan::RawInstruction;

/// Mapping lookups shared by every rule group.
pub(crate) struct PlanContext<'a> {
    pub(crate) source: &'a ProcessModel,
    pub(crate) target: &'a ProcessModel,
    pub(crate) instructions: &'a [RawInstruction],
    by_source: HashMap<&'a str, Vec<&'a str>>,
    by_target: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> PlanContext<'a> {
    pub(crate) fn new(
        source: &'a ProcessModel,
        target: &'a ProcessModel,
        instructions: &'a [RawInstruction],
    ) -> Self {
        let mut by_source: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut by_target: HashMap<&str, Vec<&str>> = HashMap::new();
        for raw in instructions {
            let (Some(s), Some(t)) = (
                raw.source_activity_id.as_deref(),
                raw.target_activity_id.as_deref(),
            ) else {
                continue;
            };
            if !source.contains(s) || !target.contains(t) {
                continue;
            }
            by_source.entry(s).or_default().push(t);
            by_target.entry(t).or_default().push(s);
        }
        Self {
            source,
            target,
            instructions,
            by_source,
            by_target,
        }
    }

    /// Whether `source_id` is mapped to `target_id`; the process roots always are.
    pub(crate) fn is_mapped(&self, source_id: &str, target_id: &str) -> bool {
        if self.source.is_root(source_id) && self.target.is_root(target_id) {
            return true;
        }
        self.by_source
            .get(source_id)
            .is_some_and(|targets| targets.contains(&target_id))
    }

    /// First target of `source_id`; the source root maps to the target root.
    pub(crate) fn mapped_target(&self, source_id: &str) -> Option<&'a str> {
        if self.source.is_root(source_id) {
            return Some(self.target.id());
        }
        self.by_source
            .get(source_id)
            .and_then(|targets| targets.first().copied())
    }

    pub(crate) fn sources_of(&self, target_id: &str) -> &[&'a str] {
        self.by_target
            .get(target_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn is_target_mapped(&self, target_id: &str) -> bool {
        !self.sources_of(target_id).is_empty()
    }
}

/// An instruction whose activities both exist.
pub(crate) struct Resolved<'a> {
    pub(crate) raw: &'a RawInstruction,
    pub(crate) source: &'a Activity,
    pub(crate) target: &'a Activity,
}

/// Run every rule group over `instructions` and `variables`.
pub fn validate_plan(
    source: &ProcessModel,
    target: &ProcessModel,
    instructions: &[RawInstruction],
    variables: &BTreeMap<String, TypedValue>,
) -> PlanValidationReport {
    let ctx = PlanContext::new(source, target, instructions);
    let mut instruction_reports = Vec::new();

    for raw in instructions {
        let failures = collect_instruction_violations(&ctx, raw);
        if !failures.is_empty() {
            instruction_reports.push(InstructionReport {
                instruction: raw.clone(),
                failures,
            });
        }
    }

    let variable_reports = variables
        .iter()
        .filter_map(|(name, value)| {
            let failures: Vec<PlanViolation> = variables::check(name, value).err().into_iter().collect();
            (!failures.is_empty()).then(|| VariableReport {
                name: name.clone(),
                failures,
            })
        })
        .collect();

    PlanValidationReport {
        source_model_id: source.id().to_string(),
        target_model_id: target.id().to_string(),
        instruction_reports,
        variable_reports,
    }
}

fn collect_instruction_violations(ctx: &PlanContext<'_>, raw: &RawInstruction) -> Vec<PlanViolation> {
    let mut violations = Vec::new();
    let resolved = match existence::resolve(ctx, raw) {
        Ok(resolved) => resolved,
        Err(missing) => return missing,
    };

    if let Err(v) = existence::check_unique(ctx, raw) {
        violations.push(v);
    }
    behavior::check(&resolved, &mut violations);
    if let Err(v) = event_scope::check(ctx, &resolved) {
        violations.push(v);
    }
    if let Err(v) = ancestor::check(ctx, &resolved) {
        violations.push(v);
    }
    multi_instance::check(ctx, &resolved, &mut violations);
    gateway::check(ctx, &resolved, &mut violations);
    trigger::check(&resolved, &mut violations);
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowshift_types::EventTrigger;

    fn models() -> (ProcessModel, ProcessModel) {
        let source = ProcessModel::builder("proc:1")
            .user_task("userTask")
            .build()
            .unwrap();
        let target = ProcessModel::builder("proc:2")
            .sub_process("subProcess", |s| s.user_task("userTask"))
            .boundary_event(
                "boundary",
                "subProcess",
                EventTrigger::Message {
                    name: "Message".into(),
                },
            )
            .build()
            .unwrap();
        (source, target)
    }

    #[test]
    fn roots_are_implicitly_mapped() {
        let (source, target) = models();
        let raw = vec![RawInstruction::new("userTask", "userTask")];
        let ctx = PlanContext::new(&source, &target, &raw);
        assert!(ctx.is_mapped("proc:1", "proc:2"));
        assert_eq!(ctx.mapped_target("proc:1"), Some("proc:2"));
        assert_eq!(ctx.mapped_target("userTask"), Some("userTask"));
        assert!(!ctx.is_target_mapped("subProcess"));
    }

    #[test]
    fn validation_is_repeatable() {
        let (source, target) = models();
        let raw = vec![
            RawInstruction::new("userTask", "userTask"),
            RawInstruction::new("userTask", "boundary"),
        ];
        let first = validate_plan(&source, &target, &raw, &BTreeMap::new());
        let second = validate_plan(&source, &target, &raw, &BTreeMap::new());
        assert!(first.has_failures());
        similar_asserts::assert_eq!(first, second);
    }

    #[test]
    fn adding_a_scope_is_valid() {
        let (source, target) = models();
        let raw = vec![RawInstruction::new("userTask", "userTask")];
        let report = validate_plan(&source, &target, &raw, &BTreeMap::new());
        assert!(!report.has_failures(), "{report}");
    }
}
