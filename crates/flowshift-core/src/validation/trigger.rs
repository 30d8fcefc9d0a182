use flowshift_types::EventKind;

use crate::error::PlanViolation;

use super::Resolved;

pub(crate) fn check(resolved: &Resolved<'_>, violations: &mut Vec<PlanViolation>) {
    let source = resolved.source;
    let update = resolved.raw.update_event_trigger;

    if update && !source.has_persistent_trigger() {
        violations.push(PlanViolation::TriggerNotUpdatable);
    }
    // Conditions are re-evaluated against the new model, so they always move with an update.
    if !update && source.has_persistent_trigger() && source.event_kind() == Some(EventKind::Conditional) {
        violations.push(PlanViolation::ConditionalEventWithoutTriggerUpdate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RawInstruction;
    use flowshift_types::{EventTrigger, ProcessModel};

    fn model() -> ProcessModel {
        ProcessModel::builder("proc")
            .user_task("userTask")
            .boundary_event(
                "conditional",
                "userTask",
                EventTrigger::Conditional {
                    condition: "${any == true}".into(),
                },
            )
            .build()
            .unwrap()
    }

    fn run(activity: &str, raw: RawInstruction) -> Vec<PlanViolation> {
        let model = model();
        let resolved = Resolved {
            raw: &raw,
            source: model.activity(activity).unwrap(),
            target: model.activity(activity).unwrap(),
        };
        let mut violations = Vec::new();
        check(&resolved, &mut violations);
        violations
    }

    #[test]
    fn user_task_trigger_cannot_be_updated() {
        let raw = RawInstruction::new("userTask", "userTask").with_update_event_trigger();
        assert_eq!(run("userTask", raw), vec![PlanViolation::TriggerNotUpdatable]);
    }

    #[test]
    fn conditional_event_requires_update() {
        let raw = RawInstruction::new("conditional", "conditional");
        assert_eq!(
            run("conditional", raw.clone()),
            vec![PlanViolation::ConditionalEventWithoutTriggerUpdate]
        );
        assert!(run("conditional", raw.with_update_event_trigger()).is_empty());
    }
}
