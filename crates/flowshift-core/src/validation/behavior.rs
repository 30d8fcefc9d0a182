use flowshift_types::Activity;

use crate::error::PlanViolation;

use super::Resolved;

pub(crate) fn check(resolved: &Resolved<'_>, violations: &mut Vec<PlanViolation>) {
    let (source, target) = (resolved.source, resolved.target);
    let mut supported = true;
    if !source.is_migratable() {
        violations.push(PlanViolation::SourceActivityNotSupported);
        supported = false;
    }
    if !target.is_migratable() {
        violations.push(PlanViolation::TargetActivityNotSupported);
        supported = false;
    }
    if !supported {
        return;
    }

    if !same_behavior(source, target) {
        violations.push(PlanViolation::IncompatibleTypes {
            source_behavior: source.behavior_name().to_string(),
            target_behavior: target.behavior_name().to_string(),
        });
        return;
    }
    if let Err(v) = same_event_type(source, target) {
        violations.push(v);
    }
}

/// Capability tags must match exactly, including gateway and multi-instance flavor.
pub(crate) fn same_behavior(source: &Activity, target: &Activity) -> bool {
    source.kind == target.kind && source.is_event_subprocess_start() == target.is_event_subprocess_start()
}

pub(crate) fn same_event_type(source: &Activity, target: &Activity) -> Result<(), PlanViolation> {
    match (source.event_type_name(), target.event_type_name()) {
        (Some(s), Some(t)) if s != t => Err(PlanViolation::DifferentEventTypes {
            source_type: s.to_string(),
            target_type: t.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Whether `source` may be mapped onto `target` at all.
pub(crate) fn is_compatible(source: &Activity, target: &Activity) -> bool {
    source.is_migratable()
        && target.is_migratable()
        && same_behavior(source, target)
        && same_event_type(source, target).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowshift_types::{EventTrigger, ProcessModel};

    fn model() -> ProcessModel {
        ProcessModel::builder("proc")
            .user_task("userTask")
            .receive_task("receiveTask", "Message")
            .script_task("scriptTask")
            .boundary_event(
                "messageBoundary",
                "userTask",
                EventTrigger::Message { name: "m".into() },
            )
            .boundary_event(
                "signalBoundary",
                "receiveTask",
                EventTrigger::Signal { name: "s".into() },
            )
            .build()
            .unwrap()
    }

    fn run(source: &str, target: &str) -> Vec<PlanViolation> {
        let model = model();
        let raw = crate::plan::RawInstruction::new(source, target);
        let resolved = Resolved {
            raw: &raw,
            source: model.activity(source).unwrap(),
            target: model.activity(target).unwrap(),
        };
        let mut violations = Vec::new();
        check(&resolved, &mut violations);
        violations
    }

    #[test]
    fn incompatible_tasks_name_both_behaviors() {
        assert_eq!(
            run("userTask", "receiveTask")
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec![
                "Activities have incompatible types (UserTaskActivityBehavior is not compatible with ReceiveTaskActivityBehavior)"
            ]
        );
    }

    #[test]
    fn boundary_events_must_share_event_type() {
        assert_eq!(
            run("messageBoundary", "signalBoundary"),
            vec![PlanViolation::DifferentEventTypes {
                source_type: "boundaryMessage".into(),
                target_type: "boundarySignal".into(),
            }]
        );
    }

    #[test]
    fn unsupported_activities_skip_behavior_check() {
        assert_eq!(
            run("scriptTask", "userTask"),
            vec![PlanViolation::SourceActivityNotSupported]
        );
    }
}
