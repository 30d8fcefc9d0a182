//! Instructions for every activity that keeps its id between two models.

use flowshift_types::{Activity, EventKind, ProcessModel};
use std::collections::{HashMap, VecDeque};

use crate::plan::RawInstruction;
use crate::validation::behavior;

/// Map every source activity onto the equally named target activity when the
/// pair is compatible and its surroundings are mapped as well.
///
/// The source tree is walked top-down so that an activity is only considered
/// once its flow scope is settled. Events attached to a scope are handled after
/// all scopes, because they require their event scope to be mapped too. The
/// result always passes plan validation.
pub fn generate(
    source: &ProcessModel,
    target: &ProcessModel,
    update_event_triggers: bool,
) -> Vec<RawInstruction> {
    let mut mapped: HashMap<&str, &str> = HashMap::new();
    mapped.insert(source.id(), target.id());
    let mut generated = Vec::new();

    let mut queue = VecDeque::from([source.id()]);
    let mut deferred_events = Vec::new();
    while let Some(scope) = queue.pop_front() {
        for activity in source.children(scope) {
            if activity.event_scope_id.is_some() {
                deferred_events.push(activity);
                continue;
            }
            if let Some(target_activity) = equal_candidate(source, target, &mapped, activity) {
                mapped.insert(&activity.id, &target_activity.id);
                generated.push(instruction(activity, update_event_triggers));
                queue.push_back(&activity.id);
            }
        }
    }

    for event in deferred_events {
        let Some(target_event) = equal_candidate(source, target, &mapped, event) else {
            continue;
        };
        let scopes_mapped = match (
            event.event_scope_id.as_deref(),
            target_event.event_scope_id.as_deref(),
        ) {
            (Some(s), Some(t)) => mapped.get(s) == Some(&t),
            _ => false,
        };
        if scopes_mapped {
            mapped.insert(&event.id, &target_event.id);
            generated.push(instruction(event, update_event_triggers));
        }
    }

    retain_complete_multi_instance(source, target, generated)
}

fn equal_candidate<'t>(
    source: &ProcessModel,
    target: &'t ProcessModel,
    mapped: &HashMap<&str, &str>,
    activity: &Activity,
) -> Option<&'t Activity> {
    let candidate = target.activity(&activity.id)?;
    if !behavior::is_compatible(activity, candidate) {
        return None;
    }
    let (source_parent, target_parent) = (activity.parent_id.as_deref()?, candidate.parent_id.as_deref()?);
    if mapped.get(source_parent) != Some(&target_parent) {
        return None;
    }
    if activity.kind.is_gateway()
        && target.incoming(&candidate.id).count() < source.incoming(&activity.id).count()
    {
        return None;
    }
    Some(candidate)
}

fn instruction(activity: &Activity, update_event_triggers: bool) -> RawInstruction {
    let persistent = activity.has_persistent_trigger();
    let conditional = persistent && activity.event_kind() == Some(EventKind::Conditional);
    RawInstruction {
        update_event_trigger: (update_event_triggers && persistent) || conditional,
        ..RawInstruction::new(activity.id.clone(), activity.id.clone())
    }
}

/// Drop multi-instance bodies whose inner activity could not be mapped, along
/// with everything generated below them.
fn retain_complete_multi_instance(
    source: &ProcessModel,
    target: &ProcessModel,
    generated: Vec<RawInstruction>,
) -> Vec<RawInstruction> {
    let is_generated = |id: &str| {
        generated
            .iter()
            .any(|r| r.source_activity_id.as_deref() == Some(id))
    };
    let broken: Vec<String> = generated
        .iter()
        .filter_map(|r| r.source_activity_id.as_deref())
        .filter(|id| source.activity(id).is_some_and(Activity::is_multi_instance_body))
        .filter(|id| {
            let source_inner = source.inner_activity(id).map(|a| a.id.as_str());
            let target_inner = target.inner_activity(id).map(|a| a.id.as_str());
            source_inner != target_inner || !source_inner.is_some_and(is_generated)
        })
        .map(str::to_string)
        .collect();

    generated
        .into_iter()
        .filter(|r| {
            let Some(id) = r.source_activity_id.as_deref() else {
                return false;
            };
            let event_scope = source.activity(id).and_then(|a| a.event_scope_id.clone());
            !broken.iter().any(|body| {
                body == id
                    || source.is_ancestor(body, id)
                    || event_scope.as_deref() == Some(body.as_str())
            })
        })
        .collect()
}
