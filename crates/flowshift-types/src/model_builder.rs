use std::collections::{BTreeMap, HashSet};

use crate::error::ModelError;
use crate::model::{
    Activity, ActivityKind, EventTrigger, GatewayKind, MULTI_INSTANCE_BODY_SUFFIX, ProcessModel,
    SequenceFlow,
};

/// Consuming builder for [`ProcessModel`].
///
/// Nested scopes are declared with closures; activities declared inside a
/// closure take the enclosing scope as their flow scope. Modifiers such as
/// [`async_before`](Self::async_before) apply to the most recently declared
/// activity. Errors are collected and the first one is returned by
/// [`build`](Self::build).
#[derive(Debug)]
pub struct ProcessModelBuilder {
    id: String,
    activities: BTreeMap<String, Activity>,
    flows: Vec<SequenceFlow>,
    scopes: Vec<String>,
    last: Option<String>,
    errors: Vec<ModelError>,
}

impl ProcessModelBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let mut activities = BTreeMap::new();
        activities.insert(
            id.clone(),
            Activity::new(id.clone(), ActivityKind::Process, None),
        );
        Self {
            scopes: vec![id.clone()],
            id,
            activities,
            flows: Vec::new(),
            last: None,
            errors: Vec::new(),
        }
    }

    fn add(mut self, activity: Activity) -> Self {
        if self.activities.contains_key(&activity.id) {
            self.errors
                .push(ModelError::DuplicateActivity(activity.id.clone()));
            return self;
        }
        self.last = Some(activity.id.clone());
        self.activities.insert(activity.id.clone(), activity);
        self
    }

    fn add_kind(self, id: &str, kind: ActivityKind) -> Self {
        let parent = self.scopes.last().cloned();
        self.add(Activity::new(id, kind, parent))
    }

    fn add_event(self, id: &str, kind: ActivityKind, trigger: Option<EventTrigger>) -> Self {
        let parent = self.scopes.last().cloned();
        let mut activity = Activity::new(id, kind, parent);
        activity.trigger = trigger;
        self.add(activity)
    }

    fn nested(
        self,
        id: &str,
        kind: ActivityKind,
        body: impl FnOnce(Self) -> Self,
    ) -> Self {
        let mut builder = self.add_kind(id, kind);
        builder.scopes.push(id.to_string());
        let mut builder = body(builder);
        builder.scopes.pop();
        builder.last = Some(id.to_string());
        builder
    }

    fn modify_last(mut self, f: impl FnOnce(&mut Activity)) -> Self {
        if let Some(activity) = self
            .last
            .as_ref()
            .and_then(|id| self.activities.get_mut(id))
        {
            f(activity);
        }
        self
    }

    pub fn user_task(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::UserTask)
    }

    pub fn receive_task(self, id: &str, message: &str) -> Self {
        self.add_event(
            id,
            ActivityKind::ReceiveTask,
            Some(EventTrigger::Message {
                name: message.to_string(),
            }),
        )
    }

    pub fn service_task(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::ServiceTask)
    }

    pub fn external_task(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::ExternalTask)
    }

    pub fn script_task(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::ScriptTask)
    }

    pub fn manual_task(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::ManualTask)
    }

    pub fn call_activity(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::CallActivity)
    }

    /// User task that only runs as a compensation handler.
    pub fn compensation_handler(self, id: &str) -> Self {
        self.add_kind(id, ActivityKind::UserTask)
            .modify_last(|a| a.is_for_compensation = true)
    }

    pub fn gateway(self, id: &str, kind: GatewayKind) -> Self {
        self.add_kind(id, ActivityKind::Gateway(kind))
    }

    pub fn parallel_gateway(self, id: &str) -> Self {
        self.gateway(id, GatewayKind::Parallel)
    }

    pub fn inclusive_gateway(self, id: &str) -> Self {
        self.gateway(id, GatewayKind::Inclusive)
    }

    pub fn start_event(self, id: &str) -> Self {
        self.add_event(id, ActivityKind::StartEvent, None)
    }

    /// Start event with an event definition; inside an event subprocess this is
    /// the subprocess's trigger.
    pub fn start_event_with(self, id: &str, trigger: EventTrigger) -> Self {
        self.add_event(id, ActivityKind::StartEvent, Some(trigger))
    }

    pub fn end_event(self, id: &str) -> Self {
        self.add_event(id, ActivityKind::EndEvent, None)
    }

    pub fn end_event_with(self, id: &str, trigger: EventTrigger) -> Self {
        self.add_event(id, ActivityKind::EndEvent, Some(trigger))
    }

    pub fn intermediate_catch_event(self, id: &str, trigger: EventTrigger) -> Self {
        self.add_event(id, ActivityKind::IntermediateCatchEvent, Some(trigger))
    }

    pub fn intermediate_throw_event(self, id: &str, trigger: EventTrigger) -> Self {
        self.add_event(id, ActivityKind::IntermediateThrowEvent, Some(trigger))
    }

    /// Boundary event attached to `attached_to`. Its flow scope and event scope
    /// are resolved in [`build`](Self::build).
    pub fn boundary_event(self, id: &str, attached_to: &str, trigger: EventTrigger) -> Self {
        self.add_event(id, ActivityKind::BoundaryEvent, Some(trigger))
            .modify_last(|a| a.attached_to = Some(attached_to.to_string()))
    }

    pub fn compensation_boundary_event(self, id: &str, attached_to: &str, handler: &str) -> Self {
        self.boundary_event(id, attached_to, EventTrigger::Compensation)
            .modify_last(|a| a.compensation_handler = Some(handler.to_string()))
    }

    pub fn sub_process(self, id: &str, body: impl FnOnce(Self) -> Self) -> Self {
        self.nested(id, ActivityKind::SubProcess, body)
    }

    pub fn transaction(self, id: &str, body: impl FnOnce(Self) -> Self) -> Self {
        self.nested(id, ActivityKind::Transaction, body)
    }

    pub fn event_sub_process(self, id: &str, body: impl FnOnce(Self) -> Self) -> Self {
        self.nested(id, ActivityKind::EventSubProcess, body)
    }

    /// Multi-instance body named `<inner_id>#multiInstanceBody`; `body` must
    /// declare the inner activity `inner_id`.
    pub fn multi_instance(
        self,
        inner_id: &str,
        sequential: bool,
        body: impl FnOnce(Self) -> Self,
    ) -> Self {
        let body_id = format!("{inner_id}{MULTI_INSTANCE_BODY_SUFFIX}");
        let builder = self.nested(
            &body_id,
            ActivityKind::MultiInstanceBody { sequential },
            body,
        );
        ProcessModelBuilder {
            last: Some(inner_id.to_string()),
            ..builder
        }
    }

    pub fn flow(mut self, id: &str, source: &str, target: &str) -> Self {
        self.flows.push(SequenceFlow {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn async_before(self) -> Self {
        self.modify_last(|a| a.async_before = true)
    }

    pub fn async_after(self) -> Self {
        self.modify_last(|a| a.async_after = true)
    }

    pub fn non_interrupting(self) -> Self {
        self.modify_last(|a| a.interrupting = false)
    }

    /// Force a scope execution for the last activity (e.g. it declares I/O mappings).
    pub fn scope(self) -> Self {
        self.modify_last(|a| a.is_scope = true)
    }

    pub fn build(mut self) -> Result<ProcessModel, ModelError> {
        if let Some(err) = std::mem::take(&mut self.errors).into_iter().next() {
            return Err(err);
        }

        self.resolve_boundary_events()?;
        self.resolve_event_subprocess_starts();
        self.resolve_multi_instance_bodies()?;
        self.check_references()?;

        Ok(ProcessModel {
            id: self.id,
            activities: self.activities,
            flows: self.flows,
        })
    }

    fn resolve_boundary_events(&mut self) -> Result<(), ModelError> {
        let boundaries: Vec<(String, String)> = self
            .activities
            .values()
            .filter_map(|a| Some((a.id.clone(), a.attached_to.clone()?)))
            .collect();

        for (event_id, attached_id) in boundaries {
            let attached = self
                .activities
                .get(&attached_id)
                .ok_or_else(|| ModelError::UnknownActivity(attached_id.clone()))?;
            if attached.kind == ActivityKind::Process {
                return Err(ModelError::InvalidAttachment {
                    event: event_id,
                    attached_to: attached_id,
                });
            }

            // Events on a multi-instance activity belong to its body.
            let body_id = format!("{attached_id}{MULTI_INSTANCE_BODY_SUFFIX}");
            let event_scope = match attached.parent_id.as_deref() {
                Some(parent) if parent == body_id => body_id,
                _ => attached_id,
            };
            let flow_scope = self
                .activities
                .get(&event_scope)
                .and_then(|a| a.parent_id.clone());

            if let Some(scope) = self.activities.get_mut(&event_scope) {
                scope.is_scope = true;
            }
            if let Some(event) = self.activities.get_mut(&event_id) {
                event.parent_id = flow_scope;
                event.event_scope_id = Some(event_scope);
            }
        }
        Ok(())
    }

    fn resolve_event_subprocess_starts(&mut self) {
        let starts: Vec<(String, Option<String>)> = self
            .activities
            .values()
            .filter(|a| a.kind == ActivityKind::StartEvent && a.trigger.is_some())
            .filter_map(|a| {
                let esp = self.activities.get(a.parent_id.as_deref()?)?;
                (esp.kind == ActivityKind::EventSubProcess)
                    .then(|| (a.id.clone(), esp.parent_id.clone()))
            })
            .collect();

        for (start_id, event_scope) in starts {
            if let Some(start) = self.activities.get_mut(&start_id) {
                start.event_scope_id = event_scope;
            }
        }
    }

    fn resolve_multi_instance_bodies(&mut self) -> Result<(), ModelError> {
        let bodies: Vec<String> = self
            .activities
            .values()
            .filter(|a| a.is_multi_instance_body())
            .map(|a| a.id.clone())
            .collect();

        for body_id in bodies {
            let inner: Vec<String> = self
                .activities
                .values()
                .filter(|a| a.parent_id.as_deref() == Some(body_id.as_str()))
                .map(|a| a.id.clone())
                .collect();
            let [inner_id] = inner.as_slice() else {
                return Err(ModelError::MalformedMultiInstanceBody(body_id));
            };
            if let Some(inner) = self.activities.get_mut(inner_id) {
                inner.is_scope = true;
            }
        }
        Ok(())
    }

    fn check_references(&self) -> Result<(), ModelError> {
        let mut flow_ids = HashSet::new();
        for flow in &self.flows {
            if !flow_ids.insert(flow.id.as_str()) {
                return Err(ModelError::DuplicateFlow(flow.id.clone()));
            }
            for end in [&flow.source, &flow.target] {
                if !self.activities.contains_key(end) {
                    return Err(ModelError::UnknownActivity(end.clone()));
                }
            }
        }
        for handler in self
            .activities
            .values()
            .filter_map(|a| a.compensation_handler.as_ref())
        {
            if !self.activities.contains_key(handler) {
                return Err(ModelError::UnknownActivity(handler.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventKind;

    #[test]
    fn nested_scopes_set_parents() {
        let model = ProcessModelBuilder::new("p")
            .sub_process("outer", |s| s.sub_process("inner", |s| s.user_task("task")))
            .user_task("after")
            .build()
            .unwrap();

        assert_eq!(
            model.activity("task").unwrap().parent_id.as_deref(),
            Some("inner")
        );
        assert_eq!(
            model.activity("inner").unwrap().parent_id.as_deref(),
            Some("outer")
        );
        assert_eq!(model.activity("after").unwrap().parent_id.as_deref(), Some("p"));
    }

    #[test]
    fn duplicate_activity_is_rejected() {
        let err = ProcessModelBuilder::new("p")
            .user_task("task")
            .user_task("task")
            .build()
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateActivity("task".into()));
    }

    #[test]
    fn multi_instance_inner_activity_becomes_scope() {
        let model = ProcessModelBuilder::new("p")
            .multi_instance("userTask", false, |b| b.user_task("userTask"))
            .boundary_event(
                "timer",
                "userTask",
                EventTrigger::Timer(crate::model::TimerDefinition::Duration { seconds: 5 }),
            )
            .build()
            .unwrap();

        let inner = model.activity("userTask").unwrap();
        assert!(inner.is_scope);
        assert_eq!(inner.parent_id.as_deref(), Some("userTask#multiInstanceBody"));
        let timer = model.activity("timer").unwrap();
        assert_eq!(
            timer.event_scope_id.as_deref(),
            Some("userTask#multiInstanceBody")
        );
        assert_eq!(timer.parent_id.as_deref(), Some("p"));
        assert_eq!(
            model.inner_activity("userTask#multiInstanceBody").unwrap().id,
            "userTask"
        );
    }

    #[test]
    fn compensation_boundary_links_handler() {
        let model = ProcessModelBuilder::new("p")
            .user_task("userTask1")
            .compensation_boundary_event("compensationBoundary", "userTask1", "compensationHandler")
            .compensation_handler("compensationHandler")
            .build()
            .unwrap();

        let boundary = model.compensation_boundary_for("compensationHandler").unwrap();
        assert_eq!(boundary.id, "compensationBoundary");
        assert_eq!(boundary.event_kind(), Some(EventKind::Compensation));
        assert!(model.activity("compensationHandler").unwrap().is_for_compensation);
    }

    #[test]
    fn flow_to_unknown_activity_is_rejected() {
        let err = ProcessModelBuilder::new("p")
            .user_task("a")
            .flow("f1", "a", "b")
            .build()
            .unwrap_err();
        assert_eq!(err, ModelError::UnknownActivity("b".into()));
    }

    #[test]
    fn boundary_on_process_is_rejected() {
        let err = ProcessModelBuilder::new("p")
            .boundary_event("b", "p", EventTrigger::Signal { name: "s".into() })
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidAttachment {
                event: "b".into(),
                attached_to: "p".into()
            }
        );
    }
}
