//! Read-only process model view.
//!
//! A [`ProcessModel`] is a flat table of [`Activity`] records keyed by id. The
//! process itself is an activity of kind [`ActivityKind::Process`] whose id is the
//! process definition id; every other activity names its flow scope through
//! `parent_id`. Activity behavior is described by a capability tag plus an
//! optional [`EventTrigger`], so type compatibility and trigger-update
//! eligibility are table lookups rather than class hierarchies.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model_builder::ProcessModelBuilder;

/// Suffix appended to an inner activity id to name its multi-instance body.
pub const MULTI_INSTANCE_BODY_SUFFIX: &str = "#multiInstanceBody";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayKind {
    Parallel,
    Inclusive,
    Exclusive,
    EventBased,
}

/// Capability tag of an activity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityKind {
    /// The process definition itself (root scope).
    Process,
    UserTask,
    ReceiveTask,
    ServiceTask,
    ExternalTask,
    ScriptTask,
    ManualTask,
    SendTask,
    BusinessRuleTask,
    CallActivity,
    SubProcess,
    Transaction,
    EventSubProcess,
    MultiInstanceBody { sequential: bool },
    StartEvent,
    BoundaryEvent,
    IntermediateCatchEvent,
    IntermediateThrowEvent,
    EndEvent,
    Gateway(GatewayKind),
}

impl ActivityKind {
    /// Whether activities of this kind always own a scope execution.
    pub fn is_scope_by_default(&self) -> bool {
        matches!(
            self,
            Self::Process
                | Self::SubProcess
                | Self::Transaction
                | Self::EventSubProcess
                | Self::CallActivity
                | Self::MultiInstanceBody { .. }
        )
    }

    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::Gateway(_))
    }
}

/// Event definition kind, without the resolvable payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Message,
    Signal,
    Timer,
    Error,
    Escalation,
    Compensation,
    Conditional,
    Cancel,
}

/// When a timer fires, relative to the moment it is armed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerDefinition {
    Duration { seconds: i64 },
    Date(DateTime<Utc>),
}

impl TimerDefinition {
    pub fn due_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Duration { seconds } => now + Duration::seconds(*seconds),
            Self::Date(date) => *date,
        }
    }
}

/// Event definition attached to an event activity.
///
/// Message and signal names may contain `${variable}` placeholders that are
/// resolved against instance variables when the trigger is armed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTrigger {
    Message { name: String },
    Signal { name: String },
    Timer(TimerDefinition),
    Error { code: Option<String> },
    Escalation { code: Option<String> },
    Compensation,
    Conditional { condition: String },
    Cancel,
}

impl EventTrigger {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message { .. } => EventKind::Message,
            Self::Signal { .. } => EventKind::Signal,
            Self::Timer(_) => EventKind::Timer,
            Self::Error { .. } => EventKind::Error,
            Self::Escalation { .. } => EventKind::Escalation,
            Self::Compensation => EventKind::Compensation,
            Self::Conditional { .. } => EventKind::Conditional,
            Self::Cancel => EventKind::Cancel,
        }
    }

    /// Triggers that persist as a subscription or timer job while armed.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::Message | EventKind::Signal | EventKind::Timer | EventKind::Conditional
        )
    }
}

/// A directed sequence flow between two activities of the same flow scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFlow {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// One activity of a process model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub kind: ActivityKind,
    /// Flow scope. `None` only for the process activity.
    pub parent_id: Option<String>,
    pub is_scope: bool,
    /// Activity whose lifecycle the event reacts to (boundary events and
    /// event-subprocess start events).
    pub event_scope_id: Option<String>,
    /// Declared attachment of a boundary event.
    pub attached_to: Option<String>,
    pub trigger: Option<EventTrigger>,
    pub interrupting: bool,
    pub async_before: bool,
    pub async_after: bool,
    /// Handler invoked when a compensation boundary event is triggered.
    pub compensation_handler: Option<String>,
    pub is_for_compensation: bool,
}

impl Activity {
    pub fn new(id: impl Into<String>, kind: ActivityKind, parent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id,
            is_scope: kind.is_scope_by_default(),
            event_scope_id: None,
            attached_to: None,
            trigger: None,
            interrupting: true,
            async_before: false,
            async_after: false,
            compensation_handler: None,
            is_for_compensation: false,
        }
    }

    pub fn is_multi_instance_body(&self) -> bool {
        matches!(self.kind, ActivityKind::MultiInstanceBody { .. })
    }

    pub fn is_boundary_event(&self) -> bool {
        self.kind == ActivityKind::BoundaryEvent
    }

    /// Start event of an event subprocess (it carries an event scope).
    pub fn is_event_subprocess_start(&self) -> bool {
        self.kind == ActivityKind::StartEvent && self.event_scope_id.is_some()
    }

    pub fn event_kind(&self) -> Option<EventKind> {
        self.trigger.as_ref().map(EventTrigger::kind)
    }

    /// Events whose trigger persists while armed and can therefore be updated
    /// during migration.
    pub fn has_persistent_trigger(&self) -> bool {
        let positioned = self.is_boundary_event()
            || self.is_event_subprocess_start()
            || self.kind == ActivityKind::IntermediateCatchEvent;
        positioned && self.trigger.as_ref().is_some_and(EventTrigger::is_persistent)
    }

    /// Whether running instances of this activity can be migrated at all.
    pub fn is_migratable(&self) -> bool {
        let by_kind = match self.kind {
            ActivityKind::Process
            | ActivityKind::UserTask
            | ActivityKind::ReceiveTask
            | ActivityKind::ExternalTask
            | ActivityKind::CallActivity
            | ActivityKind::SubProcess
            | ActivityKind::Transaction
            | ActivityKind::EventSubProcess
            | ActivityKind::MultiInstanceBody { .. }
            | ActivityKind::BoundaryEvent
            | ActivityKind::IntermediateCatchEvent => true,
            ActivityKind::StartEvent => self.is_event_subprocess_start(),
            ActivityKind::Gateway(kind) => kind != GatewayKind::Exclusive,
            _ => false,
        };
        by_kind || self.async_before || self.async_after
    }

    /// Behavior name used when reporting incompatible activity types.
    pub fn behavior_name(&self) -> &'static str {
        match self.kind {
            ActivityKind::Process => "ProcessDefinitionBehavior",
            ActivityKind::UserTask => "UserTaskActivityBehavior",
            ActivityKind::ReceiveTask => "ReceiveTaskActivityBehavior",
            ActivityKind::ServiceTask => "ServiceTaskDelegateActivityBehavior",
            ActivityKind::ExternalTask => "ExternalTaskActivityBehavior",
            ActivityKind::ScriptTask => "ScriptTaskActivityBehavior",
            ActivityKind::ManualTask => "TaskActivityBehavior",
            ActivityKind::SendTask => "SendTaskActivityBehavior",
            ActivityKind::BusinessRuleTask => "DmnBusinessRuleTaskActivityBehavior",
            ActivityKind::CallActivity => "CallActivityBehavior",
            ActivityKind::SubProcess | ActivityKind::Transaction => "SubProcessActivityBehavior",
            ActivityKind::EventSubProcess => "EventSubProcessActivityBehavior",
            ActivityKind::MultiInstanceBody { sequential: false } => {
                "ParallelMultiInstanceActivityBehavior"
            }
            ActivityKind::MultiInstanceBody { sequential: true } => {
                "SequentialMultiInstanceActivityBehavior"
            }
            ActivityKind::StartEvent if self.is_event_subprocess_start() => {
                "EventSubProcessStartEventActivityBehavior"
            }
            ActivityKind::StartEvent => "NoneStartEventActivityBehavior",
            ActivityKind::BoundaryEvent => "BoundaryEventActivityBehavior",
            ActivityKind::IntermediateCatchEvent => "IntermediateCatchEventActivityBehavior",
            ActivityKind::IntermediateThrowEvent => match self.event_kind() {
                Some(EventKind::Compensation) => "CompensationEventActivityBehavior",
                _ => "IntermediateThrowEventActivityBehavior",
            },
            ActivityKind::EndEvent => match self.event_kind() {
                Some(EventKind::Cancel) => "CancelEndEventActivityBehavior",
                Some(EventKind::Compensation) => "CompensationEventActivityBehavior",
                _ => "NoneEndEventActivityBehavior",
            },
            ActivityKind::Gateway(GatewayKind::Parallel) => "ParallelGatewayActivityBehavior",
            ActivityKind::Gateway(GatewayKind::Inclusive) => "InclusiveGatewayActivityBehavior",
            ActivityKind::Gateway(GatewayKind::Exclusive) => "ExclusiveGatewayActivityBehavior",
            ActivityKind::Gateway(GatewayKind::EventBased) => "EventBasedGatewayActivityBehavior",
        }
    }

    /// Event type name used when reporting mismatching event definitions.
    pub fn event_type_name(&self) -> Option<&'static str> {
        let kind = self.event_kind()?;
        let name = if self.is_boundary_event() {
            match kind {
                EventKind::Message => "boundaryMessage",
                EventKind::Signal => "boundarySignal",
                EventKind::Timer => "boundaryTimer",
                EventKind::Error => "boundaryError",
                EventKind::Escalation => "boundaryEscalation",
                EventKind::Compensation => "compensationBoundaryCatch",
                EventKind::Conditional => "boundaryConditional",
                EventKind::Cancel => "cancelBoundaryCatch",
            }
        } else if self.is_event_subprocess_start() {
            match kind {
                EventKind::Message => "messageStartEvent",
                EventKind::Signal => "signalStartEvent",
                EventKind::Timer => "startTimerEvent",
                EventKind::Error => "errorStartEvent",
                EventKind::Escalation => "escalationStartEvent",
                EventKind::Compensation => "compensationStartEvent",
                EventKind::Conditional => "conditionalStartEvent",
                EventKind::Cancel => return None,
            }
        } else if self.kind == ActivityKind::IntermediateCatchEvent {
            match kind {
                EventKind::Message => "intermediateMessageCatch",
                EventKind::Signal => "intermediateSignalCatch",
                EventKind::Timer => "intermediateTimer",
                EventKind::Conditional => "intermediateConditional",
                _ => return None,
            }
        } else {
            return None;
        };
        Some(name)
    }
}

/// Read-only view over one deployed process definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessModel {
    pub(crate) id: String,
    pub(crate) activities: BTreeMap<String, Activity>,
    pub(crate) flows: Vec<SequenceFlow>,
}

impl ProcessModel {
    pub fn builder(id: impl Into<String>) -> ProcessModelBuilder {
        ProcessModelBuilder::new(id)
    }

    /// Process definition id; also the id of the root [`ActivityKind::Process`] activity.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> Option<&Activity> {
        self.activities.get(&self.id)
    }

    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    pub fn flows(&self) -> &[SequenceFlow] {
        &self.flows
    }

    pub fn is_root(&self, id: &str) -> bool {
        id == self.id
    }

    pub fn flow_scope(&self, id: &str) -> Option<&Activity> {
        self.activity(id)?
            .parent_id
            .as_deref()
            .and_then(|parent| self.activity(parent))
    }

    /// Direct children in the flow-scope tree, in id order.
    pub fn children(&self, id: &str) -> impl Iterator<Item = &Activity> {
        self.activities
            .values()
            .filter(move |a| a.parent_id.as_deref() == Some(id))
    }

    /// Flow-scope chain above `id`, nearest first, ending with the process activity.
    pub fn ancestors(&self, id: &str) -> Vec<&Activity> {
        let mut chain = Vec::new();
        let mut current = self.flow_scope(id);
        while let Some(activity) = current {
            chain.push(activity);
            current = self.flow_scope(&activity.id);
        }
        chain
    }

    /// Whether `ancestor` lies strictly above `descendant` in the flow-scope tree.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.ancestors(descendant).iter().any(|a| a.id == ancestor)
    }

    /// Boundary and event-subprocess start events whose event scope is `scope_id`.
    pub fn events_of_scope(&self, scope_id: &str) -> impl Iterator<Item = &Activity> {
        self.activities
            .values()
            .filter(move |a| a.event_scope_id.as_deref() == Some(scope_id))
    }

    /// Inner activity of a multi-instance body.
    pub fn inner_activity(&self, body_id: &str) -> Option<&Activity> {
        let body = self.activity(body_id)?;
        if !body.is_multi_instance_body() {
            return None;
        }
        self.children(body_id).next()
    }

    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &SequenceFlow> {
        self.flows.iter().filter(move |f| f.target == id)
    }

    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &SequenceFlow> {
        self.flows.iter().filter(move |f| f.source == id)
    }

    /// The compensation boundary event that invokes `handler_id`.
    pub fn compensation_boundary_for(&self, handler_id: &str) -> Option<&Activity> {
        self.activities.values().find(|a| {
            a.is_boundary_event() && a.compensation_handler.as_deref() == Some(handler_id)
        })
    }

    /// The compensation start event of an event subprocess.
    pub fn compensation_start_of(&self, event_sub_process_id: &str) -> Option<&Activity> {
        self.children(event_sub_process_id).find(|a| {
            a.is_event_subprocess_start() && a.event_kind() == Some(EventKind::Compensation)
        })
    }
}
