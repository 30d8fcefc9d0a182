use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ExecutionId;
use crate::value::TypedValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionType {
    Message,
    Signal,
    Conditional,
    Compensate,
}

/// An open event subscription anchored at an execution.
///
/// For compensation subscriptions `activity_id` names the compensation
/// handler and `configuration`, when present, is the id of the event-scope
/// execution that keeps the compensated scope's state alive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubscription {
    pub id: String,
    pub execution_id: ExecutionId,
    pub process_definition_id: String,
    pub activity_id: String,
    pub event_type: SubscriptionType,
    pub event_name: Option<String>,
    pub configuration: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    /// Timer of a boundary, event-subprocess start, or intermediate catch event.
    TimerEvent,
    /// Asynchronous continuation before or after an activity.
    AsyncContinuation,
    /// Timeout of a task listener, bound to its task.
    TimeoutListener { listener_id: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub execution_id: ExecutionId,
    pub process_definition_id: String,
    pub activity_id: String,
    pub kind: JobKind,
    pub due_date: Option<DateTime<Utc>>,
    pub retries: u32,
    pub priority: i64,
    /// Handler configuration: the timer activity id for timers, the
    /// continuation phase for async jobs.
    pub configuration: Option<String>,
    pub exception_message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentType {
    FailedJob,
    FailedExternalTask,
    Custom(String),
}

/// A raised incident. `configuration` names the failed job for job incidents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub incident_type: IncidentType,
    pub execution_id: ExecutionId,
    pub activity_id: String,
    pub process_definition_id: String,
    pub configuration: Option<String>,
    pub incident_timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

/// A variable local to one execution.
///
/// `activity_instance_id` is a reporting anchor: for concurrent executions it
/// names the enclosing scope's activity instance, not the execution's own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableInstance {
    pub id: String,
    pub name: String,
    pub value: TypedValue,
    pub execution_id: ExecutionId,
    pub activity_instance_id: String,
}
