pub mod activity_instance;
pub mod error;
pub mod facets;
pub mod ids;
pub mod model;
pub mod model_builder;
pub mod runtime;
pub mod snapshot;
pub mod value;

pub use activity_instance::{
    ActivityInstance, ActivityInstanceTree, EventScopeInstance, TransitionInstance,
};
pub use error::ModelError;
pub use facets::{
    EventSubscription, Incident, IncidentType, Job, JobKind, SubscriptionType, VariableInstance,
};
pub use ids::{ExecutionId, IdGenerator};
pub use model::{
    Activity, ActivityKind, EventKind, EventTrigger, GatewayKind, MULTI_INSTANCE_BODY_SUFFIX,
    ProcessModel, SequenceFlow, TimerDefinition,
};
pub use model_builder::ProcessModelBuilder;
pub use runtime::{AsyncPhase, Execution, ExecutionTree, PendingTransition};
pub use snapshot::InstanceSnapshot;
pub use value::{JAVA_SERIALIZATION_FORMAT, TypedValue};
