pub mod equal_ids;
pub mod error;
pub mod expression;
pub(crate) mod facets;
pub mod lifecycle;
pub mod matcher;
pub mod migrate;
pub mod plan;
pub mod snapshot_builder;
pub mod status;
pub mod transform;
pub mod tree_invariants;
pub mod validation;

pub use error::{
    EntityFailure, EntityKind, InstanceMigrationError, InstanceValidationReport,
    InstanceViolation, PlanValidationError, PlanValidationReport, PlanViolation,
};
pub use expression::{ExpressionResolver, PlaceholderResolver};
pub use lifecycle::{ListenerError, NoopListener, ScopeEvent, ScopeLifecycleListener, ScopeTransition};
pub use migrate::{MigratedInstance, MigrationContext, MigrationOptions, migrate_instance};
pub use plan::{MigrationInstruction, MigrationPlan, MigrationPlanBuilder, RawInstruction};
pub use snapshot_builder::{ActiveTransition, SnapshotBuildError, SnapshotBuilder};
pub use status::{IllegalTransition, MigrationProgress, MigrationState, MigrationStep};
pub use tree_invariants::{TreeViolation, check_tree};
