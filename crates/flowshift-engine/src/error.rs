use flowshift_core::{
    EntityKind, IllegalTransition, InstanceMigrationError, PlanValidationError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Source process definition id is null")]
    SourceDefinitionIdNull,
    #[error("Target process definition id is null")]
    TargetDefinitionIdNull,
    #[error("Source process definition with id '{0}' does not exist")]
    SourceDefinitionMissing(String),
    #[error("Target process definition with id '{0}' does not exist")]
    TargetDefinitionMissing(String),
    #[error("Process instance '{0}' does not exist")]
    InstanceNotFound(String),
    #[error(transparent)]
    Plan(#[from] PlanValidationError),
    #[error(transparent)]
    Instance(#[from] InstanceMigrationError),
    #[error(transparent)]
    State(#[from] IllegalTransition),
    #[error("Failed to commit process instance '{process_instance_id}': {message}")]
    Store {
        process_instance_id: String,
        message: String,
    },
    #[error("Failed to start migration workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl MigrationError {
    /// Structured `(entity kind, entity id, message)` failures of a rejected instance.
    pub fn entries(&self) -> Vec<(EntityKind, String, String)> {
        match self {
            Self::Instance(InstanceMigrationError::Rejected(report)) => report.entries(),
            _ => Vec::new(),
        }
    }
}
