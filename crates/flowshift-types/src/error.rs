/// Errors raised while assembling a process model or manipulating an execution tree.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("activity '{0}' is declared twice")]
    DuplicateActivity(String),
    #[error("activity '{0}' does not exist")]
    UnknownActivity(String),
    #[error("sequence flow '{0}' is declared twice")]
    DuplicateFlow(String),
    #[error("multi-instance body '{0}' must contain exactly one inner activity")]
    MalformedMultiInstanceBody(String),
    #[error("boundary event '{event}' cannot attach to '{attached_to}'")]
    InvalidAttachment { event: String, attached_to: String },
    #[error("execution '{0}' does not exist")]
    UnknownExecution(String),
    #[error("execution '{0}' already exists")]
    DuplicateExecution(String),
    #[error("execution '{0}' still has children")]
    ExecutionHasChildren(String),
}
