//! Error types for the dispatch engine.

/// Errors a handler reports from its execution.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),
    #[error("Invalid action settings: {0}")]
    InvalidSettings(String),
}

/// Errors from dispatching an action.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No handler registered for module: {0}")]
    UnknownHandler(String),
    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),
}
