use crate::domain::ports::PublishError;

/// Domain-level errors for the node registry
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bus publish failed: {0}")]
    Transport(#[from] PublishError),

    #[error("File storage error: {0}")]
    Io(#[from] std::io::Error),
}
