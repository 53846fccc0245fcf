//! Output ports (interfaces) for the domain service.

use async_trait::async_trait;
use bytes::Bytes;

/// Failure reported by the bus while publishing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("bus is not connected")]
    Disconnected,

    #[error("publish to '{topic}' rejected: {reason}")]
    Rejected { topic: String, reason: String },
}

/// Port for publishing messages on the device bus.
///
/// Implementations return once the bus has accepted the message; delivery to
/// the device is not awaited.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Bytes, retained: bool)
    -> Result<(), PublishError>;
}
