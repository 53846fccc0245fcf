use async_trait::async_trait;
use bytes::Bytes;

/// A message as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retained: bool,
}

impl BusMessage {
    /// An empty retained payload only clears the broker's retained copy.
    #[must_use]
    pub fn is_retained_clear(&self) -> bool {
        self.retained && self.payload.is_empty()
    }
}

/// Inbound side of a bus: the messages matching the subscribed filters.
#[async_trait]
pub trait MessageSource: Send {
    /// Next message, or `None` once the bus is gone.
    async fn recv(&mut self) -> Option<BusMessage>;
}
