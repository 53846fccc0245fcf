use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use super::source::{BusMessage, MessageSource};
use crate::domain::ports::{BusPublisher, PublishError};
use crate::domain::topics::topic_matches;

/// In-process publish/subscribe broker with retained messages.
///
/// Empty retained payloads clear the retained message for their topic, and
/// new subscribers first receive the retained messages matching their filters.
pub struct LoopbackBus {
    retained: Mutex<HashMap<String, Bytes>>,
    tx: broadcast::Sender<BusMessage>,
    connected: AtomicBool,
}

impl LoopbackBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            retained: Mutex::new(HashMap::new()),
            tx,
            connected: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn subscribe<S: AsRef<str>>(&self, filters: &[S]) -> Subscription {
        let filters: Vec<String> = filters.iter().map(|f| f.as_ref().to_owned()).collect();
        // subscribe under the lock so no publish slips between replay and live delivery
        let retained = self.retained.lock();
        let rx = self.tx.subscribe();
        let mut backlog: Vec<BusMessage> = retained
            .iter()
            .filter(|(topic, _)| filters.iter().any(|f| topic_matches(f, topic)))
            .map(|(topic, payload)| BusMessage {
                topic: topic.clone(),
                payload: payload.clone(),
                retained: true,
            })
            .collect();
        backlog.sort_by(|a, b| a.topic.cmp(&b.topic));
        Subscription {
            rx,
            filters,
            backlog: backlog.into(),
        }
    }

    /// Current retained payload for `topic`.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Bytes> {
        self.retained.lock().get(topic).cloned()
    }

    /// Simulates losing or regaining the broker connection.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl BusPublisher for LoopbackBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        retained: bool,
    ) -> Result<(), PublishError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PublishError::Disconnected);
        }
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(PublishError::Rejected {
                topic: topic.to_owned(),
                reason: "invalid topic name".to_owned(),
            });
        }

        let mut store = self.retained.lock();
        if retained {
            if payload.is_empty() {
                store.remove(topic);
            } else {
                store.insert(topic.to_owned(), payload.clone());
            }
        }
        // no live subscribers is not an error
        let _ = self.tx.send(BusMessage {
            topic: topic.to_owned(),
            payload,
            retained,
        });
        Ok(())
    }
}

/// Stream of messages matching a set of topic filters.
pub struct Subscription {
    rx: broadcast::Receiver<BusMessage>,
    filters: Vec<String>,
    backlog: VecDeque<BusMessage>,
}

impl Subscription {
    /// Next matching message, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        if let Some(msg) = self.backlog.pop_front() {
            return Some(msg);
        }
        loop {
            match self.rx.recv().await {
                Ok(msg) if self.matches(&msg.topic) => return Some(msg),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the bus; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, topic: &str) -> bool {
        self.filters.iter().any(|f| topic_matches(f, topic))
    }
}

#[async_trait]
impl MessageSource for Subscription {
    async fn recv(&mut self) -> Option<BusMessage> {
        Subscription::recv(self).await
    }
}
