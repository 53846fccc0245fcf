//! MQTT transport backed by `rumqttc`.
//!
//! One background task drives the connection. It resubscribes after every
//! `CONNACK` and retries at a fixed interval while the broker is unreachable.
//!
//! Brokers clear the retain flag on live deliveries, so the echo of a clear
//! this client published would look like empty telemetry. The client keeps
//! the topics it cleared and restores the flag when the echo comes back.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::source::{BusMessage, MessageSource};
use crate::domain::ports::{BusPublisher, PublishError};

const DEFAULT_PORT: u16 = 1883;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum MqttSetupError {
    #[error("invalid broker address '{0}', expected tcp://host:port")]
    InvalidBroker(String),
}

/// Connection settings for the MQTT broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttSettings {
    /// `tcp://host:port`, `mqtt://host:port` or a bare `host[:port]`.
    pub broker: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Generated from the current time when unset.
    pub client_id: Option<String>,
    #[serde(with = "crate::config::humantime_duration")]
    pub keep_alive: Duration,
    /// Pause between reconnect attempts.
    #[serde(with = "crate::config::humantime_duration")]
    pub retry_interval: Duration,
    /// Capacity of the outgoing request queue and of the inbound message queue.
    pub queue_capacity: usize,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker: format!("tcp://127.0.0.1:{DEFAULT_PORT}"),
            username: None,
            password: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            retry_interval: Duration::from_secs(2),
            queue_capacity: 256,
        }
    }
}

impl MqttSettings {
    /// Splits `broker` into host and port.
    ///
    /// # Errors
    /// Returns [`MqttSetupError::InvalidBroker`] for an empty host or a bad port.
    pub fn broker_address(&self) -> Result<(String, u16), MqttSetupError> {
        let broker = self.broker.trim();
        let invalid = || MqttSetupError::InvalidBroker(self.broker.clone());
        let rest = broker
            .strip_prefix("tcp://")
            .or_else(|| broker.strip_prefix("mqtt://"))
            .unwrap_or(broker);
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (rest, DEFAULT_PORT),
        };
        if host.is_empty() || host.contains('/') {
            return Err(invalid());
        }
        Ok((host.to_owned(), port))
    }

    fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("fleet-dashboard-{}", chrono::Utc::now().timestamp()))
    }

    fn options(&self) -> Result<MqttOptions, MqttSetupError> {
        let (host, port) = self.broker_address()?;
        let mut options = MqttOptions::new(self.client_id(), host, port);
        options.set_keep_alive(self.keep_alive.max(MIN_KEEP_ALIVE));
        if let Some(username) = &self.username {
            options.set_credentials(username.clone(), self.password.clone().unwrap_or_default());
        }
        Ok(options)
    }

    fn capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

/// Publishing half of the MQTT connection.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    pending_clears: Arc<Mutex<HashSet<String>>>,
}

/// Messages received on the subscribed filters.
pub struct MqttMessages {
    rx: mpsc::Receiver<BusMessage>,
}

impl MqttBus {
    /// Starts the connection task. Messages matching `filters` arrive on the
    /// returned [`MqttMessages`]; the task ends when `cancel` fires or the
    /// receiver is dropped.
    ///
    /// # Errors
    /// Returns an error if the broker address cannot be parsed.
    pub fn start<S: AsRef<str>>(
        settings: &MqttSettings,
        filters: &[S],
        cancel: CancellationToken,
    ) -> Result<(Self, MqttMessages, JoinHandle<()>), MqttSetupError> {
        let options = settings.options()?;
        info!(
            broker = %settings.broker,
            client_id = %options.client_id(),
            "starting MQTT client"
        );
        let (client, eventloop) = AsyncClient::new(options, settings.capacity());
        let (tx, rx) = mpsc::channel(settings.capacity());
        let connected = Arc::new(AtomicBool::new(false));
        let pending_clears = Arc::new(Mutex::new(HashSet::new()));

        let connection = Connection {
            client: client.clone(),
            filters: filters.iter().map(|f| f.as_ref().to_owned()).collect(),
            tx,
            connected: connected.clone(),
            pending_clears: pending_clears.clone(),
            retry_interval: settings.retry_interval,
        };
        let task = tokio::spawn(connection.run(eventloop, cancel));

        let bus = Self {
            client,
            connected,
            pending_clears,
        };
        Ok((bus, MqttMessages { rx }, task))
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

struct Connection {
    client: AsyncClient,
    filters: Vec<String>,
    tx: mpsc::Sender<BusMessage>,
    connected: Arc<AtomicBool>,
    pending_clears: Arc<Mutex<HashSet<String>>>,
    retry_interval: Duration,
}

impl Connection {
    async fn run(self, mut eventloop: EventLoop, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = eventloop.poll() => event,
            };
            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::Release);
                    info!("connected to MQTT broker");
                    self.subscribe_all();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let msg = restore_clear_flag(&self.pending_clears, to_bus_message(&publish));
                    if self.tx.send(msg).await.is_err() {
                        debug!("message receiver dropped");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    // echoes of clears sent on the old session will not arrive
                    self.pending_clears.lock().clear();
                    warn!(error = %e, retry_in = ?self.retry_interval, "MQTT connection lost");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "disconnect request not queued");
        }
        info!("MQTT client stopped");
    }

    fn subscribe_all(&self) {
        for filter in &self.filters {
            if let Err(e) = self.client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                warn!(%filter, error = %e, "subscribe request failed");
            }
        }
    }
}

fn to_bus_message(publish: &Publish) -> BusMessage {
    BusMessage {
        topic: publish.topic.clone(),
        payload: publish.payload.clone(),
        retained: publish.retain,
    }
}

/// Marks the live echo of a clear we published as retained again.
fn restore_clear_flag(pending: &Mutex<HashSet<String>>, mut msg: BusMessage) -> BusMessage {
    if !msg.retained && msg.payload.is_empty() && pending.lock().remove(&msg.topic) {
        msg.retained = true;
    }
    msg
}

#[async_trait]
impl BusPublisher for MqttBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        retained: bool,
    ) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::Disconnected);
        }
        let clear = retained && payload.is_empty();
        if clear {
            self.pending_clears.lock().insert(topic.to_owned());
        }
        let result = self
            .client
            .publish(topic, QoS::AtLeastOnce, retained, payload.to_vec())
            .await;
        if result.is_err() && clear {
            self.pending_clears.lock().remove(topic);
        }
        result.map_err(|e| PublishError::Rejected {
            topic: topic.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MessageSource for MqttMessages {
    async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}
