use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, instrument, warn};

use crate::domain::error::DomainError;
use crate::domain::file_storage::{FileRecord, FileStorage};
use crate::domain::identity::hardware_token;
use crate::domain::model::{NodeConfig, NodeRecord};
use crate::domain::node_storage::{ApplyOutcome, NodeStorage};
use crate::domain::ports::BusPublisher;
use crate::domain::snapshot::NodeView;
use crate::domain::telemetry::normalize;
use crate::domain::topics::{command_topic, retained_topics, route_topic};

/// Configuration for the node service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub stale_after: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(10),
        }
    }
}

/// Operator command updating a node's thresholds and configuration tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigCommand {
    pub node: String,
    pub min: f64,
    pub max: f64,
    pub check: String,
    pub area: String,
    pub number: String,
}

/// Outcome of an operator delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deleted {
    /// The id carried no hardware token; exactly that node was removed.
    Node(String),
    /// Every logical id of the device with this hardware token was removed.
    Device { mac: String, count: usize },
}

/// Service tying telemetry ingestion, the registry, and operator commands together.
#[derive(Clone)]
pub struct Service {
    nodes: Arc<NodeStorage>,
    files: Arc<FileStorage>,
    bus: Arc<dyn BusPublisher>,
    config: ServiceConfig,
}

impl Service {
    #[must_use]
    pub fn new(
        nodes: Arc<NodeStorage>,
        files: Arc<FileStorage>,
        bus: Arc<dyn BusPublisher>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            nodes,
            files,
            bus,
            config,
        }
    }

    #[must_use]
    pub fn nodes(&self) -> &Arc<NodeStorage> {
        &self.nodes
    }

    #[must_use]
    pub fn files(&self) -> &Arc<FileStorage> {
        &self.files
    }

    /// Handles one inbound bus message. Returns `None` when it changed nothing.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> Option<ApplyOutcome> {
        let Some((logical_id, suffix)) = route_topic(topic) else {
            debug!(topic, "ignoring message on unroutable topic");
            return None;
        };
        self.ingest_event(logical_id, suffix, payload, now())
    }

    /// Normalises and applies an event already split into id and suffix.
    pub fn ingest_event(
        &self,
        logical_id: &str,
        suffix: &str,
        payload: &[u8],
        at: DateTime<Utc>,
    ) -> Option<ApplyOutcome> {
        let update = normalize(suffix, payload)?;
        let outcome = self.nodes.apply_update(logical_id, update, at);

        if let Some(old) = &outcome.migrated_from {
            info!(from = %old, to = %logical_id, "migrated node configuration to new identity");
        }
        if !outcome.skipped_candidates.is_empty() {
            warn!(
                node = %logical_id,
                skipped = ?outcome.skipped_candidates,
                "several old identities share this device; kept the most recent one only"
            );
        }
        debug!(node = %logical_id, suffix, created = outcome.created, "applied telemetry");
        Some(outcome)
    }

    /// Deduplicated view of all nodes at the current time.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, NodeView> {
        self.snapshot_at(now())
    }

    #[must_use]
    pub fn snapshot_at(&self, at: DateTime<Utc>) -> BTreeMap<String, NodeView> {
        self.nodes.snapshot(at, self.config.stale_after)
    }

    /// # Errors
    /// [`DomainError::NodeNotFound`] for unknown ids.
    pub fn get_node(&self, logical_id: &str) -> Result<NodeRecord, DomainError> {
        self.nodes
            .get(logical_id)
            .ok_or_else(|| DomainError::NodeNotFound(logical_id.to_owned()))
    }

    /// Last log lines of a node, oldest first.
    ///
    /// # Errors
    /// [`DomainError::NodeNotFound`] for unknown ids.
    pub fn logs(&self, logical_id: &str) -> Result<Vec<String>, DomainError> {
        self.nodes
            .logs(logical_id)
            .ok_or_else(|| DomainError::NodeNotFound(logical_id.to_owned()))
    }

    /// Deletes a node by logical id or by hardware token, then clears the
    /// retained status and monitor messages of every removed id.
    ///
    /// # Errors
    /// [`DomainError::NodeNotFound`] when nothing matched.
    #[instrument(skip(self))]
    pub async fn delete_node(&self, id_or_mac: &str) -> Result<Deleted, DomainError> {
        let outcome = self.nodes.delete_by_physical_id(id_or_mac);
        if outcome.removed.is_empty() {
            return Err(DomainError::NodeNotFound(id_or_mac.to_owned()));
        }

        for logical_id in &outcome.removed {
            for topic in retained_topics(logical_id) {
                if let Err(e) = self.bus.publish(&topic, Bytes::new(), true).await {
                    warn!(%topic, error = %e, "failed to clear retained message");
                }
            }
        }
        info!(removed = ?outcome.removed, "deleted nodes");

        Ok(match hardware_token(id_or_mac) {
            Some(mac) => Deleted::Device {
                mac: mac.to_owned(),
                count: outcome.count(),
            },
            None => Deleted::Node(id_or_mac.to_owned()),
        })
    }

    /// Stores the configuration tags on a known node and sends `set_threshold`
    /// to the device. Returns the command topic.
    ///
    /// # Errors
    /// [`DomainError::Transport`] when the bus rejects the command.
    #[instrument(skip(self, cmd), fields(node = %cmd.node))]
    pub async fn set_config(&self, cmd: &ConfigCommand) -> Result<String, DomainError> {
        let stored = self.nodes.set_config(
            &cmd.node,
            NodeConfig {
                check: non_empty(&cmd.check),
                area: non_empty(&cmd.area),
                number: non_empty(&cmd.number),
            },
        );
        if !stored {
            debug!("node not seen yet; sending command without storing configuration");
        }

        let payload = serde_json::json!({
            "cmd": "set_threshold",
            "min": cmd.min,
            "max": cmd.max,
            "ck": cmd.check,
            "area": cmd.area,
            "no": cmd.number,
        });
        self.send_command(&cmd.node, &payload).await
    }

    /// Asks a node to fetch and install firmware from `url`. Returns the command topic.
    ///
    /// # Errors
    /// [`DomainError::InvalidInput`] for an empty URL,
    /// [`DomainError::Transport`] when the bus rejects the command.
    #[instrument(skip(self))]
    pub async fn trigger_ota(&self, node: &str, url: &str) -> Result<String, DomainError> {
        if url.trim().is_empty() {
            return Err(DomainError::InvalidInput("OTA url must not be empty".to_owned()));
        }
        let payload = serde_json::json!({ "cmd": "ota", "url": url });
        self.send_command(node, &payload).await
    }

    async fn send_command(
        &self,
        node: &str,
        payload: &serde_json::Value,
    ) -> Result<String, DomainError> {
        let topic = command_topic(node);
        let body = Bytes::from(payload.to_string());
        self.bus.publish(&topic, body, false).await?;
        info!(%topic, "published node command");
        Ok(topic)
    }

    pub async fn list_files(&self) -> Vec<FileRecord> {
        self.files.list().await
    }

    /// # Errors
    /// See [`FileStorage::save`].
    pub async fn upload_file(&self, name: &str, data: Bytes) -> Result<FileRecord, DomainError> {
        self.files.save(name, data).await
    }

    /// # Errors
    /// See [`FileStorage::delete`].
    pub async fn delete_file(&self, name: &str) -> Result<String, DomainError> {
        self.files.delete(name).await
    }

    /// # Errors
    /// See [`FileStorage::rename`].
    pub async fn rename_file(&self, name: &str, new_name: &str) -> Result<FileRecord, DomainError> {
        self.files.rename(name, new_name).await
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}
