use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::identity::{PhysicalId, extract_physical_id, same_device};
use crate::domain::model::{NodeConfig, NodeRecord};
use crate::domain::snapshot::{NodeView, project};
use crate::domain::telemetry::PartialUpdate;

/// What happened to the registry while applying an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Set when the node was new.
    pub created: bool,
    /// Old logical id whose configuration moved to the updated node.
    pub migrated_from: Option<String>,
    /// Other old logical ids of the same device left in place.
    pub skipped_candidates: Vec<String>,
}

/// Result of deleting every logical id of a physical device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub physical_id: PhysicalId,
    /// Removed logical ids, sorted.
    pub removed: Vec<String>,
}

impl DeleteOutcome {
    #[must_use]
    pub fn count(&self) -> usize {
        self.removed.len()
    }
}

/// In-memory storage for node records keyed by logical id.
///
/// Writers take the lock exclusively for the whole apply, so updates to the
/// same logical id are serialised and a migration is never observed half done.
pub struct NodeStorage {
    nodes: RwLock<HashMap<String, NodeRecord>>,
}

impl NodeStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Applies an already normalised update to `logical_id`, creating the node
    /// (and migrating configuration from an older identity) when it is unknown.
    pub fn apply_update(
        &self,
        logical_id: &str,
        update: PartialUpdate,
        now: DateTime<Utc>,
    ) -> ApplyOutcome {
        let mut nodes = self.nodes.write();
        let mut outcome = ApplyOutcome::default();

        if !nodes.contains_key(logical_id) {
            outcome.created = true;
            let record = match pick_migration_source(&nodes, logical_id) {
                Some((source, others)) => {
                    outcome.skipped_candidates = others;
                    let old = nodes.remove(&source);
                    outcome.migrated_from = Some(source);
                    old.as_ref().map(NodeRecord::migrated_from).unwrap_or_default()
                }
                None => NodeRecord::default(),
            };
            nodes.insert(logical_id.to_owned(), record);
        }

        if let Some(record) = nodes.get_mut(logical_id) {
            merge(record, update, now);
        }
        outcome
    }

    /// Stores `record` under `logical_id` as is, without identity migration.
    pub fn upsert(&self, logical_id: impl Into<String>, record: NodeRecord) {
        self.nodes.write().insert(logical_id.into(), record);
    }

    /// Overwrites the operator configuration of a known node.
    ///
    /// Returns `false` when the node has not been seen yet.
    pub fn set_config(&self, logical_id: &str, config: NodeConfig) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(logical_id) {
            Some(record) => {
                record.config = config;
                true
            }
            None => false,
        }
    }

    pub fn delete_by_logical_id(&self, logical_id: &str) -> bool {
        self.nodes.write().remove(logical_id).is_some()
    }

    /// Removes every logical id sharing the physical id of `id`.
    pub fn delete_by_physical_id(&self, id: &str) -> DeleteOutcome {
        let physical_id = extract_physical_id(id);
        let mut nodes = self.nodes.write();
        let mut removed: Vec<String> = nodes
            .keys()
            .filter(|logical| extract_physical_id(logical) == physical_id)
            .cloned()
            .collect();
        for logical in &removed {
            nodes.remove(logical);
        }
        removed.sort();
        DeleteOutcome {
            physical_id,
            removed,
        }
    }

    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<NodeRecord> {
        self.nodes.read().get(logical_id).cloned()
    }

    #[must_use]
    pub fn logs(&self, logical_id: &str) -> Option<Vec<String>> {
        self.nodes
            .read()
            .get(logical_id)
            .map(|record| record.logs.iter().cloned().collect())
    }

    /// Sorted list of all stored logical ids, duplicates of one device included.
    #[must_use]
    pub fn logical_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn snapshot(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> BTreeMap<String, NodeView> {
        project(&self.nodes.read(), now, stale_after)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl Default for NodeStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Chooses the old logical id whose configuration a new node inherits.
///
/// Only ids carrying a hardware token take part. With several candidates the
/// most recently updated one wins (greatest id on ties); the rest are returned
/// so the caller can report them.
fn pick_migration_source(
    nodes: &HashMap<String, NodeRecord>,
    logical_id: &str,
) -> Option<(String, Vec<String>)> {
    if !extract_physical_id(logical_id).is_hardware() {
        return None;
    }

    let mut candidates: Vec<(&String, &NodeRecord)> = nodes
        .iter()
        .filter(|(id, _)| id.as_str() != logical_id && same_device(id, logical_id))
        .collect();
    candidates.sort_by(|a, b| (b.1.last_updated, b.0).cmp(&(a.1.last_updated, a.0)));

    let mut ids = candidates.into_iter().map(|(id, _)| id.clone());
    let winner = ids.next()?;
    Some((winner, ids.collect()))
}

fn merge(record: &mut NodeRecord, update: PartialUpdate, now: DateTime<Utc>) {
    if let Some(status) = update.status {
        record.status = Some(status);
    }
    if let Some(ram) = update.ram_free_bytes {
        record.ram_free_bytes = Some(ram);
    }
    if let Some(ok) = update.sd_ok {
        record.sd_ok = ok.into();
    }
    if let Some(line) = update.log_line {
        record.push_log(line);
    }
    record.touch(now);
}
