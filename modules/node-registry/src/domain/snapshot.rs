//! Read-only projection of the registry for external consumers.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::identity::{PhysicalId, extract_physical_id};
use crate::domain::model::{NodeRecord, OFFLINE_STATUS, format_timestamp};

/// A node as seen by readers, with staleness already applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeView {
    pub status: Option<String>,
    pub ram_free_bytes: Option<i64>,
    pub sd_ok: Option<bool>,
    pub check: Option<String>,
    pub area: Option<String>,
    pub number: Option<String>,
    pub updated: Option<String>,
    pub logs: Vec<String>,
}

/// Builds the deduplicated, staleness-annotated view of `nodes`.
///
/// Only the most recently updated logical id of each physical device is
/// kept; ties go to the greatest logical id. Nodes whose last update is older
/// than `stale_after` report [`OFFLINE_STATUS`]. Stored records are not touched.
#[must_use]
pub fn project(
    nodes: &HashMap<String, NodeRecord>,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> BTreeMap<String, NodeView> {
    let mut latest: HashMap<PhysicalId, (&String, &NodeRecord)> = HashMap::new();
    for (id, record) in nodes {
        latest
            .entry(extract_physical_id(id))
            .and_modify(|current| {
                if (record.last_updated, id) > (current.1.last_updated, current.0) {
                    *current = (id, record);
                }
            })
            .or_insert((id, record));
    }

    latest
        .into_values()
        .map(|(id, record)| (id.clone(), view_of(record, now, stale_after)))
        .collect()
}

/// Whether a record last updated at `last_updated` counts as offline at `now`.
#[must_use]
pub fn is_stale(last_updated: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    (now - last_updated)
        .to_std()
        .is_ok_and(|age| age > stale_after)
}

fn view_of(record: &NodeRecord, now: DateTime<Utc>, stale_after: Duration) -> NodeView {
    let status = match record.last_updated {
        Some(at) if is_stale(at, now, stale_after) => Some(OFFLINE_STATUS.to_owned()),
        _ => record.status.clone(),
    };
    NodeView {
        status,
        ram_free_bytes: record.ram_free_bytes,
        sd_ok: record.sd_ok.as_bool(),
        check: record.config.check.clone(),
        area: record.config.area.clone(),
        number: record.config.number.clone(),
        updated: record.last_updated.map(format_timestamp),
        logs: record.logs.iter().cloned().collect(),
    }
}
