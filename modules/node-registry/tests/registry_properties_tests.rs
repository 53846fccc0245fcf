#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Behavioural guarantees of the node registry
//!
//! Ingestion goes through the service so payload normalisation, identity
//! migration and the snapshot projection are exercised together.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{at, harness};
use node_registry::domain::model::{NodeConfig, NodeRecord, OFFLINE_STATUS};
use node_registry::domain::node_storage::NodeStorage;
use node_registry::domain::telemetry::normalize;
use node_registry::{Deleted, DomainError, SdState, extract_physical_id};

fn record(status: &str, updated: DateTime<Utc>) -> NodeRecord {
    NodeRecord {
        status: Some(status.to_owned()),
        last_updated: Some(updated),
        ..NodeRecord::default()
    }
}

#[test]
fn test_last_updated_is_non_decreasing_per_node() {
    let h = harness();
    let stamps = [5, 3, 9, 9, 1, 12];
    let mut previous = None;
    for secs in stamps {
        h.service
            .ingest_event("esp-aabbccddeeff", "status", b"up", at(secs))
            .unwrap();
        let current = h.service.get_node("esp-aabbccddeeff").unwrap().last_updated;
        assert!(current >= previous, "last_updated moved backwards");
        previous = current;
    }
    assert_eq!(previous, Some(at(12)));
}

#[test]
fn test_monitor_update_is_idempotent() {
    let h = harness();
    let payload = br#"{"ram_free_bytes":4096,"sd_ok":true}"#;

    h.service.ingest_event("n1", "monitor", payload, at(1)).unwrap();
    let once = h.service.get_node("n1").unwrap();
    h.service.ingest_event("n1", "monitor", payload, at(1)).unwrap();
    let twice = h.service.get_node("n1").unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_migration_moves_config_and_drops_old_identity() {
    let h = harness();
    h.service
        .ingest_event("esp-aabbccddeeff", "status", br#"{"state":"running"}"#, at(0))
        .unwrap();
    h.service
        .ingest_event("esp-aabbccddeeff", "monitor", br#"{"ram_free_bytes":1000}"#, at(1))
        .unwrap();
    h.service.nodes().set_config(
        "esp-aabbccddeeff",
        node_registry::NodeConfig {
            area: Some("Z1".to_owned()),
            ..Default::default()
        },
    );

    let outcome = h
        .service
        .ingest_event("aabbccddeeff-v2", "status", b"booting", at(2))
        .unwrap();

    assert_eq!(outcome.migrated_from.as_deref(), Some("esp-aabbccddeeff"));
    assert!(h.service.get_node("esp-aabbccddeeff").is_err());
    let migrated = h.service.get_node("aabbccddeeff-v2").unwrap();
    assert_eq!(migrated.config.area.as_deref(), Some("Z1"));
    assert_eq!(migrated.status.as_deref(), Some("booting"));
    assert_eq!(migrated.ram_free_bytes, None, "old telemetry must not carry over");
    assert_eq!(migrated.last_updated, Some(at(2)));
}

#[test]
fn test_snapshot_lists_distinct_devices() {
    let storage = NodeStorage::new();
    storage.apply_update("a-112233445566", normalize("status", b"a").unwrap(), at(5));
    storage.apply_update("b-665544332211", normalize("status", b"b").unwrap(), at(10));
    storage.apply_update("kitchen", normalize("status", b"c").unwrap(), at(10));

    let view = storage.snapshot(at(11), Duration::from_secs(10));
    assert_eq!(view.len(), 3);
}

#[test]
fn test_snapshot_dedups_identities_sharing_a_device() {
    let storage = NodeStorage::new();
    storage.upsert("old-112233445566", record("a", at(5)));
    storage.upsert("new-112233445566", record("b", at(10)));

    let view = storage.snapshot(at(10), Duration::from_secs(10));
    assert_eq!(view.len(), 1);
    assert_eq!(view["new-112233445566"].status.as_deref(), Some("b"));
    assert_eq!(
        view["new-112233445566"].updated.as_deref(),
        Some("2024-01-01 10:00:10")
    );
    assert_eq!(storage.len(), 2, "dedup is a view concern only");
}

#[test]
fn test_stale_node_projects_offline() {
    let h = harness();
    h.service
        .ingest_event("n1", "status", br#"{"state":"running"}"#, at(0))
        .unwrap();

    let view = h.service.snapshot_at(at(15));
    assert_eq!(view["n1"].status.as_deref(), Some(OFFLINE_STATUS));
    assert_eq!(
        h.service.get_node("n1").unwrap().status.as_deref(),
        Some("running")
    );
}

#[test]
fn test_empty_monitor_keeps_node_online() {
    let h = harness();
    h.service
        .ingest_event("n1", "status", b"running", at(0))
        .unwrap();
    h.service.ingest_event("n1", "monitor", b"", at(20)).unwrap();

    let node = h.service.get_node("n1").unwrap();
    assert_eq!(node.last_updated, Some(at(20)));
    assert_eq!(node.status.as_deref(), Some("running"));

    let view = h.service.snapshot_at(at(25));
    assert_eq!(view["n1"].status.as_deref(), Some("running"));
}

#[test]
fn test_empty_status_is_stored_as_empty_text() {
    let h = harness();
    h.service
        .ingest_event("n1", "status", b"running", at(0))
        .unwrap();
    h.service.ingest_event("n1", "status", b"", at(3)).unwrap();

    let node = h.service.get_node("n1").unwrap();
    assert_eq!(node.status.as_deref(), Some(""));
    assert_eq!(node.last_updated, Some(at(3)));
}

#[test]
fn test_five_log_lines_leave_last_three() {
    let h = harness();
    for i in 1..=5 {
        h.service
            .ingest_event("n1", "log", format!("line {i}\n").as_bytes(), at(i))
            .unwrap();
    }
    assert_eq!(
        h.service.logs("n1").unwrap(),
        vec!["line 3", "line 4", "line 5"]
    );
}

#[test]
fn test_sd_ok_false_is_distinct_from_never_reported() {
    let h = harness();
    h.service
        .ingest_event("reported", "monitor", br#"{"sd_ok":false}"#, at(0))
        .unwrap();
    h.service
        .ingest_event("silent", "monitor", br#"{"ram_free_bytes":1}"#, at(0))
        .unwrap();

    assert_eq!(h.service.get_node("reported").unwrap().sd_ok, SdState::Failed);
    assert_eq!(h.service.get_node("silent").unwrap().sd_ok, SdState::Unknown);

    let view = h.service.snapshot_at(at(1));
    assert_eq!(view["reported"].sd_ok, Some(false));
    assert_eq!(view["silent"].sd_ok, None);
}

#[tokio::test]
async fn test_delete_by_mac_cascades_and_unknown_is_not_found() {
    let h = harness();
    h.service.nodes().upsert("x-aabbccddeeff", record("a", at(0)));
    h.service.nodes().upsert("y-aabbccddeeff", record("b", at(1)));
    h.service.nodes().upsert("other", record("c", at(1)));

    let deleted = h.service.delete_node("AA-aabbccddeeff").await.unwrap();
    assert_eq!(
        deleted,
        Deleted::Device {
            mac: "aabbccddeeff".to_owned(),
            count: 2
        }
    );
    assert_eq!(h.service.nodes().logical_ids(), vec!["other".to_owned()]);

    let err = h.service.delete_node("ffeeddccbbaa").await.unwrap_err();
    assert!(matches!(err, DomainError::NodeNotFound(_)));
}

#[test]
fn test_concurrent_ingestion_on_many_nodes() {
    let storage = Arc::new(NodeStorage::new());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                for i in 0..50 {
                    let update = normalize("log", format!("t{t} line {i}").as_bytes()).unwrap();
                    storage.apply_update(&format!("node-{t}"), update, at(i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(storage.len(), 8);
    for t in 0..8 {
        let logs = storage.logs(&format!("node-{t}")).unwrap();
        assert_eq!(
            logs,
            vec![
                format!("t{t} line 47"),
                format!("t{t} line 48"),
                format!("t{t} line 49"),
            ]
        );
        assert_eq!(storage.get(&format!("node-{t}")).unwrap().last_updated, Some(at(49)));
    }
}

#[test]
fn test_racing_identities_of_one_device_keep_a_single_entry() {
    let storage = Arc::new(NodeStorage::new());
    storage.upsert(
        "esp-aabbccddeeff",
        NodeRecord {
            config: NodeConfig {
                area: Some("Z1".to_owned()),
                ..NodeConfig::default()
            },
            ..record("up", at(0))
        },
    );

    let handles: Vec<_> = ["esp-aabbccddeeff", "aabbccddeeff-v2"]
        .into_iter()
        .map(|id| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                for i in 0..200 {
                    let update = normalize("status", format!("{id} {i}").as_bytes()).unwrap();
                    storage.apply_update(id, update, at(i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let ids: Vec<String> = storage
        .logical_ids()
        .into_iter()
        .filter(|id| extract_physical_id(id).as_str() == "aabbccddeeff")
        .collect();
    assert_eq!(ids.len(), 1, "one device must map to one entry: {ids:?}");
    assert_eq!(storage.len(), 1);

    let survivor = storage.get(&ids[0]).unwrap();
    assert_eq!(survivor.config.area.as_deref(), Some("Z1"));
    assert_eq!(survivor.last_updated, Some(at(199)));
}
