#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use node_registry::domain::file_storage::FileStorage;
use node_registry::domain::node_storage::NodeStorage;
use node_registry::infra::bus::LoopbackBus;
use node_registry::{Service, ServiceConfig};
use tempfile::TempDir;

pub struct Harness {
    pub service: Service,
    pub bus: Arc<LoopbackBus>,
    pub uploads: TempDir,
}

pub fn harness() -> Harness {
    let uploads = TempDir::new().expect("failed to create temp dir");
    let bus = Arc::new(LoopbackBus::default());
    let service = Service::new(
        Arc::new(NodeStorage::new()),
        Arc::new(FileStorage::new(uploads.path(), "/files")),
        bus.clone(),
        ServiceConfig::default(),
    );
    Harness {
        service,
        bus,
        uploads,
    }
}

/// 2024-01-01 10:00:00 UTC plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}
