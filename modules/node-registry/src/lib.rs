#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

//! Node registry for the fleet dashboard.
//!
//! Ingests device telemetry from the bus, tracks device identity across
//! renames, and serves a deduplicated snapshot to HTTP readers.

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;

pub use config::NodeRegistryConfig;
pub use domain::error::DomainError;
pub use domain::identity::{PhysicalId, extract_physical_id};
pub use domain::model::{NodeConfig, NodeRecord, SdState};
pub use domain::ports::{BusPublisher, PublishError};
pub use domain::service::{ConfigCommand, Deleted, Service, ServiceConfig};
pub use domain::snapshot::NodeView;
