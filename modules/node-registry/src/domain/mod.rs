pub mod error;
pub mod file_storage;
pub mod identity;
pub mod model;
pub mod node_storage;
pub mod ports;
pub mod service;
pub mod snapshot;
pub mod telemetry;
pub mod topics;
