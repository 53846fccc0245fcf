//! Bus plumbing: the MQTT client, an in-process broker for tests, and the
//! ingestion pump feeding the service.

mod ingest;
mod loopback;
mod mqtt;
mod source;

pub use ingest::spawn_ingestion;
pub use loopback::{LoopbackBus, Subscription};
pub use mqtt::{MqttBus, MqttMessages, MqttSettings, MqttSetupError};
pub use source::{BusMessage, MessageSource};
