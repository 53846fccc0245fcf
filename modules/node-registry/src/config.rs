use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::service::ServiceConfig;

/// Configuration for the node registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeRegistryConfig {
    /// Age after which a node is reported offline.
    #[serde(default = "default_stale_after", with = "humantime_duration")]
    pub stale_after: Duration,

    /// Directory holding uploaded firmware images.
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// URL prefix under which uploaded files are served.
    #[serde(default = "default_public_files_prefix")]
    pub public_files_prefix: String,
}

fn default_stale_after() -> Duration {
    Duration::from_secs(10)
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("static/uploads")
}

fn default_public_files_prefix() -> String {
    "/files".to_owned()
}

impl Default for NodeRegistryConfig {
    fn default() -> Self {
        Self {
            stale_after: default_stale_after(),
            uploads_dir: default_uploads_dir(),
            public_files_prefix: default_public_files_prefix(),
        }
    }
}

impl NodeRegistryConfig {
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            stale_after: self.stale_after,
        }
    }
}

/// `Duration` as human-readable text such as `"10s"` or `"1m 30s"`.
pub(crate) mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}
