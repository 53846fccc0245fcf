use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::file_storage::FileRecord;
use crate::domain::service::{ConfigCommand, Deleted};
use crate::domain::snapshot::NodeView;

/// Node as listed by `GET /api/nodes`. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NodeDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_free_bytes: Option<i64>,
    /// SD card health; absent when the node never reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd_ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ck: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<String>,
    /// Last update, `YYYY-MM-DD HH:MM:SS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl From<NodeView> for NodeDto {
    fn from(v: NodeView) -> Self {
        Self {
            status: v.status,
            ram_free_bytes: v.ram_free_bytes,
            sd_ok: v.sd_ok,
            ck: v.check,
            area: v.area,
            no: v.number,
            updated: v.updated,
            logs: v.logs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeLogsDto {
    pub node: String,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeleteNodeResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl From<Deleted> for DeleteNodeResponse {
    fn from(d: Deleted) -> Self {
        let status = "deleted".to_owned();
        match d {
            Deleted::Node(node) => Self {
                status,
                node: Some(node),
                mac: None,
                count: None,
            },
            Deleted::Device { mac, count } => Self {
                status,
                node: None,
                mac: Some(mac),
                count: Some(count),
            },
        }
    }
}

/// Body of `POST /config` (alias `POST /set-threshold`).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConfigRequest {
    pub node: String,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub ck: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub no: String,
}

impl From<ConfigRequest> for ConfigCommand {
    fn from(r: ConfigRequest) -> Self {
        Self {
            node: r.node,
            min: r.min,
            max: r.max,
            check: r.ck,
            area: r.area,
            number: r.no,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct OtaRequest {
    pub node: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommandResponse {
    pub status: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileDto {
    pub name: String,
    pub url: String,
    pub upload_time: DateTime<Utc>,
}

impl From<FileRecord> for FileDto {
    fn from(f: FileRecord) -> Self {
        Self {
            name: f.name,
            url: f.url,
            upload_time: f.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RenameFileRequest {
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponse {
    pub status: String,
    pub name: String,
}
