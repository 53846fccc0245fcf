use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Number of log lines kept per node.
pub const LOG_CAPACITY: usize = 3;

/// Status reported for nodes whose last update is older than the staleness threshold.
pub const OFFLINE_STATUS: &str = "offline";

/// Wire format of node timestamps (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SD card health as last reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SdState {
    /// The device never reported `sd_ok`.
    #[default]
    Unknown,
    Ok,
    Failed,
}

impl SdState {
    /// `None` for [`SdState::Unknown`], otherwise the reported flag.
    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Ok => Some(true),
            Self::Failed => Some(false),
        }
    }
}

impl From<bool> for SdState {
    fn from(ok: bool) -> Self {
        if ok { Self::Ok } else { Self::Failed }
    }
}

/// Operator-assigned configuration tags. Survive identity migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    pub check: Option<String>,
    pub area: Option<String>,
    pub number: Option<String>,
}

/// State of one logical node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRecord {
    pub status: Option<String>,
    pub ram_free_bytes: Option<i64>,
    pub sd_ok: SdState,
    pub config: NodeConfig,
    pub last_updated: Option<DateTime<Utc>>,
    pub logs: VecDeque<String>,
}

impl NodeRecord {
    /// Fresh record that inherits only the operator configuration of `previous`.
    #[must_use]
    pub fn migrated_from(previous: &Self) -> Self {
        Self {
            config: previous.config.clone(),
            ..Self::default()
        }
    }

    /// Appends a log line, evicting the oldest beyond [`LOG_CAPACITY`].
    pub fn push_log(&mut self, line: String) {
        self.logs.push_back(line);
        while self.logs.len() > LOG_CAPACITY {
            self.logs.pop_front();
        }
    }

    /// Advances `last_updated` without ever moving it backwards.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(match self.last_updated {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }
}

/// Renders a timestamp in [`TIMESTAMP_FORMAT`].
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}
