//! Normalisation of raw bus payloads into partial node updates.
//!
//! Devices publish loosely typed payloads. Nothing here fails: a payload
//! that cannot be decoded degrades to raw text or to a liveness-only update.

use serde_json::{Map, Value};

/// Kind of telemetry message, taken from the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    Status,
    Monitor,
    Log,
}

impl TelemetryKind {
    /// Unknown suffixes yield `None` so new message kinds are ignored.
    #[must_use]
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "status" => Some(Self::Status),
            "monitor" => Some(Self::Monitor),
            "log" => Some(Self::Log),
            _ => None,
        }
    }
}

/// Result of a structured parse of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Mapping(Map<String, Value>),
    Scalar(Value),
    ParseFailed(String),
}

impl Payload {
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => Self::Mapping(map),
            Ok(other) => Self::Scalar(other),
            Err(_) => Self::ParseFailed(String::from_utf8_lossy(raw).into_owned()),
        }
    }
}

/// Fields carried by a single message. Unset fields leave the record untouched.
///
/// Applying any update refreshes the node's `last_updated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialUpdate {
    pub status: Option<String>,
    pub ram_free_bytes: Option<i64>,
    pub sd_ok: Option<bool>,
    pub log_line: Option<String>,
}

/// Turns a `(suffix, payload)` pair into an update, or `None` when the
/// message carries nothing to apply.
#[must_use]
pub fn normalize(suffix: &str, raw: &[u8]) -> Option<PartialUpdate> {
    match TelemetryKind::from_suffix(suffix)? {
        TelemetryKind::Status => Some(normalize_status(raw)),
        TelemetryKind::Monitor => Some(normalize_monitor(raw)),
        TelemetryKind::Log => normalize_log(raw),
    }
}

fn normalize_status(raw: &[u8]) -> PartialUpdate {
    let status = match Payload::parse(raw) {
        Payload::Mapping(map) => match map.get("state") {
            Some(state) => render_text(state),
            None => render_text(&Value::Object(map)),
        },
        Payload::Scalar(value) => render_text(&value),
        Payload::ParseFailed(text) => text,
    };
    PartialUpdate {
        status: Some(status),
        ..PartialUpdate::default()
    }
}

fn normalize_monitor(raw: &[u8]) -> PartialUpdate {
    let mut update = PartialUpdate::default();
    if let Payload::Mapping(map) = Payload::parse(raw) {
        update.ram_free_bytes = map.get("ram_free_bytes").and_then(integer_of);
        update.sd_ok = map.get("sd_ok").and_then(Value::as_bool);
    }
    update
}

fn normalize_log(raw: &[u8]) -> Option<PartialUpdate> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(PartialUpdate {
        log_line: Some(line.to_owned()),
        ..PartialUpdate::default()
    })
}

#[allow(clippy::cast_possible_truncation)]
fn integer_of(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else {
        return None;
    };
    n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))
}

/// Strings render bare, everything else as compact JSON.
fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_state_key() {
        let u = normalize("status", br#"{"state":"running","uptime":12}"#).unwrap();
        assert_eq!(u.status.as_deref(), Some("running"));
    }

    #[test]
    fn test_status_non_string_state_is_rendered() {
        let u = normalize("status", br#"{"state":3}"#).unwrap();
        assert_eq!(u.status.as_deref(), Some("3"));
    }

    #[test]
    fn test_status_mapping_without_state_renders_whole_value() {
        let u = normalize("status", br#"{"mode":"idle"}"#).unwrap();
        assert_eq!(u.status.as_deref(), Some(r#"{"mode":"idle"}"#));
    }

    #[test]
    fn test_status_scalar() {
        let u = normalize("status", br#""online""#).unwrap();
        assert_eq!(u.status.as_deref(), Some("online"));
        let u = normalize("status", b"42").unwrap();
        assert_eq!(u.status.as_deref(), Some("42"));
    }

    #[test]
    fn test_status_unparseable_is_verbatim() {
        let u = normalize("status", b"online since boot").unwrap();
        assert_eq!(u.status.as_deref(), Some("online since boot"));
    }

    #[test]
    fn test_monitor_fields() {
        let u = normalize("monitor", br#"{"ram_free_bytes":20480.7,"sd_ok":false,"x":1}"#)
            .unwrap();
        assert_eq!(u.ram_free_bytes, Some(20480));
        assert_eq!(u.sd_ok, Some(false));
        assert!(u.status.is_none());
    }

    #[test]
    fn test_monitor_wrong_types_are_ignored() {
        let u = normalize("monitor", br#"{"ram_free_bytes":"lots","sd_ok":"yes"}"#).unwrap();
        assert_eq!(u, PartialUpdate::default());
    }

    #[test]
    fn test_monitor_garbage_is_heartbeat() {
        let u = normalize("monitor", b"not json").unwrap();
        assert_eq!(u, PartialUpdate::default());
    }

    #[test]
    fn test_log_trimmed_and_empty_dropped() {
        let u = normalize("log", b"  wifi up \n").unwrap();
        assert_eq!(u.log_line.as_deref(), Some("wifi up"));
        assert!(normalize("log", b"   \n\t").is_none());
        assert!(normalize("log", b"").is_none());
    }

    #[test]
    fn test_unknown_suffix_ignored() {
        assert!(normalize("command", b"{}").is_none());
        assert!(normalize("", b"x").is_none());
    }

    #[test]
    fn test_empty_status_is_empty_text() {
        let u = normalize("status", b"").unwrap();
        assert_eq!(u.status.as_deref(), Some(""));
    }

    #[test]
    fn test_empty_monitor_is_heartbeat() {
        assert_eq!(normalize("monitor", b"").unwrap(), PartialUpdate::default());
    }

    #[test]
    fn test_payload_parse_variants() {
        assert!(matches!(Payload::parse(br#"{"a":1}"#), Payload::Mapping(_)));
        assert!(matches!(Payload::parse(b"[1,2]"), Payload::Scalar(_)));
        assert_eq!(
            Payload::parse(b"oops"),
            Payload::ParseFailed("oops".to_owned())
        );
    }
}
