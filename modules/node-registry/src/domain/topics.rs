//! Bus topic layout shared by devices and the dashboard.

/// Topic filters the dashboard subscribes to.
///
/// `+/monitor` covers firmware that publishes without the `nodes/` prefix.
pub const SUBSCRIPTIONS: [&str; 4] = [
    "nodes/+/status",
    "nodes/+/monitor",
    "+/monitor",
    "nodes/+/log",
];

/// Splits an inbound topic into `(logical_id, suffix)`.
///
/// Accepts `nodes/{id}/{suffix}` and the legacy `{id}/{suffix}`.
#[must_use]
pub fn route_topic(topic: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = topic.split('/').collect();
    let (id, suffix) = match parts.as_slice() {
        ["nodes", id, suffix, ..] => (*id, *suffix),
        [id, suffix, ..] => (*id, *suffix),
        _ => return None,
    };
    if id.is_empty() {
        return None;
    }
    Some((id, suffix))
}

#[must_use]
pub fn command_topic(logical_id: &str) -> String {
    format!("nodes/{logical_id}/command")
}

/// Retained topics cleared when a node is deleted.
#[must_use]
pub fn retained_topics(logical_id: &str) -> [String; 2] {
    [
        format!("nodes/{logical_id}/status"),
        format!("nodes/{logical_id}/monitor"),
    ]
}

/// MQTT-style filter matching with `+` (one level) and `#` (remaining levels).
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match part {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}
