//! Physical identity resolution for logical node identifiers.
//!
//! Devices advertise themselves under a logical id (the topic segment they
//! publish on). That id may change across firmware updates, but most ids
//! embed the 12-hex-digit hardware address of the board. The last such
//! token is the device's physical identity.

use std::fmt;

use regex::Regex;

#[allow(clippy::expect_used)] // good regex, it doesn't panic
static HARDWARE_TOKEN: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{12}").expect("static regex should not panic")
});

/// Stable hardware-derived identity shared by every logical id of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalId(String);

impl PhysicalId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id came from an embedded hardware token rather than
    /// falling back to the logical id verbatim.
    #[must_use]
    pub fn is_hardware(&self) -> bool {
        self.0.len() == 12 && HARDWARE_TOKEN.is_match(&self.0)
    }
}

impl fmt::Display for PhysicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the last hardware token embedded in `logical_id`, if any.
#[must_use]
pub fn hardware_token(logical_id: &str) -> Option<&str> {
    HARDWARE_TOKEN
        .find_iter(logical_id)
        .last()
        .map(|m| m.as_str())
}

/// Resolves the physical identity of a logical id.
///
/// Ids without a hardware token are their own physical identity.
#[must_use]
pub fn extract_physical_id(logical_id: &str) -> PhysicalId {
    PhysicalId(hardware_token(logical_id).unwrap_or(logical_id).to_owned())
}

/// Whether two logical ids name the same physical device.
#[must_use]
pub fn same_device(a: &str, b: &str) -> bool {
    extract_physical_id(a) == extract_physical_id(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_trailing_hardware_token() {
        assert_eq!(
            extract_physical_id("esp-aabbccddeeff").as_str(),
            "aabbccddeeff"
        );
        assert_eq!(
            extract_physical_id("aabbccddeeff-v2").as_str(),
            "aabbccddeeff"
        );
    }

    #[test]
    fn test_last_match_wins() {
        let id = "gw-112233445566-node-AABBCCDDEEFF";
        assert_eq!(extract_physical_id(id).as_str(), "AABBCCDDEEFF");
    }

    #[test]
    fn test_no_token_falls_back_to_logical_id() {
        let pid = extract_physical_id("kitchen-sensor");
        assert_eq!(pid.as_str(), "kitchen-sensor");
        assert!(!pid.is_hardware());
        assert!(hardware_token("kitchen-sensor").is_none());
    }

    #[test]
    fn test_short_hex_runs_do_not_match() {
        assert_eq!(extract_physical_id("node-abc123").as_str(), "node-abc123");
    }

    #[test]
    fn test_same_device() {
        assert!(same_device("esp-aabbccddeeff", "aabbccddeeff-v2"));
        assert!(!same_device("esp-aabbccddeeff", "esp-aabbccddee00"));
        assert!(same_device("plain", "plain"));
        assert!(!same_device("plain", "other"));
    }
}
