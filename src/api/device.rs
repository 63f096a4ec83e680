use serde::{Deserialize, Serialize};

use crate::api::central::PeripheralId;

/// A peripheral seen during the current scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub identifier: PeripheralId,
    pub display_name: Option<String>,
    /// Latest RSSI in dBm.
    pub signal_strength: i16,
}

impl DiscoveredDevice {
    pub fn new(identifier: PeripheralId, display_name: Option<String>, signal_strength: i16) -> Self {
        Self {
            identifier,
            display_name,
            signal_strength,
        }
    }

    pub fn name_or_default(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Unnamed")
    }
}

/// Case-insensitive substring filter on advertised names, applied at discovery time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameFilter {
    pub pattern: String,
    pub enabled: bool,
}

impl NameFilter {
    pub fn new(pattern: impl Into<String>, enabled: bool) -> Self {
        Self {
            pattern: pattern.into(),
            enabled,
        }
    }

    /// Unnamed devices and blank patterns always pass.
    pub fn matches(&self, name: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        if self.pattern.trim().is_empty() {
            return true;
        }
        match name {
            Some(name) => name.to_lowercase().contains(&self.pattern.to_lowercase()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_filter_passes_everything() {
        let filter = NameFilter::new("ESP", false);
        assert!(filter.matches(Some("Other")));
        assert!(filter.matches(None));
    }

    #[test]
    fn enabled_filter_is_case_insensitive_substring() {
        let filter = NameFilter::new("ESP", true);
        assert!(filter.matches(Some("ESP32-A")));
        assert!(filter.matches(Some("esp-device")));
        assert!(filter.matches(Some("my Esp")));
        assert!(!filter.matches(Some("Other")));
    }

    #[test]
    fn unnamed_devices_and_blank_patterns_pass() {
        assert!(NameFilter::new("ESP", true).matches(None));
        assert!(NameFilter::new("   ", true).matches(Some("Other")));
    }

    #[test]
    fn name_or_default_falls_back() {
        let id = PeripheralId::new(uuid::Uuid::from_u128(1));
        assert_eq!(DiscoveredDevice::new(id, None, -40).name_or_default(), "Unnamed");
    }
}
