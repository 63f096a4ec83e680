use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::device::NameFilter;
use crate::{Error, Result};

/// Connection manager settings.
///
/// Loading order: defaults, then a TOML file, then `SOUNDBOUND_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Give up on a pending connection after this long. `0` waits forever.
    pub connect_timeout_ms: u64,

    /// Start scanning as soon as the radio reports powered on.
    pub scan_on_power_on: bool,

    /// Restart scanning after every disconnection. Keeps the radio busy, so
    /// products that care about power should turn it off.
    pub rescan_on_disconnect: bool,

    pub allow_duplicates: bool,

    /// Services a peripheral must advertise to be reported. Empty reports all.
    pub scan_services: Vec<Uuid>,

    /// Capacity of the request and radio event channels.
    pub event_capacity: usize,

    pub name_filter: NameFilter,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            connect_timeout_ms: 10_000,
            scan_on_power_on: true,
            rescan_on_disconnect: true,
            allow_duplicates: false,
            scan_services: Vec::new(),
            event_capacity: 256,
            name_filter: NameFilter::default(),
        }
    }
}

impl ManagerConfig {
    /// Reads `SOUNDBOUND_CONFIG` if set, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match env::var("SOUNDBOUND_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.override_from_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn override_from_env(&mut self) {
        if let Ok(timeout) = env::var("SOUNDBOUND_CONNECT_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(timeout) => self.connect_timeout_ms = timeout,
                Err(_) => log::warn!("Ignoring invalid SOUNDBOUND_CONNECT_TIMEOUT_MS={}", timeout),
            }
        }
        if let Ok(rescan) = env::var("SOUNDBOUND_RESCAN_ON_DISCONNECT") {
            self.rescan_on_disconnect = rescan.eq_ignore_ascii_case("true") || rescan == "1";
        }
        if let Ok(pattern) = env::var("SOUNDBOUND_NAME_FILTER") {
            self.name_filter = NameFilter::new(pattern, true);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::central::MIDI_SERVICE_UUID;

    #[test]
    fn defaults_match_app_behaviour() {
        let config = ManagerConfig::default();
        assert!(config.scan_on_power_on);
        assert!(config.rescan_on_disconnect);
        assert!(!config.allow_duplicates);
        assert!(config.scan_services.is_empty());
        assert_eq!(config.connect_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ManagerConfig::from_toml_str(
            r#"
            connect_timeout_ms = 0
            scan_services = ["03b80e5a-ede8-4b33-a751-6ce34ec4c700"]

            [name_filter]
            pattern = "ESP"
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.connect_timeout(), None);
        assert_eq!(config.scan_services, vec![MIDI_SERVICE_UUID]);
        assert_eq!(config.name_filter, NameFilter::new("ESP", true));
        assert!(config.rescan_on_disconnect);
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ManagerConfig::from_toml_str("connect_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn serialized_config_reads_back() {
        let config = ManagerConfig {
            rescan_on_disconnect: false,
            name_filter: NameFilter::new("drum", true),
            ..ManagerConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(ManagerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ManagerConfig {
            event_capacity: 0,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
