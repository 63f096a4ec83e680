use std::collections::HashMap;

use crate::api::central::PeripheralId;
use crate::api::device::DiscoveredDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Inserted,
    Updated,
}

/// Discovered devices keyed by identifier, iterated in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DiscoveredDevice>,
    index: HashMap<PeripheralId, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new device, or refreshes the RSSI of a known one. The first
    /// name seen for an identifier is kept.
    pub fn record(&mut self, identifier: PeripheralId, name: Option<String>, rssi: i16) -> Recorded {
        if let Some(&position) = self.index.get(&identifier) {
            self.devices[position].signal_strength = rssi;
            return Recorded::Updated;
        }
        self.index.insert(identifier, self.devices.len());
        self.devices.push(DiscoveredDevice::new(identifier, name, rssi));
        Recorded::Inserted
    }

    pub fn get(&self, identifier: &PeripheralId) -> Option<&DiscoveredDevice> {
        self.index.get(identifier).map(|&position| &self.devices[position])
    }

    pub fn contains(&self, identifier: &PeripheralId) -> bool {
        self.index.contains_key(identifier)
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn as_slice(&self) -> &[DiscoveredDevice] {
        &self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn id(n: u128) -> PeripheralId {
        PeripheralId::new(Uuid::from_u128(n))
    }

    #[test]
    fn keeps_first_seen_order() {
        let mut registry = DeviceRegistry::new();
        registry.record(id(3), Some("c".into()), -70);
        registry.record(id(1), Some("a".into()), -60);
        registry.record(id(2), None, -50);

        let order: Vec<_> = registry.as_slice().iter().map(|d| d.identifier).collect();
        assert_eq!(order, vec![id(3), id(1), id(2)]);
    }

    #[test]
    fn rediscovery_refreshes_rssi_and_keeps_name() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.record(id(1), Some("ESP32-A".into()), -80), Recorded::Inserted);
        assert_eq!(registry.record(id(1), Some("renamed".into()), -42), Recorded::Updated);

        let device = registry.get(&id(1)).unwrap();
        assert_eq!(device.display_name.as_deref(), Some("ESP32-A"));
        assert_eq!(device.signal_strength, -42);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unnamed_first_sighting_stays_unnamed() {
        let mut registry = DeviceRegistry::new();
        registry.record(id(1), None, -80);
        assert_eq!(registry.record(id(1), Some("Drum".into()), -55), Recorded::Updated);

        let device = registry.get(&id(1)).unwrap();
        assert_eq!(device.display_name, None);
        assert_eq!(device.name_or_default(), "Unnamed");
        assert_eq!(device.signal_strength, -55);
    }

    #[test]
    fn clear_drops_index_too() {
        let mut registry = DeviceRegistry::new();
        registry.record(id(1), None, -80);
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains(&id(1)));
        assert_eq!(registry.record(id(1), None, -80), Recorded::Inserted);
    }
}
