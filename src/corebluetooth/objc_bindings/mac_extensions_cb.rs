use objc2::rc::Retained;
use objc2_core_bluetooth::CBUUID;
use objc2_foundation::{NSString, NSUUID};
use uuid::Uuid;

const BLUETOOTH_BASE_SUFFIX: &str = "-0000-1000-8000-00805F9B34FB";

pub fn uuid_to_cbuuid(uuid: Uuid) -> Retained<CBUUID> {
    unsafe { CBUUID::UUIDWithString(&NSString::from_str(&uuid.to_string())) }
}

pub fn nsuuid_to_uuid(uuid: &NSUUID) -> Uuid {
    let text = uuid.UUIDString().to_string();
    Uuid::parse_str(&text).unwrap_or_else(|_| {
        log::warn!("Unparseable peripheral identifier {}", text);
        Uuid::nil()
    })
}

pub fn cbuuid_to_uuid(uuid: &CBUUID) -> Uuid {
    let text = unsafe { uuid.UUIDString() }.to_string();
    expand_uuid(&text).unwrap_or_else(|| {
        log::warn!("Unparseable service UUID {}", text);
        Uuid::nil()
    })
}

/// CoreBluetooth reports SIG-assigned UUIDs in their 16/32-bit short form.
fn expand_uuid(text: &str) -> Option<Uuid> {
    match text.len() {
        4 => Uuid::parse_str(&format!("0000{}{}", text, BLUETOOTH_BASE_SUFFIX)).ok(),
        8 => Uuid::parse_str(&format!("{}{}", text, BLUETOOTH_BASE_SUFFIX)).ok(),
        _ => Uuid::parse_str(text).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_short_forms() {
        assert_eq!(
            expand_uuid("180F"),
            Uuid::parse_str("0000180f-0000-1000-8000-00805f9b34fb").ok()
        );
        assert_eq!(
            expand_uuid("0000180F"),
            Uuid::parse_str("0000180f-0000-1000-8000-00805f9b34fb").ok()
        );
        assert_eq!(
            expand_uuid("03B80E5A-EDE8-4B33-A751-6CE34EC4C700"),
            Some(crate::api::central::MIDI_SERVICE_UUID)
        );
        assert_eq!(expand_uuid("xyz"), None);
    }
}
