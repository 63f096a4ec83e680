use uuid::Uuid;

use crate::api::central::PeripheralId;

/// Asynchronous callbacks from the platform radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    StateUpdate {
        state: CentralState,
    },
    DeviceDiscovered {
        peripheral: PeripheralId,
        name: Option<String>,
        rssi: i16,
    },
    DeviceConnected {
        peripheral: PeripheralId,
    },
    DeviceConnectionFailed {
        peripheral: PeripheralId,
        error: Option<String>,
    },
    DeviceDisconnected {
        peripheral: PeripheralId,
        error: Option<String>,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        services: Vec<Uuid>,
    },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CentralState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl CentralState {
    pub fn is_ready(&self) -> bool {
        *self == CentralState::PoweredOn
    }
}
