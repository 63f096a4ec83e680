use uuid::Uuid;

use crate::api::central::PeripheralId;
use crate::api::central_event::CentralState;
use crate::api::device::{DiscoveredDevice, NameFilter};

/// Connection lifecycle. At most one peripheral is ever pending or connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting(PeripheralId),
    Connected(PeripheralId),
    Disconnecting(PeripheralId),
}

impl ConnectionState {
    /// The peripheral this state refers to, if any.
    pub fn peripheral(&self) -> Option<PeripheralId> {
        match self {
            ConnectionState::Connecting(id)
            | ConnectionState::Connected(id)
            | ConnectionState::Disconnecting(id) => Some(*id),
            ConnectionState::Idle | ConnectionState::Scanning => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.peripheral().is_some()
    }
}

/// Everything an observer needs to render the connection screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ConnectionState,
    pub scanning: bool,
    pub radio: CentralState,
    /// In order of first discovery.
    pub devices: Vec<DiscoveredDevice>,
    pub filter: NameFilter,
    /// Services reported by the connected peripheral.
    pub services: Vec<Uuid>,
}

impl Snapshot {
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    pub fn connected_peripheral(&self) -> Option<PeripheralId> {
        match self.state {
            ConnectionState::Connected(id) => Some(id),
            _ => None,
        }
    }
}
