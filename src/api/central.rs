use std::fmt::{self, Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// BLE-MIDI service advertised by the SoundBound ESP32 sensor.
pub const MIDI_SERVICE_UUID: Uuid = Uuid::from_u128(0x03B80E5A_EDE8_4B33_A751_6CE34EC4C700);

/// Commands a platform central-role radio accepts.
///
/// Every call is fire-and-forget: it returns once the command has been handed
/// to the platform, and the outcome arrives later as a
/// [`CentralEvent`](crate::api::central_event::CentralEvent) on the channel the
/// implementation was built with.
#[async_trait]
pub trait Central: Send {
    async fn start_scan(&mut self, filter: ScanFilter) -> Result<()>;

    async fn stop_scan(&mut self) -> Result<()>;

    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<()>;

    async fn cancel_connect(&mut self, peripheral: &PeripheralId) -> Result<()>;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanFilter {
    /// Advertised services to restrict the scan to. Empty scans for everything.
    pub services: Vec<Uuid>,
    pub allow_duplicates: bool,
}

/// Platform-assigned peripheral handle, stable for the lifetime of a scan session.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PeripheralId(Uuid);

impl PeripheralId {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for PeripheralId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Debug for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeripheralId({})", self.0)
    }
}
