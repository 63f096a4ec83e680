//! CoreBluetooth implementation of [`Central`](crate::api::central::Central).

mod central_manager;
mod objc_bindings;

pub use central_manager::CoreBluetoothCentral;

use tokio::sync::mpsc;

use crate::config::ManagerConfig;
use crate::manager::{ConnectionManager, ManagerHandle};
use crate::Result;

/// Starts a connection manager backed by the system Bluetooth stack.
pub fn spawn_manager(config: &ManagerConfig) -> Result<ManagerHandle> {
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let central = CoreBluetoothCentral::new(event_tx)?;
    Ok(ConnectionManager::spawn(central, event_rx, config))
}
