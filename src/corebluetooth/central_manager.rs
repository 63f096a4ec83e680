use async_trait::async_trait;
use log::warn;
use tokio::sync::mpsc::{self, Sender};

use crate::{
    Result,
    api::{
        central::{Central, PeripheralId, ScanFilter},
        central_event::CentralEvent,
    },
    corebluetooth::objc_bindings::central_manager_cb::{
        ManagerCommand, is_authorized, run_central_thread,
    },
};

/// Forwards commands to the CoreBluetooth thread. Only one may exist at a time.
pub struct CoreBluetoothCentral {
    manager_tx: Sender<ManagerCommand>,
}

impl CoreBluetoothCentral {
    pub fn new(sender_tx: Sender<CentralEvent>) -> Result<Self> {
        if !is_authorized() {
            warn!("Bluetooth access has not been granted to this process");
        }
        let (manager_tx, manager_rx) = mpsc::channel(64);
        run_central_thread(sender_tx, manager_rx)?;
        Ok(Self { manager_tx })
    }
}

#[async_trait]
impl Central for CoreBluetoothCentral {
    async fn start_scan(&mut self, filter: ScanFilter) -> Result<()> {
        self.manager_tx
            .send(ManagerCommand::StartScan { filter })
            .await?;
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        self.manager_tx.send(ManagerCommand::StopScan).await?;
        Ok(())
    }

    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<()> {
        self.manager_tx
            .send(ManagerCommand::Connect {
                peripheral_uuid: peripheral.uuid(),
            })
            .await?;
        Ok(())
    }

    async fn cancel_connect(&mut self, peripheral: &PeripheralId) -> Result<()> {
        self.manager_tx
            .send(ManagerCommand::CancelConnect {
                peripheral_uuid: peripheral.uuid(),
            })
            .await?;
        Ok(())
    }
}
