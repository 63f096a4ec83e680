use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{debug, error, info, warn};
use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{AnyThread, msg_send};
use objc2_core_bluetooth::{
    CBCentralManager, CBCentralManagerScanOptionAllowDuplicatesKey, CBManager,
    CBManagerAuthorization, CBUUID,
};
use objc2_foundation::{NSArray, NSDictionary, NSNumber, NSString};
use tokio::runtime;
use tokio::sync::mpsc::{Receiver, Sender};
use uuid::Uuid;

use super::central_delegate_cb::CentralDelegate;
use super::mac_extensions_cb::uuid_to_cbuuid;
use super::mac_utils_cb;
use crate::api::central::{PeripheralId, ScanFilter};
use crate::api::central_event::CentralEvent;
use crate::{Error, Result};

#[derive(Debug)]
pub enum ManagerCommand {
    StartScan { filter: ScanFilter },
    StopScan,
    Connect { peripheral_uuid: Uuid },
    CancelConnect { peripheral_uuid: Uuid },
}

static CENTRAL_THREAD_RUNNING: AtomicBool = AtomicBool::new(false);

// The CBCentralManager and its delegate live on one dedicated thread; only
// channels cross the boundary.
pub fn run_central_thread(sender: Sender<CentralEvent>, listener: Receiver<ManagerCommand>) -> Result<()> {
    if CENTRAL_THREAD_RUNNING
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(Error::from_string(
            "CoreBluetooth central is already running".to_string(),
        ));
    }

    let spawned = thread::Builder::new()
        .name("corebluetooth-central".to_string())
        .spawn(move || {
            match runtime::Builder::new_current_thread().build() {
                Ok(runtime) => runtime.block_on(async move {
                    let mut central_manager = CentralManager::new(sender, listener);
                    while central_manager.handle_command().await {}
                    info!("CoreBluetooth central thread finished");
                }),
                Err(e) => error!("Failed to create runtime: {}", e),
            }
            CENTRAL_THREAD_RUNNING.store(false, Ordering::SeqCst);
        });

    if let Err(e) = spawned {
        CENTRAL_THREAD_RUNNING.store(false, Ordering::SeqCst);
        return Err(Error::from_string(format!("Failed to spawn central thread: {}", e)));
    }
    Ok(())
}

struct CentralManager {
    manager: Retained<CBCentralManager>,
    delegate: Retained<CentralDelegate>,
    command_rx: Receiver<ManagerCommand>,
    /// Peripheral with a pending or live connection.
    active: Option<Uuid>,
}

impl CentralManager {
    fn new(central_tx: Sender<CentralEvent>, command_rx: Receiver<ManagerCommand>) -> Self {
        let delegate: Retained<CentralDelegate> = CentralDelegate::new(central_tx);

        let queue = unsafe {
            mac_utils_cb::dispatch_queue_create(
                c"soundbound.central".as_ptr(),
                mac_utils_cb::DISPATCH_QUEUE_SERIAL,
            )
        };
        let queue: *mut AnyObject = queue.cast();

        let manager: Retained<CBCentralManager> = unsafe {
            msg_send![CBCentralManager::alloc(), initWithDelegate: &*delegate, queue: queue]
        };

        Self {
            manager,
            delegate,
            command_rx,
            active: None,
        }
    }

    /// Returns `false` once the command channel has closed.
    async fn handle_command(&mut self) -> bool {
        let Some(command) = self.command_rx.recv().await else {
            return false;
        };
        debug!("Handling {:?}", command);
        match command {
            ManagerCommand::StartScan { filter } => self.start_scan(&filter),
            ManagerCommand::StopScan => unsafe { self.manager.stopScan() },
            ManagerCommand::Connect { peripheral_uuid } => self.connect(peripheral_uuid),
            ManagerCommand::CancelConnect { peripheral_uuid } => {
                self.cancel_connect(peripheral_uuid)
            }
        }
        true
    }

    fn start_scan(&mut self, filter: &ScanFilter) {
        self.delegate.forget_peripherals(self.active);

        let services: Vec<Retained<CBUUID>> =
            filter.services.iter().copied().map(uuid_to_cbuuid).collect();
        let services = (!services.is_empty()).then(|| NSArray::from_retained_slice(&services));

        let options: Retained<NSDictionary<NSString, AnyObject>> = unsafe {
            NSDictionary::from_retained_objects(
                &[CBCentralManagerScanOptionAllowDuplicatesKey],
                &[Retained::cast_unchecked::<AnyObject>(NSNumber::new_bool(
                    filter.allow_duplicates,
                ))],
            )
        };

        unsafe {
            self.manager
                .scanForPeripheralsWithServices_options(services.as_deref(), Some(&options))
        };
    }

    fn connect(&mut self, peripheral_uuid: Uuid) {
        match self.delegate.peripheral(&peripheral_uuid) {
            Some(peripheral) => {
                self.active = Some(peripheral_uuid);
                unsafe { self.manager.connectPeripheral_options(&peripheral, None) };
            }
            None => {
                warn!("Cannot connect to {}: not discovered", peripheral_uuid);
                self.delegate.send_event(CentralEvent::DeviceConnectionFailed {
                    peripheral: PeripheralId::new(peripheral_uuid),
                    error: Some("peripheral is no longer known to CoreBluetooth".to_string()),
                });
            }
        }
    }

    fn cancel_connect(&mut self, peripheral_uuid: Uuid) {
        if self.active == Some(peripheral_uuid) {
            self.active = None;
        }
        match self.delegate.peripheral(&peripheral_uuid) {
            Some(peripheral) => unsafe { self.manager.cancelPeripheralConnection(&peripheral) },
            None => warn!("Cannot cancel connection to unknown {}", peripheral_uuid),
        }
    }
}

pub fn is_authorized() -> bool {
    let authorization = unsafe { CBManager::authorization_class() };
    authorization != CBManagerAuthorization::Restricted
        && authorization != CBManagerAuthorization::Denied
}
