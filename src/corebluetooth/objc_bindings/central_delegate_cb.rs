use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::executor;
use log::{error, trace, warn};
use objc2::rc::Retained;
use objc2::runtime::{AnyObject, ProtocolObject};
use objc2::{AnyThread, DefinedClass, Message, define_class, msg_send};
use objc2_core_bluetooth::{
    CBCentralManager, CBCentralManagerDelegate, CBManagerState, CBPeripheral, CBPeripheralDelegate,
};
use objc2_foundation::{NSDictionary, NSError, NSNumber, NSObject, NSObjectProtocol, NSString};
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

use crate::api::central::PeripheralId;
use crate::api::central_event::{CentralEvent, CentralState};
use crate::corebluetooth::objc_bindings::mac_extensions_cb::{cbuuid_to_uuid, nsuuid_to_uuid};

// Instance variables shared between the Rust side and the ObjC delegate.
#[derive(Debug)]
pub struct IVars {
    sender: Sender<CentralEvent>,
    // CoreBluetooth only keeps peripherals alive while someone retains them.
    peripherals: Mutex<HashMap<Uuid, Retained<CBPeripheral>>>,
}

define_class!(
    #[derive(Debug)]
    #[unsafe(super(NSObject))]
    #[thread_kind = AnyThread]
    #[name = "SoundBoundCentralDelegate"]
    #[ivars = IVars]
    pub struct CentralDelegate;

    unsafe impl NSObjectProtocol for CentralDelegate {}

    unsafe impl CBCentralManagerDelegate for CentralDelegate {
        #[unsafe(method(centralManagerDidUpdateState:))]
        fn delegate_centralmanagerdidupdatestate(&self, central: &CBCentralManager) {
            trace!("delegate_centralmanagerdidupdatestate");
            let state = unsafe { central.state() };
            self.send_event(CentralEvent::StateUpdate {
                state: convert_state(state),
            });
        }

        #[unsafe(method(centralManager:didDiscoverPeripheral:advertisementData:RSSI:))]
        fn delegate_centralmanager_diddiscoverperipheral_advertisementdata_rssi(
            &self,
            _central: &CBCentralManager,
            peripheral: &CBPeripheral,
            _adv_data: &NSDictionary<NSString, AnyObject>,
            rssi: &NSNumber,
        ) {
            trace!(
                "delegate_centralmanager_diddiscoverperipheral_advertisementdata_rssi {}",
                peripheral_debug(peripheral)
            );
            let peripheral_uuid = nsuuid_to_uuid(&unsafe { peripheral.identifier() });
            let name = unsafe { peripheral.name() }.map(|name| name.to_string());

            self.ivars()
                .peripherals
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(peripheral_uuid, peripheral.retain());

            self.send_event(CentralEvent::DeviceDiscovered {
                peripheral: PeripheralId::new(peripheral_uuid),
                name,
                rssi: rssi.as_i16(),
            });
        }

        #[unsafe(method(centralManager:didConnectPeripheral:))]
        fn delegate_centralmanager_didconnectperipheral(
            &self,
            _central: &CBCentralManager,
            peripheral: &CBPeripheral,
        ) {
            trace!(
                "delegate_centralmanager_didconnectperipheral {}",
                peripheral_debug(peripheral)
            );
            unsafe { peripheral.setDelegate(Some(ProtocolObject::from_ref(self))) };
            unsafe { peripheral.discoverServices(None) };
            let peripheral_uuid = nsuuid_to_uuid(&unsafe { peripheral.identifier() });
            self.send_event(CentralEvent::DeviceConnected {
                peripheral: PeripheralId::new(peripheral_uuid),
            });
        }

        #[unsafe(method(centralManager:didFailToConnectPeripheral:error:))]
        fn delegate_centralmanager_didfailtoconnectperipheral_error(
            &self,
            _central: &CBCentralManager,
            peripheral: &CBPeripheral,
            error: Option<&NSError>,
        ) {
            trace!(
                "delegate_centralmanager_didfailtoconnectperipheral_error {}",
                peripheral_debug(peripheral)
            );
            let peripheral_uuid = nsuuid_to_uuid(&unsafe { peripheral.identifier() });
            self.send_event(CentralEvent::DeviceConnectionFailed {
                peripheral: PeripheralId::new(peripheral_uuid),
                error: localized_description(error),
            });
        }

        #[unsafe(method(centralManager:didDisconnectPeripheral:error:))]
        fn delegate_centralmanager_diddisconnectperipheral_error(
            &self,
            _central: &CBCentralManager,
            peripheral: &CBPeripheral,
            error: Option<&NSError>,
        ) {
            trace!(
                "delegate_centralmanager_diddisconnectperipheral_error {}",
                peripheral_debug(peripheral)
            );
            let peripheral_uuid = nsuuid_to_uuid(&unsafe { peripheral.identifier() });
            self.send_event(CentralEvent::DeviceDisconnected {
                peripheral: PeripheralId::new(peripheral_uuid),
                error: localized_description(error),
            });
        }
    }

    unsafe impl CBPeripheralDelegate for CentralDelegate {
        #[unsafe(method(peripheral:didDiscoverServices:))]
        fn delegate_peripheral_diddiscoverservices(
            &self,
            peripheral: &CBPeripheral,
            error: Option<&NSError>,
        ) {
            trace!(
                "delegate_peripheral_diddiscoverservices {}",
                peripheral_debug(peripheral)
            );
            if let Some(description) = localized_description(error) {
                warn!("Error discovering services: {}", description);
                return;
            }
            let Some(services) = (unsafe { peripheral.services() }) else {
                return;
            };
            let services = services
                .iter()
                .map(|service| cbuuid_to_uuid(&unsafe { service.UUID() }))
                .collect();
            let peripheral_uuid = nsuuid_to_uuid(&unsafe { peripheral.identifier() });
            self.send_event(CentralEvent::ServicesDiscovered {
                peripheral: PeripheralId::new(peripheral_uuid),
                services,
            });
        }
    }
);

impl CentralDelegate {
    pub fn new(sender: Sender<CentralEvent>) -> Retained<Self> {
        let this = CentralDelegate::alloc().set_ivars(IVars {
            sender,
            peripherals: Mutex::new(HashMap::new()),
        });
        unsafe { msg_send![super(this), init] }
    }

    /// The retained handle for a peripheral seen during discovery.
    pub fn peripheral(&self, peripheral_uuid: &Uuid) -> Option<Retained<CBPeripheral>> {
        self.ivars()
            .peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peripheral_uuid)
            .cloned()
    }

    /// Releases every cached peripheral except `keep`.
    pub fn forget_peripherals(&self, keep: Option<Uuid>) {
        self.ivars()
            .peripherals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|uuid, _| Some(*uuid) == keep);
    }

    pub fn send_event(&self, event: CentralEvent) {
        let sender = self.ivars().sender.clone();
        executor::block_on(async {
            if let Err(e) = sender.send(event).await {
                error!("Error sending delegate event: {}", e);
            }
        });
    }
}

fn localized_description(error: Option<&NSError>) -> Option<String> {
    error.map(|error| error.localizedDescription().to_string())
}

fn peripheral_debug(peripheral: &CBPeripheral) -> String {
    let uuid = unsafe { peripheral.identifier() }.UUIDString();
    if let Some(name) = unsafe { peripheral.name() } {
        format!("CBPeripheral({}, {})", name, uuid)
    } else {
        format!("CBPeripheral({})", uuid)
    }
}

fn convert_state(cb_state: CBManagerState) -> CentralState {
    match cb_state {
        CBManagerState::Unknown => CentralState::Unknown,
        CBManagerState::Resetting => CentralState::Resetting,
        CBManagerState::Unsupported => CentralState::Unsupported,
        CBManagerState::Unauthorized => CentralState::Unauthorized,
        CBManagerState::PoweredOff => CentralState::PoweredOff,
        CBManagerState::PoweredOn => CentralState::PoweredOn,
        _ => {
            warn!("Unexpected CBManagerState value, treating as Unknown");
            CentralState::Unknown
        }
    }
}
