//! Scan/connect state machine.
//!
//! [`Session::step`] takes one [`Input`] (a caller operation, a radio event or
//! a timer expiry), updates the session and returns the [`Command`]s to issue
//! to the radio plus the [`Notice`]s to surface. It performs no I/O, so the
//! same session can sit behind any platform binding.

mod registry;
mod state;

pub use registry::{DeviceRegistry, Recorded};
pub use state::{ConnectionState, Snapshot};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::api::central::{PeripheralId, ScanFilter};
use crate::api::central_event::{CentralEvent, CentralState};
use crate::api::device::{DiscoveredDevice, NameFilter};
use crate::config::ManagerConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    StartScan,
    StopScan,
    Connect(PeripheralId),
    Disconnect,
    UpdateFilter(NameFilter),
    Central(CentralEvent),
    ConnectTimeout(PeripheralId),
}

impl From<CentralEvent> for Input {
    fn from(event: CentralEvent) -> Self {
        Input::Central(event)
    }
}

/// Outbound radio commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScan(ScanFilter),
    StopScan,
    Connect(PeripheralId),
    CancelConnect(PeripheralId),
}

/// Outcomes observers are told about besides the state itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RadioChanged(CentralState),
    /// A connection attempt ended without connecting (`ConnectFailed` or `ConnectTimeout`).
    Failed { peripheral: PeripheralId, error: Error },
    Disconnected { peripheral: PeripheralId, reason: Option<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub commands: Vec<Command>,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone)]
struct Policy {
    scan_on_power_on: bool,
    rescan_on_disconnect: bool,
    scan_filter: ScanFilter,
}

impl From<&ManagerConfig> for Policy {
    fn from(config: &ManagerConfig) -> Self {
        Policy {
            scan_on_power_on: config.scan_on_power_on,
            rescan_on_disconnect: config.rescan_on_disconnect,
            scan_filter: ScanFilter {
                services: config.scan_services.clone(),
                allow_duplicates: config.allow_duplicates,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    state: ConnectionState,
    /// Whether the radio scan is running. Stays set through `Connecting`.
    scanning: bool,
    radio: CentralState,
    devices: DeviceRegistry,
    filter: NameFilter,
    services: Vec<Uuid>,
    policy: Policy,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(&ManagerConfig::default())
    }
}

impl Session {
    pub fn new(config: &ManagerConfig) -> Self {
        Session {
            state: ConnectionState::Idle,
            scanning: false,
            radio: CentralState::Unknown,
            devices: DeviceRegistry::new(),
            filter: config.name_filter.clone(),
            services: Vec::new(),
            policy: Policy::from(config),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn radio(&self) -> CentralState {
        self.radio
    }

    pub fn devices(&self) -> &[DiscoveredDevice] {
        self.devices.as_slice()
    }

    pub fn filter(&self) -> &NameFilter {
        &self.filter
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            scanning: self.scanning,
            radio: self.radio,
            devices: self.devices.as_slice().to_vec(),
            filter: self.filter.clone(),
            services: self.services.clone(),
        }
    }

    /// Applies one input. On `Err` the session is left untouched.
    pub fn step(&mut self, input: Input) -> Result<Step> {
        let mut step = Step::default();
        match input {
            Input::StartScan => self.start_scan(&mut step)?,
            Input::StopScan => self.stop_scan(&mut step),
            Input::Connect(peripheral) => self.connect(peripheral, &mut step)?,
            Input::Disconnect => self.disconnect(&mut step),
            Input::UpdateFilter(filter) => self.update_filter(filter, &mut step)?,
            Input::ConnectTimeout(peripheral) => self.connect_timed_out(peripheral, &mut step),
            Input::Central(event) => self.handle_event(event, &mut step)?,
        }
        Ok(step)
    }

    fn handle_event(&mut self, event: CentralEvent, step: &mut Step) -> Result<()> {
        match event {
            CentralEvent::StateUpdate { state } => self.radio_changed(state, step)?,
            CentralEvent::DeviceDiscovered {
                peripheral,
                name,
                rssi,
            } => self.discovered(peripheral, name, rssi),
            CentralEvent::DeviceConnected { peripheral } => self.connected(peripheral, step),
            CentralEvent::DeviceConnectionFailed { peripheral, error } => {
                self.connect_failed(peripheral, error, step)
            }
            CentralEvent::DeviceDisconnected { peripheral, error } => {
                self.disconnected(peripheral, error, step)?
            }
            CentralEvent::ServicesDiscovered {
                peripheral,
                services,
            } => self.services_discovered(peripheral, services),
        }
        Ok(())
    }

    fn start_scan(&mut self, step: &mut Step) -> Result<()> {
        if !self.radio.is_ready() {
            return Err(Error::RadioUnavailable);
        }
        if matches!(
            self.state,
            ConnectionState::Connected(_) | ConnectionState::Disconnecting(_)
        ) {
            return Err(Error::AlreadyConnected);
        }

        self.devices.clear();
        self.scanning = true;
        if self.state == ConnectionState::Idle {
            self.state = ConnectionState::Scanning;
        }
        step.commands.push(Command::StartScan(self.policy.scan_filter.clone()));
        info!("Started scanning for peripherals");
        Ok(())
    }

    fn stop_scan(&mut self, step: &mut Step) {
        if !self.scanning {
            return;
        }
        self.scanning = false;
        if self.state == ConnectionState::Scanning {
            self.state = ConnectionState::Idle;
        }
        step.commands.push(Command::StopScan);
        info!("Stopped scanning");
    }

    fn discovered(&mut self, peripheral: PeripheralId, name: Option<String>, rssi: i16) {
        if !self.scanning {
            debug!("Ignoring discovery of {} outside a scan", peripheral);
            return;
        }
        if !self.filter.matches(name.as_deref()) {
            return;
        }
        if self.devices.record(peripheral, name, rssi) == Recorded::Inserted {
            if let Some(device) = self.devices.get(&peripheral) {
                debug!("Discovered {} ({}) at RSSI {}", device.name_or_default(), peripheral, rssi);
            }
        }
    }

    fn connect(&mut self, peripheral: PeripheralId, step: &mut Step) -> Result<()> {
        if self.state.is_busy() {
            return Err(Error::AlreadyConnected);
        }
        if !self.devices.contains(&peripheral) {
            return Err(Error::InvalidTarget(peripheral));
        }
        if !self.radio.is_ready() {
            return Err(Error::RadioUnavailable);
        }

        self.state = ConnectionState::Connecting(peripheral);
        step.commands.push(Command::Connect(peripheral));
        info!("Connecting to {}", peripheral);
        Ok(())
    }

    fn connected(&mut self, peripheral: PeripheralId, step: &mut Step) {
        if self.state != ConnectionState::Connecting(peripheral) {
            warn!("Ignoring unexpected connection of {} in {:?}", peripheral, self.state);
            return;
        }
        self.state = ConnectionState::Connected(peripheral);
        self.services.clear();
        self.stop_scan(step);
        info!("Connected to {}", peripheral);
    }

    fn connect_failed(&mut self, peripheral: PeripheralId, error: Option<String>, step: &mut Step) {
        if self.state != ConnectionState::Connecting(peripheral) {
            warn!("Ignoring stale connection failure of {}", peripheral);
            return;
        }
        let reason = error.unwrap_or_else(|| "unknown error".to_string());
        warn!("Failed to connect to {}: {}", peripheral, reason);
        self.state = ConnectionState::Idle;
        step.notices.push(Notice::Failed {
            peripheral,
            error: Error::ConnectFailed { reason },
        });
    }

    fn connect_timed_out(&mut self, peripheral: PeripheralId, step: &mut Step) {
        if self.state != ConnectionState::Connecting(peripheral) {
            return;
        }
        warn!("Connection to {} timed out", peripheral);
        self.state = ConnectionState::Idle;
        step.commands.push(Command::CancelConnect(peripheral));
        step.notices.push(Notice::Failed {
            peripheral,
            error: Error::ConnectTimeout,
        });
    }

    fn disconnect(&mut self, step: &mut Step) {
        if let ConnectionState::Connected(peripheral) = self.state {
            self.state = ConnectionState::Disconnecting(peripheral);
            step.commands.push(Command::CancelConnect(peripheral));
            info!("Disconnecting from {}", peripheral);
        }
    }

    /// Always followed by a fresh scan when `rescan_on_disconnect` is set and
    /// the radio is up.
    fn disconnected(
        &mut self,
        peripheral: PeripheralId,
        error: Option<String>,
        step: &mut Step,
    ) -> Result<()> {
        if self.state.peripheral() != Some(peripheral) {
            warn!("Ignoring disconnection of untracked peripheral {}", peripheral);
            return Ok(());
        }
        info!("Disconnected from {}", peripheral);
        self.services.clear();
        self.state = ConnectionState::Idle;
        step.notices.push(Notice::Disconnected {
            peripheral,
            reason: error,
        });

        if self.policy.rescan_on_disconnect && self.radio.is_ready() {
            self.start_scan(step)?;
        }
        Ok(())
    }

    fn services_discovered(&mut self, peripheral: PeripheralId, services: Vec<Uuid>) {
        if self.state != ConnectionState::Connected(peripheral) {
            return;
        }
        debug!("{} exposes {} services", peripheral, services.len());
        self.services = services;
    }

    fn radio_changed(&mut self, radio: CentralState, step: &mut Step) -> Result<()> {
        if radio == self.radio {
            return Ok(());
        }
        info!("Central state is {:?}", radio);
        self.radio = radio;
        step.notices.push(Notice::RadioChanged(radio));

        if radio.is_ready() {
            if self.policy.scan_on_power_on && self.state == ConnectionState::Idle {
                self.start_scan(step)?;
            }
            return Ok(());
        }

        // The platform drops scans and links on its own when the radio goes away.
        self.scanning = false;
        if let Some(peripheral) = self.state.peripheral() {
            step.notices.push(Notice::Disconnected {
                peripheral,
                reason: Some(Error::RadioUnavailable.to_string()),
            });
        }
        self.services.clear();
        self.state = ConnectionState::Idle;
        Ok(())
    }

    fn update_filter(&mut self, filter: NameFilter, step: &mut Step) -> Result<()> {
        debug!("Updating name filter to {:?}", filter);
        self.filter = filter;
        if self.scanning {
            self.stop_scan(step);
            self.start_scan(step)?;
        }
        Ok(())
    }

}
