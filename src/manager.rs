//! Async driver tying a [`Session`] to a [`Central`].
//!
//! All caller requests and radio events are funnelled into one task, so the
//! session is never mutated concurrently. Radio commands are fire-and-forget:
//! a request succeeds once its commands are issued, not once the radio is done.
//! A connect command that cannot be issued fails the request with
//! [`Error::ConnectFailed`] after the session has been returned to `Idle`.

use std::time::Duration;

use futures::future;
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{Instant, sleep_until};

use crate::api::central::{Central, PeripheralId};
use crate::api::central_event::CentralEvent;
use crate::api::device::NameFilter;
use crate::config::ManagerConfig;
use crate::session::{Command, ConnectionState, Input, Notice, Session, Snapshot, Step};
use crate::{Error, Result};

type Responder = oneshot::Sender<Result<()>>;

#[derive(Debug)]
enum ManagerRequest {
    StartScan { responder: Responder },
    StopScan { responder: Responder },
    Connect { peripheral: PeripheralId, responder: Responder },
    Disconnect { responder: Responder },
    UpdateFilter { filter: NameFilter, responder: Responder },
}

impl ManagerRequest {
    fn into_parts(self) -> (Input, Responder) {
        match self {
            ManagerRequest::StartScan { responder } => (Input::StartScan, responder),
            ManagerRequest::StopScan { responder } => (Input::StopScan, responder),
            ManagerRequest::Connect {
                peripheral,
                responder,
            } => (Input::Connect(peripheral), responder),
            ManagerRequest::Disconnect { responder } => (Input::Disconnect, responder),
            ManagerRequest::UpdateFilter { filter, responder } => {
                (Input::UpdateFilter(filter), responder)
            }
        }
    }
}

pub struct ConnectionManager<C: Central> {
    central: C,
    session: Session,
    central_rx: Option<Receiver<CentralEvent>>,
    request_rx: Receiver<ManagerRequest>,
    state_tx: watch::Sender<Snapshot>,
    notice_tx: broadcast::Sender<Notice>,
    connect_timeout: Option<Duration>,
    deadline: Option<(PeripheralId, Instant)>,
}

impl<C: Central + 'static> ConnectionManager<C> {
    /// Builds a manager around `central`, whose events arrive on `central_rx`.
    pub fn new(
        central: C,
        central_rx: Receiver<CentralEvent>,
        config: &ManagerConfig,
    ) -> (Self, ManagerHandle) {
        let session = Session::new(config);
        let (request_tx, request_rx) = mpsc::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(session.snapshot());
        let (notice_tx, _) = broadcast::channel(config.event_capacity);

        let handle = ManagerHandle {
            request_tx,
            state_rx,
            notice_tx: notice_tx.clone(),
        };
        let manager = ConnectionManager {
            central,
            session,
            central_rx: Some(central_rx),
            request_rx,
            state_tx,
            notice_tx,
            connect_timeout: config.connect_timeout(),
            deadline: None,
        };
        (manager, handle)
    }

    /// Spawns the manager on the current tokio runtime.
    pub fn spawn(
        central: C,
        central_rx: Receiver<CentralEvent>,
        config: &ManagerConfig,
    ) -> ManagerHandle {
        let (manager, handle) = Self::new(central, central_rx, config);
        tokio::spawn(manager.run());
        handle
    }

    /// Runs until every [`ManagerHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("Connection manager started");
        loop {
            tokio::select! {
                biased;
                event = recv_event(&mut self.central_rx) => match event {
                    Some(event) => {
                        if let Err(e) = self.apply(Input::Central(event)).await {
                            warn!("Radio event rejected: {}", e);
                        }
                    }
                    None => {
                        warn!("Radio event channel closed");
                        self.central_rx = None;
                    }
                },
                peripheral = expiry(self.deadline) => {
                    self.deadline = None;
                    if let Err(e) = self.apply(Input::ConnectTimeout(peripheral)).await {
                        warn!("Connect timeout rejected: {}", e);
                    }
                }
                request = self.request_rx.recv() => match request {
                    Some(request) => {
                        let (input, responder) = request.into_parts();
                        let result = self.apply(input).await;
                        let _ = responder.send(result);
                    }
                    None => break,
                },
            }
        }
        info!("Connection manager stopped");
    }

    async fn apply(&mut self, input: Input) -> Result<()> {
        debug!("Applying {:?}", input);
        let mut step = self.session.step(input)?;
        let mut outcome = Ok(());
        // A connect that never reached the radio is fed back as a failure.
        while let Some((feedback, error)) = self.execute(step).await {
            outcome = Err(error);
            step = match self.session.step(feedback) {
                Ok(step) => step,
                Err(e) => {
                    warn!("Feedback rejected: {}", e);
                    break;
                }
            };
        }
        self.refresh_deadline();
        self.publish();
        outcome
    }

    async fn execute(&mut self, step: Step) -> Option<(Input, Error)> {
        let mut feedback = None;
        for command in step.commands {
            if let Err(e) = self.dispatch(&command).await {
                error!("Failed to issue {:?}: {}", command, e);
                if let Command::Connect(peripheral) = command {
                    let reason = e.to_string();
                    feedback = Some((
                        Input::Central(CentralEvent::DeviceConnectionFailed {
                            peripheral,
                            error: Some(reason.clone()),
                        }),
                        Error::ConnectFailed { reason },
                    ));
                }
            }
        }
        for notice in step.notices {
            // No subscribers is fine.
            let _ = self.notice_tx.send(notice);
        }
        feedback
    }

    async fn dispatch(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::StartScan(filter) => self.central.start_scan(filter.clone()).await,
            Command::StopScan => self.central.stop_scan().await,
            Command::Connect(peripheral) => self.central.connect(peripheral).await,
            Command::CancelConnect(peripheral) => self.central.cancel_connect(peripheral).await,
        }
    }

    fn refresh_deadline(&mut self) {
        match (self.session.state(), self.connect_timeout) {
            (ConnectionState::Connecting(peripheral), Some(timeout)) => {
                if !matches!(self.deadline, Some((pending, _)) if pending == peripheral) {
                    self.deadline = Some((peripheral, Instant::now() + timeout));
                }
            }
            _ => self.deadline = None,
        }
    }

    fn publish(&self) {
        let snapshot = self.session.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

async fn recv_event(rx: &mut Option<Receiver<CentralEvent>>) -> Option<CentralEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => future::pending().await,
    }
}

async fn expiry(deadline: Option<(PeripheralId, Instant)>) -> PeripheralId {
    match deadline {
        Some((peripheral, at)) => {
            sleep_until(at).await;
            peripheral
        }
        None => future::pending().await,
    }
}

/// Cloneable front end of a running [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    request_tx: Sender<ManagerRequest>,
    state_rx: watch::Receiver<Snapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl ManagerHandle {
    pub async fn start_scan(&self) -> Result<()> {
        self.request(|responder| ManagerRequest::StartScan { responder })
            .await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.request(|responder| ManagerRequest::StopScan { responder })
            .await
    }

    pub async fn connect(&self, peripheral: PeripheralId) -> Result<()> {
        self.request(|responder| ManagerRequest::Connect {
            peripheral,
            responder,
        })
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(|responder| ManagerRequest::Disconnect { responder })
            .await
    }

    pub async fn update_filter(&self, pattern: impl Into<String>, enabled: bool) -> Result<()> {
        let filter = NameFilter::new(pattern, enabled);
        self.request(|responder| ManagerRequest::UpdateFilter { filter, responder })
            .await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state_rx.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    async fn request(&self, build: impl FnOnce(Responder) -> ManagerRequest) -> Result<()> {
        let (responder, response) = oneshot::channel();
        self.request_tx.send(build(responder)).await?;
        response.await.map_err(Error::from)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::central_event::CentralState;
    use crate::mock::MockCentral;
    use uuid::Uuid;

    const WAIT: Duration = Duration::from_secs(5);

    fn id(n: u128) -> PeripheralId {
        PeripheralId::new(Uuid::from_u128(n))
    }

    fn start(config: ManagerConfig) -> (MockCentral, Sender<CentralEvent>, ManagerHandle) {
        let central = MockCentral::new();
        let (event_tx, event_rx) = mpsc::channel(64);
        let handle = ConnectionManager::spawn(central.clone(), event_rx, &config);
        (central, event_tx, handle)
    }

    async fn wait_until(handle: &ManagerHandle, predicate: impl FnMut(&Snapshot) -> bool) -> Snapshot {
        let mut state_rx = handle.subscribe();
        let snapshot = tokio::time::timeout(WAIT, state_rx.wait_for(predicate))
            .await
            .expect("state never reached")
            .expect("manager stopped");
        snapshot.clone()
    }

    async fn power_on(events: &Sender<CentralEvent>) {
        events
            .send(CentralEvent::StateUpdate {
                state: CentralState::PoweredOn,
            })
            .await
            .unwrap();
    }

    async fn discover(events: &Sender<CentralEvent>, n: u128, name: &str) {
        events
            .send(CentralEvent::DeviceDiscovered {
                peripheral: id(n),
                name: Some(name.to_string()),
                rssi: -55,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scan_needs_powered_radio() {
        let (central, _events, handle) = start(ManagerConfig::default());
        assert_eq!(handle.start_scan().await, Err(Error::RadioUnavailable));
        assert!(central.commands().is_empty());
        assert_eq!(handle.snapshot().state, ConnectionState::Idle);
    }

    #[tokio::test]
    async fn power_on_starts_scan() {
        let (central, events, handle) = start(ManagerConfig::default());
        power_on(&events).await;
        wait_until(&handle, |s| s.state == ConnectionState::Scanning).await;
        assert!(matches!(central.commands().as_slice(), [Command::StartScan(_)]));
    }

    #[tokio::test]
    async fn connect_disconnect_cycle_rescans() {
        let (central, events, handle) = start(ManagerConfig::default());
        let mut notices = handle.notices();
        power_on(&events).await;
        discover(&events, 1, "ESP32-A").await;
        wait_until(&handle, |s| s.devices.len() == 1).await;

        handle.connect(id(1)).await.unwrap();
        assert_eq!(handle.snapshot().state, ConnectionState::Connecting(id(1)));
        assert_eq!(handle.connect(id(1)).await, Err(Error::AlreadyConnected));

        events
            .send(CentralEvent::DeviceConnected { peripheral: id(1) })
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.is_connected()).await;
        assert!(!snapshot.scanning);

        handle.disconnect().await.unwrap();
        events
            .send(CentralEvent::DeviceDisconnected {
                peripheral: id(1),
                error: None,
            })
            .await
            .unwrap();
        let snapshot = wait_until(&handle, |s| s.state == ConnectionState::Scanning).await;
        assert!(snapshot.devices.is_empty());

        let commands = central.commands();
        assert!(matches!(commands[0], Command::StartScan(_)));
        assert_eq!(commands[1], Command::Connect(id(1)));
        assert_eq!(commands[2], Command::StopScan);
        assert_eq!(commands[3], Command::CancelConnect(id(1)));
        assert!(matches!(commands[4], Command::StartScan(_)));

        assert_eq!(notices.recv().await.unwrap(), Notice::RadioChanged(CentralState::PoweredOn));
        assert_eq!(
            notices.recv().await.unwrap(),
            Notice::Disconnected {
                peripheral: id(1),
                reason: None
            }
        );
    }

    #[tokio::test]
    async fn unknown_target_is_rejected() {
        let (_central, events, handle) = start(ManagerConfig::default());
        power_on(&events).await;
        wait_until(&handle, |s| s.scanning).await;
        assert_eq!(handle.connect(id(42)).await, Err(Error::InvalidTarget(id(42))));
        assert_eq!(handle.snapshot().state, ConnectionState::Scanning);
    }

    #[tokio::test]
    async fn filter_update_rebuilds_list() {
        let (_central, events, handle) = start(ManagerConfig::default());
        power_on(&events).await;
        discover(&events, 1, "Other").await;
        wait_until(&handle, |s| s.devices.len() == 1).await;

        handle.update_filter("esp", true).await.unwrap();
        let snapshot = handle.snapshot();
        assert!(snapshot.devices.is_empty());
        assert_eq!(snapshot.filter, NameFilter::new("esp", true));

        discover(&events, 1, "Other").await;
        discover(&events, 2, "ESP32-A").await;
        let snapshot = wait_until(&handle, |s| !s.devices.is_empty()).await;
        assert_eq!(snapshot.devices.len(), 1);
        assert_eq!(snapshot.devices[0].identifier, id(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_connect_times_out() {
        let (central, events, handle) = start(ManagerConfig {
            connect_timeout_ms: 2_000,
            ..ManagerConfig::default()
        });
        let mut notices = handle.notices();
        power_on(&events).await;
        discover(&events, 1, "ESP32-A").await;
        wait_until(&handle, |s| s.devices.len() == 1).await;
        handle.connect(id(1)).await.unwrap();

        loop {
            match notices.recv().await.unwrap() {
                Notice::Failed { peripheral, error } => {
                    assert_eq!(peripheral, id(1));
                    assert_eq!(error, Error::ConnectTimeout);
                    break;
                }
                _ => continue,
            }
        }
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Idle);
        assert!(snapshot.scanning);
        assert!(central.commands().contains(&Command::CancelConnect(id(1))));
    }

    #[tokio::test]
    async fn undeliverable_connect_is_reported_as_failure() {
        let (central, events, handle) = start(ManagerConfig::default());
        central.fail_connects(true);
        let mut notices = handle.notices();
        power_on(&events).await;
        discover(&events, 1, "ESP32-A").await;
        wait_until(&handle, |s| s.devices.len() == 1).await;

        let err = handle.connect(id(1)).await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Idle);
        assert!(snapshot.scanning);

        loop {
            if let Notice::Failed { error, .. } = notices.recv().await.unwrap() {
                assert!(matches!(error, Error::ConnectFailed { .. }));
                break;
            }
        }
    }

    #[tokio::test]
    async fn manager_stops_when_handles_drop() {
        let central = MockCentral::new();
        let (_events, event_rx) = mpsc::channel(8);
        let (manager, handle) = ConnectionManager::new(central, event_rx, &ManagerConfig::default());
        let task = tokio::spawn(manager.run());
        drop(handle);
        tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    }
}
