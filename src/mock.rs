//! In-memory [`Central`] that records every command it is given.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::api::central::{Central, PeripheralId, ScanFilter};
use crate::session::Command;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct MockCentral {
    commands: Arc<Mutex<Vec<Command>>>,
    fail_connects: Arc<AtomicBool>,
}

impl MockCentral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, oldest first.
    pub fn commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Makes subsequent `connect` calls fail as if the radio refused them.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    fn record(&self, command: Command) {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command);
    }
}

#[async_trait]
impl Central for MockCentral {
    async fn start_scan(&mut self, filter: ScanFilter) -> Result<()> {
        self.record(Command::StartScan(filter));
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<()> {
        self.record(Command::StopScan);
        Ok(())
    }

    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<()> {
        self.record(Command::Connect(*peripheral));
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(Error::Platform("connect refused".to_string()));
        }
        Ok(())
    }

    async fn cancel_connect(&mut self, peripheral: &PeripheralId) -> Result<()> {
        self.record(Command::CancelConnect(*peripheral));
        Ok(())
    }
}
