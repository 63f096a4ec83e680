//! Central-role Bluetooth LE connection management for SoundBound.
//!
//! A [`session::Session`] holds the scan/connect state machine, a
//! [`manager::ConnectionManager`] drives it against any [`api::central::Central`]
//! implementation, and [`corebluetooth`] provides one for Apple platforms.

pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod session;

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub mod corebluetooth;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use manager::{ConnectionManager, ManagerHandle};
pub use session::{ConnectionState, Notice, Session, Snapshot};
