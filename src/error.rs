use thiserror::Error;

use crate::api::central::PeripheralId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The radio is not powered on. Transient; retry after a `PoweredOn` update.
    #[error("bluetooth radio is not powered on")]
    RadioUnavailable,

    #[error("peripheral {0} is not in the discovered device list")]
    InvalidTarget(PeripheralId),

    /// A peripheral is already connecting, connected or disconnecting.
    #[error("a peripheral connection is already active or pending")]
    AlreadyConnected,

    #[error("connection failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("connection attempt timed out")]
    ConnectTimeout,

    #[error("connection manager is no longer running")]
    ChannelClosed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("platform error: {0}")]
    Platform(String),
}

impl Error {
    pub fn from_string(message: String) -> Self {
        Error::Platform(message)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::ChannelClosed
    }
}

pub type Result<T> = std::result::Result<T, Error>;
