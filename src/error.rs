use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by `SessionAdapter` operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Malformed connection string or empty host list. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Every candidate broker failed during a connect pass.
    #[error("connection error: {0}")]
    Connection(String),
    /// The transport did not confirm a send.
    #[error("delivery error: {0}")]
    Delivery(String),
    /// Transport failure surfaced as-is (subscription changes, frame reads).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Returns `true` for errors raised while parsing configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SessionError::Configuration(_))
    }

    /// Returns `true` when every broker host was exhausted.
    pub fn is_connection(&self) -> bool {
        matches!(self, SessionError::Connection(_))
    }
}
