//! The seam between the session core and a STOMP client implementation.
//!
//! A [`Connector`] opens links to a single broker URI; a [`Link`] exposes the
//! STOMP primitives the session needs over one open connection. The session
//! owns at most one link at a time and never reaches around these traits, so
//! any STOMP client (or an in-memory fake in tests) can sit underneath it.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConnectHeaders;
use crate::frame::Frame;

pub mod stomp;

/// Header list passed to transport primitives, in wire order.
pub type Headers = [(String, String)];

/// Errors reported by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O-level error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Protocol-level error
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The broker answered with an ERROR frame
    #[error("server rejected request: {0}")]
    ServerRejected(String),
    /// Receipt timeout error
    #[error("receipt timeout: no RECEIPT received for '{0}' within timeout")]
    ReceiptTimeout(String),
    /// The broker URI names a scheme this transport cannot speak
    #[error("unsupported broker uri '{0}'")]
    UnsupportedScheme(String),
    /// The link was already closed
    #[error("connection closed")]
    Closed,
}

/// Opens links to individual brokers.
#[async_trait]
pub trait Connector: Send + Sync {
    type Link: Link;

    /// Connect and log in to the broker at `uri`.
    ///
    /// `headers` are sent with the CONNECT frame and always carry
    /// `accept-version`.
    async fn open(
        &self,
        uri: &str,
        login: &str,
        passcode: &str,
        headers: &ConnectHeaders,
    ) -> Result<Self::Link, TransportError>;
}

/// One open connection to a broker.
///
/// All calls are sequential; the session never issues two at once.
#[async_trait]
pub trait Link: Send + 'static {
    /// Send a message. A `receipt` header in `headers` asks the broker for
    /// confirmation and the call only succeeds once the RECEIPT arrives.
    async fn send(
        &mut self,
        destination: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), TransportError>;

    /// Register a subscription; `headers` carry `id`, `ack` and extras.
    async fn subscribe(&mut self, destination: &str, headers: &Headers)
    -> Result<(), TransportError>;

    /// Drop a subscription; `headers` carry its `id`.
    async fn unsubscribe(
        &mut self,
        destination: &str,
        headers: &Headers,
    ) -> Result<(), TransportError>;

    async fn ack(&mut self, id: &str) -> Result<(), TransportError>;

    async fn nack(&mut self, id: &str) -> Result<(), TransportError>;

    async fn begin(&mut self, transaction: &str) -> Result<(), TransportError>;

    async fn commit(&mut self, transaction: &str) -> Result<(), TransportError>;

    async fn abort(&mut self, transaction: &str) -> Result<(), TransportError>;

    /// Non-blocking: is an inbound frame ready to be read?
    fn has_frame(&mut self) -> bool;

    /// Remove and return the next inbound frame, waiting if none is buffered.
    async fn read_frame(&mut self) -> Result<Frame, TransportError>;

    /// The pending error condition on this link, if any.
    fn error(&self) -> Option<String>;

    /// Close the link. Errors are not reported; the link is unusable after.
    async fn close(&mut self);
}
