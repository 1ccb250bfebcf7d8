//! STOMP 1.2 over plain TCP.
//!
//! Each `StompLink` writes frames straight onto the framed socket and runs
//! one reader task that sorts inbound traffic: RECEIPT frames wake the
//! matching sender, ERROR frames and end-of-stream mark the link as errored,
//! everything else is buffered for `read_frame`. SEND frames that carry a
//! receipt and every COMMIT wait for the broker to confirm them. The reader
//! never reconnects; recovery is the session's job.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use url::Url;

use super::{Connector, Headers, Link, TransportError};
use crate::codec::{StompCodec, StompItem};
use crate::config::ConnectHeaders;
use crate::frame::Frame;
use crate::id::next_id;

/// Port used when a broker URI does not name one.
pub const DEFAULT_PORT: u16 = 61613;

/// How long a receipt-confirmed send waits for its RECEIPT by default.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(10);

type FramedStream = Framed<TcpStream, StompCodec>;

/// Outcome delivered to a waiting sender: `Err` carries the broker's message.
type ReceiptResult = Result<(), String>;

/// Opens `StompLink`s to `tcp://host:port` brokers.
#[derive(Debug, Clone)]
pub struct StompConnector {
    receipt_timeout: Duration,
}

impl Default for StompConnector {
    fn default() -> Self {
        Self {
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }
}

impl StompConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a send carrying a `receipt` header waits for the broker.
    pub fn with_receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }

    pub fn receipt_timeout(&self) -> Duration {
        self.receipt_timeout
    }
}

/// Split a broker URI into host and port. Only `tcp` and `stomp` schemes
/// are plain TCP; anything else (notably `ssl`) is rejected.
pub fn socket_address(uri: &str) -> Result<(String, u16), TransportError> {
    let url = Url::parse(uri)
        .map_err(|e| TransportError::Protocol(format!("invalid broker uri '{}': {}", uri, e)))?;
    if !matches!(url.scheme(), "tcp" | "stomp") {
        return Err(TransportError::UnsupportedScheme(uri.to_string()));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| TransportError::Protocol(format!("broker uri '{}' has no host", uri)))?;
    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_PORT)))
}

fn error_message(frame: &Frame) -> String {
    let message = frame.get_header("message").unwrap_or("unknown error");
    match frame.body_str().map(str::trim).filter(|b| !b.is_empty()) {
        Some(body) => format!("{}: {}", message, body),
        None => message.to_string(),
    }
}

/// State shared between a link and its reader task.
#[derive(Default)]
struct LinkState {
    error: Option<String>,
    receipts: HashMap<String, oneshot::Sender<ReceiptResult>>,
}

impl LinkState {
    fn complete_receipt(&mut self, receipt_id: &str, result: ReceiptResult) {
        if let Some(waiter) = self.receipts.remove(receipt_id) {
            let _ = waiter.send(result);
        }
    }

    /// Record the first error and fail every outstanding receipt with it.
    fn fail(&mut self, reason: String) {
        for (_, waiter) in self.receipts.drain() {
            let _ = waiter.send(Err(reason.clone()));
        }
        self.error.get_or_insert(reason);
    }
}

#[async_trait]
impl Connector for StompConnector {
    type Link = StompLink;

    async fn open(
        &self,
        uri: &str,
        login: &str,
        passcode: &str,
        headers: &ConnectHeaders,
    ) -> Result<StompLink, TransportError> {
        let (host, port) = socket_address(uri)?;
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let mut framed = Framed::new(stream, StompCodec::new());

        let mut connect = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", "/")
            .header("heart-beat", "0,0");
        if !login.is_empty() {
            connect.set_header("login", login);
            connect.set_header("passcode", passcode);
        }
        for (k, v) in headers.iter() {
            connect.set_header(k, v);
        }
        framed.send(StompItem::Frame(connect)).await?;

        loop {
            match framed.next().await {
                Some(Ok(StompItem::Heartbeat)) => {}
                Some(Ok(StompItem::Frame(f))) if f.command == "CONNECTED" => {
                    debug!(uri, version = f.get_header("version"), "CONNECTED");
                    break;
                }
                Some(Ok(StompItem::Frame(f))) if f.command == "ERROR" => {
                    return Err(TransportError::ServerRejected(error_message(&f)));
                }
                Some(Ok(StompItem::Frame(f))) => {
                    return Err(TransportError::Protocol(format!(
                        "expected CONNECTED, got {}",
                        f.command
                    )));
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(TransportError::Protocol(
                        "connection closed before CONNECTED".into(),
                    ));
                }
            }
        }

        let (sink, stream) = framed.split();
        // Unbounded: the subscription prefetch limits what can pile up here.
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(LinkState::default()));
        let reader = tokio::spawn(read_loop(stream, inbound_tx, state.clone()));

        Ok(StompLink {
            sink,
            inbound: inbound_rx,
            peeked: None,
            state,
            reader,
            receipt_timeout: self.receipt_timeout,
        })
    }
}

async fn read_loop(
    mut stream: SplitStream<FramedStream>,
    inbound: mpsc::UnboundedSender<Frame>,
    state: Arc<Mutex<LinkState>>,
) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(StompItem::Heartbeat)) => {}
            Some(Ok(StompItem::Frame(f))) => match f.command.as_str() {
                "RECEIPT" => {
                    if let Some(id) = f.get_header("receipt-id") {
                        state.lock().complete_receipt(id, Ok(()));
                    }
                }
                "ERROR" => {
                    // The broker closes the connection after an ERROR frame.
                    let message = error_message(&f);
                    if let Some(id) = f.get_header("receipt-id") {
                        state.lock().complete_receipt(id, Err(message.clone()));
                    }
                    break format!("broker error: {}", message);
                }
                _ => {
                    if inbound.send(f).is_err() {
                        break "link dropped".to_string();
                    }
                }
            },
            Some(Err(e)) => break format!("read failed: {}", e),
            None => break "connection closed by broker".to_string(),
        }
    };
    debug!(reason = %reason, "reader stopped");
    state.lock().fail(reason);
}

/// One open STOMP connection. Created by [`StompConnector`].
pub struct StompLink {
    sink: SplitSink<FramedStream, StompItem>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    /// A frame taken off the channel by `has_frame` but not yet read.
    peeked: Option<Frame>,
    state: Arc<Mutex<LinkState>>,
    reader: JoinHandle<()>,
    receipt_timeout: Duration,
}

impl StompLink {
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        if let Err(e) = self.sink.send(StompItem::Frame(frame)).await {
            self.state.lock().fail(format!("write failed: {}", e));
            return Err(e.into());
        }
        Ok(())
    }

    /// Write `frame` and wait for the RECEIPT named `receipt_id`.
    async fn write_confirmed(&mut self, frame: Frame, receipt_id: &str) -> Result<(), TransportError> {
        if let Some(reason) = self.error() {
            return Err(TransportError::Protocol(reason));
        }
        let rx = {
            let (tx, rx) = oneshot::channel();
            self.state.lock().receipts.insert(receipt_id.to_string(), tx);
            rx
        };

        self.write(frame).await?;

        match tokio::time::timeout(self.receipt_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(TransportError::ServerRejected(message)),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.state.lock().receipts.remove(receipt_id);
                Err(TransportError::ReceiptTimeout(receipt_id.to_string()))
            }
        }
    }

    async fn write_transaction(&mut self, command: &str, transaction: &str) -> Result<(), TransportError> {
        self.write(Frame::new(command).header("transaction", transaction))
            .await
    }
}

#[async_trait]
impl Link for StompLink {
    async fn send(
        &mut self,
        destination: &str,
        body: &[u8],
        headers: &Headers,
    ) -> Result<(), TransportError> {
        let frame = Frame::new("SEND")
            .header("destination", destination)
            .headers(headers.iter().cloned())
            .set_body(body.to_vec());
        match frame.get_header("receipt").map(str::to_string) {
            Some(receipt_id) => self.write_confirmed(frame, &receipt_id).await,
            None => self.write(frame).await,
        }
    }

    async fn subscribe(&mut self, destination: &str, headers: &Headers) -> Result<(), TransportError> {
        let frame = Frame::new("SUBSCRIBE")
            .header("destination", destination)
            .headers(headers.iter().cloned());
        self.write(frame).await
    }

    async fn unsubscribe(
        &mut self,
        destination: &str,
        headers: &Headers,
    ) -> Result<(), TransportError> {
        let mut frame = Frame::new("UNSUBSCRIBE").headers(headers.iter().cloned());
        if !frame.has_header("id") {
            frame.set_header("destination", destination);
        }
        self.write(frame).await
    }

    async fn ack(&mut self, id: &str) -> Result<(), TransportError> {
        self.write(Frame::new("ACK").header("id", id)).await
    }

    async fn nack(&mut self, id: &str) -> Result<(), TransportError> {
        self.write(Frame::new("NACK").header("id", id)).await
    }

    async fn begin(&mut self, transaction: &str) -> Result<(), TransportError> {
        self.write_transaction("BEGIN", transaction).await
    }

    async fn commit(&mut self, transaction: &str) -> Result<(), TransportError> {
        let receipt_id = next_id("commit");
        let frame = Frame::new("COMMIT")
            .header("transaction", transaction)
            .header("receipt", receipt_id.as_str());
        self.write_confirmed(frame, &receipt_id).await
    }

    async fn abort(&mut self, transaction: &str) -> Result<(), TransportError> {
        self.write_transaction("ABORT", transaction).await
    }

    fn has_frame(&mut self) -> bool {
        if self.peeked.is_none() {
            self.peeked = self.inbound.try_recv().ok();
        }
        self.peeked.is_some()
    }

    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        if let Some(frame) = self.peeked.take() {
            return Ok(frame);
        }
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }

    fn error(&self) -> Option<String> {
        // A reader that died without recording a reason still leaves the link unusable.
        self.state.lock().error.clone().or_else(|| {
            self.reader
                .is_finished()
                .then(|| "connection reader stopped".to_string())
        })
    }

    async fn close(&mut self) {
        if self.error().is_none() {
            if let Err(e) = self.sink.send(StompItem::Frame(Frame::new("DISCONNECT"))).await {
                warn!(error = %e, "DISCONNECT not sent");
            }
        }
        let _ = self.sink.close().await;
        self.reader.abort();
        self.state.lock().fail("link closed".to_string());
    }
}

impl Drop for StompLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_address_defaults_port() {
        assert_eq!(
            socket_address("tcp://broker.local").unwrap(),
            ("broker.local".to_string(), DEFAULT_PORT)
        );
        assert_eq!(
            socket_address("stomp://10.0.0.5:61614").unwrap(),
            ("10.0.0.5".to_string(), 61614)
        );
    }

    #[test]
    fn socket_address_rejects_tls() {
        match socket_address("ssl://broker.local:61612") {
            Err(TransportError::UnsupportedScheme(uri)) => assert_eq!(uri, "ssl://broker.local:61612"),
            other => panic!("expected UnsupportedScheme, got {:?}", other),
        }
    }

    #[test]
    fn error_message_includes_body() {
        let f = Frame::new("ERROR")
            .header("message", "Authentication failed")
            .set_body(b"Invalid credentials\n".to_vec());
        assert_eq!(error_message(&f), "Authentication failed: Invalid credentials");
        assert_eq!(error_message(&Frame::new("ERROR")), "unknown error");
    }

    #[test]
    fn failing_state_wakes_receipt_waiters_once() {
        let mut state = LinkState::default();
        let (tx, mut rx) = oneshot::channel();
        state.receipts.insert("r-1".to_string(), tx);
        state.fail("boom".to_string());
        state.fail("later".to_string());
        assert_eq!(rx.try_recv().unwrap(), Err("boom".to_string()));
        assert_eq!(state.error.as_deref(), Some("boom"));
    }
}
