//! Outbound delivery contracts and inbound frame handling.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::frame::Frame;
use crate::id::next_id;
use crate::transport::Link;

/// What a successful `send` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Each SEND carries a `receipt` header and only succeeds once the
    /// broker confirms it. A failure means "not confirmed", not "not sent":
    /// nothing is rolled back.
    #[default]
    Receipt,
    /// Each SEND is wrapped in BEGIN/COMMIT under a fresh transaction id and
    /// aborted on failure. Costs extra round trips, gives all-or-nothing
    /// semantics for the single message.
    Transactional,
}

/// What to acknowledge: a received frame, or a bare ack id.
#[derive(Debug, Clone, Copy)]
pub enum AckTarget<'a> {
    Frame(&'a Frame),
    Id(&'a str),
}

impl AckTarget<'_> {
    /// The id sent in the ACK/NACK `id` header.
    ///
    /// A frame resolves through its `ack` header, falling back to
    /// `message-id`; a bare id is used as given.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            AckTarget::Frame(frame) => frame.ack_id(),
            AckTarget::Id(id) => Some(*id).filter(|id| !id.is_empty()),
        }
    }
}

impl<'a> From<&'a Frame> for AckTarget<'a> {
    fn from(frame: &'a Frame) -> Self {
        AckTarget::Frame(frame)
    }
}

impl<'a> From<&'a str> for AckTarget<'a> {
    fn from(id: &'a str) -> Self {
        AckTarget::Id(id)
    }
}

impl<'a> From<&'a String> for AckTarget<'a> {
    fn from(id: &'a String) -> Self {
        AckTarget::Id(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acknowledgement {
    Ack,
    Nack,
}

/// Sends messages under the configured `DeliveryMode` and handles inbound
/// frames. Borrows the link per call; it never owns one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryChannel {
    mode: DeliveryMode,
}

impl DeliveryChannel {
    pub fn new(mode: DeliveryMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Send `body` to `destination` under the configured contract.
    pub async fn send<L: Link>(
        &self,
        link: &mut L,
        destination: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(), SessionError> {
        match self.mode {
            DeliveryMode::Receipt => self.send_with_receipt(link, destination, body, headers).await,
            DeliveryMode::Transactional => {
                self.send_in_transaction(link, destination, body, headers)
                    .await
            }
        }
    }

    async fn send_with_receipt<L: Link>(
        &self,
        link: &mut L,
        destination: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(), SessionError> {
        let mut headers = headers.to_vec();
        // A caller-chosen receipt id wins.
        if !headers.iter().any(|(k, _)| k == "receipt") {
            headers.push(("receipt".to_string(), next_id("message")));
        }

        link.send(destination, body, &headers).await.map_err(|e| {
            warn!(destination, error = %e, "send was not confirmed");
            SessionError::Delivery(e.to_string())
        })
    }

    async fn send_in_transaction<L: Link>(
        &self,
        link: &mut L,
        destination: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(), SessionError> {
        let tx = next_id("tx");
        link.begin(&tx)
            .await
            .map_err(|e| SessionError::Delivery(e.to_string()))?;

        let mut headers = headers.to_vec();
        headers.retain(|(k, _)| k != "transaction");
        headers.push(("transaction".to_string(), tx.clone()));

        let sent = match link.send(destination, body, &headers).await {
            Ok(()) => link.commit(&tx).await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                debug!(destination, transaction = %tx, "transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(destination, transaction = %tx, error = %e, "send failed, aborting transaction");
                if let Err(abort_err) = link.abort(&tx).await {
                    warn!(transaction = %tx, error = %abort_err, "abort failed");
                }
                Err(SessionError::Delivery(e.to_string()))
            }
        }
    }

    /// Take the next buffered inbound frame without waiting for one.
    pub async fn next_message<L: Link>(&self, link: &mut L) -> Result<Option<Frame>, SessionError> {
        if !link.has_frame() {
            return Ok(None);
        }
        Ok(Some(link.read_frame().await?))
    }

    /// Acknowledge a message. Returns `false` when the id cannot be resolved
    /// or the transport refuses the ACK.
    pub async fn ack<L: Link>(&self, link: &mut L, target: AckTarget<'_>) -> bool {
        self.acknowledge(link, target, Acknowledgement::Ack).await
    }

    /// Negatively acknowledge a message, asking the broker to redeliver it.
    pub async fn nack<L: Link>(&self, link: &mut L, target: AckTarget<'_>) -> bool {
        self.acknowledge(link, target, Acknowledgement::Nack).await
    }

    async fn acknowledge<L: Link>(
        &self,
        link: &mut L,
        target: AckTarget<'_>,
        kind: Acknowledgement,
    ) -> bool {
        let Some(id) = target.resolve() else {
            warn!(?kind, "nothing to acknowledge: frame carries no ack or message-id header");
            return false;
        };
        let result = match kind {
            Acknowledgement::Ack => link.ack(id).await,
            Acknowledgement::Nack => link.nack(id).await,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(?kind, id, error = %e, "acknowledgement failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_target_uses_ack_header() {
        let frame = Frame::new("MESSAGE")
            .header("message-id", "m-1")
            .header("ack", "abc");
        assert_eq!(AckTarget::from(&frame).resolve(), Some("abc"));
    }

    #[test]
    fn bare_id_is_used_directly() {
        assert_eq!(AckTarget::from("xyz").resolve(), Some("xyz"));
        assert_eq!(AckTarget::from("").resolve(), None);
    }

    #[test]
    fn default_mode_is_receipt() {
        assert_eq!(DeliveryChannel::default().mode(), DeliveryMode::Receipt);
    }
}
