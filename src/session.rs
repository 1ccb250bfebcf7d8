//! The public face of the crate.
//!
//! `SessionAdapter` composes the connection manager, the subscription
//! registry and the delivery channel. Every operation that reaches the broker
//! checks the link first and, if it is missing or errored, reconnects and
//! restores subscriptions before going on. Callers therefore never see a bare
//! disconnect: only extra latency, or an error once every broker failed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::address::BrokerAddresses;
use crate::config::{ConnectHeaders, SessionConfig};
use crate::connection::{ConnectionManager, ErrorLog};
use crate::delivery::{AckTarget, DeliveryChannel, DeliveryMode};
use crate::error::SessionError;
use crate::frame::Frame;
use crate::subscription::{
    SubscriptionOptions, SubscriptionRegistry, SubscriptionState, SubscriptionTable,
};
use crate::transport::Connector;
use crate::transport::Link;
use crate::transport::stomp::StompConnector;

/// Serializable session state.
///
/// Carries everything needed to rebuild an adapter in another process except
/// the broker link itself, which [`SessionAdapter::restore`] re-establishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub hosts: BrokerAddresses,
    pub login: String,
    pub passcode: String,
    pub headers: ConnectHeaders,
    /// Error log of the last connect pass
    pub errors: ErrorLog,
    pub subscriptions: SubscriptionTable,
    /// Queues a failed reconnect still has to restore
    #[serde(default)]
    pub pending_restore: BTreeSet<String>,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default)]
    pub subscription_options: SubscriptionOptions,
}

/// A self-healing STOMP session.
///
/// One adapter serves one caller: every operation takes `&mut self`. Share it
/// between tasks only behind your own mutex, or give each worker its own.
///
/// ```no_run
/// use stomp_session::{SessionAdapter, SessionConfig};
///
/// # async fn run() -> Result<(), stomp_session::SessionError> {
/// let config = SessionConfig::new("failover://(tcp://mq1:61613,tcp://mq2:61613)")
///     .credentials("guest", "guest");
/// let mut session = SessionAdapter::open(config).await?;
///
/// session.subscribe("/queue/orders").await?;
/// session.send("/queue/audit", "order received", &[]).await?;
/// if let Some(frame) = session.get_next_message().await? {
///     session.ack(&frame).await?;
/// }
/// session.close().await;
/// # Ok(())
/// # }
/// ```
pub struct SessionAdapter<C: Connector = StompConnector> {
    connection: ConnectionManager<C>,
    subscriptions: SubscriptionRegistry,
    delivery: DeliveryChannel,
}

impl SessionAdapter<StompConnector> {
    /// Build a session over the bundled TCP transport and connect it.
    pub async fn open(config: SessionConfig) -> Result<Self, SessionError> {
        Self::with_connector(config, StompConnector::default()).await
    }
}

impl<C: Connector> SessionAdapter<C> {
    /// Build a session over `connector` and connect it.
    ///
    /// # Errors
    ///
    /// `SessionError::Configuration` for a bad connection string, or
    /// `SessionError::Connection` when no broker accepts the connection.
    pub async fn with_connector(config: SessionConfig, connector: C) -> Result<Self, SessionError> {
        let hosts = BrokerAddresses::parse(&config.url)?;
        let mut session = Self {
            connection: ConnectionManager::new(
                connector,
                hosts,
                config.login,
                config.passcode,
                config.headers,
            ),
            subscriptions: SubscriptionRegistry::new(config.subscription),
            delivery: DeliveryChannel::new(config.delivery),
        };
        session.check_connection().await?;
        Ok(session)
    }

    /// Rebuild a session from a snapshot and reconnect it, restoring every
    /// subscription the snapshot shows as active.
    pub async fn restore(snapshot: SessionSnapshot, connector: C) -> Result<Self, SessionError> {
        let mut session = Self {
            connection: ConnectionManager::new(
                connector,
                snapshot.hosts,
                snapshot.login,
                snapshot.passcode,
                snapshot.headers,
            )
            .with_errors(snapshot.errors),
            subscriptions: SubscriptionRegistry::from_parts(
                snapshot.subscriptions,
                snapshot.pending_restore,
                snapshot.subscription_options,
            ),
            delivery: DeliveryChannel::new(snapshot.delivery),
        };
        session.check_connection().await?;
        Ok(session)
    }

    /// Capture the serializable state. The live link is not part of it.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            hosts: self.connection.hosts().clone(),
            login: self.connection.login().to_string(),
            passcode: self.connection.passcode().to_string(),
            headers: self.connection.headers().clone(),
            errors: self.connection.last_errors().to_vec(),
            subscriptions: self.subscriptions.table().clone(),
            pending_restore: self.subscriptions.pending_restore().clone(),
            delivery: self.delivery.mode(),
            subscription_options: self.subscriptions.options().clone(),
        }
    }

    /// Send `body` to `destination` under the configured delivery mode.
    ///
    /// # Errors
    ///
    /// `SessionError::Delivery` when the broker did not confirm the message,
    /// or a connection error from the preceding link check.
    pub async fn send(
        &mut self,
        destination: &str,
        body: impl AsRef<[u8]>,
        headers: &[(String, String)],
    ) -> Result<(), SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.delivery
            .send(link, destination, body.as_ref(), headers)
            .await
    }

    /// The next received frame, or `None` when nothing is waiting.
    pub async fn get_next_message(&mut self) -> Result<Option<Frame>, SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.delivery.next_message(link).await
    }

    /// Acknowledge a frame or a bare ack id.
    ///
    /// The outer `Result` only fails when the link could not be
    /// re-established; a refused ACK is reported as `Ok(false)`.
    pub async fn ack<'a>(&mut self, target: impl Into<AckTarget<'a>>) -> Result<bool, SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        Ok(self.delivery.ack(link, target.into()).await)
    }

    /// Negatively acknowledge a frame or a bare ack id. See [`Self::ack`].
    pub async fn nack<'a>(&mut self, target: impl Into<AckTarget<'a>>) -> Result<bool, SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        Ok(self.delivery.nack(link, target.into()).await)
    }

    /// Subscribe to `queue`, returning its subscription id. Idempotent.
    pub async fn subscribe(&mut self, queue: &str) -> Result<String, SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.subscriptions.subscribe(link, queue).await
    }

    /// Unsubscribe from `queue`; it stays known but inactive.
    pub async fn unsubscribe(&mut self, queue: &str) -> Result<(), SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.subscriptions.unsubscribe(link, queue).await
    }

    /// Subscribe every known queue that is currently inactive.
    pub async fn subscribe_all(&mut self) -> Result<(), SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.subscriptions.subscribe_all(link).await
    }

    pub async fn unsubscribe_all(&mut self) -> Result<(), SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.subscriptions.unsubscribe_all(link).await
    }

    /// Unsubscribe everything and forget every known queue.
    pub async fn clear_subscribes(&mut self) -> Result<(), SessionError> {
        self.check_connection().await?;
        let link = self.connection.link_mut()?;
        self.subscriptions.clear_subscribes(link).await
    }

    /// Connect to the first broker that accepts, replacing any current link.
    ///
    /// Subscriptions on a replaced link are dropped, not restored; use
    /// [`Self::reconnect`] to keep them.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.connection.is_connected() || self.connection.link_error().is_some() {
            self.connection.disconnect(&mut self.subscriptions).await;
        }
        self.connection.connect().await
    }

    /// Unsubscribe everything and close the link.
    pub async fn disconnect(&mut self) {
        self.connection.disconnect(&mut self.subscriptions).await;
    }

    /// Reconnect and restore the subscriptions active before the call.
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        self.connection.reconnect(&mut self.subscriptions).await
    }

    /// Reconnect only if the link is missing or reports an error.
    pub async fn check_connection(&mut self) -> Result<(), SessionError> {
        self.connection
            .check_connection(&mut self.subscriptions)
            .await
    }

    /// Unsubscribe, close the link and consume the session.
    pub async fn close(mut self) {
        self.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn hosts(&self) -> &BrokerAddresses {
        self.connection.hosts()
    }

    /// `(host, reason)` pairs from the most recent connect pass.
    pub fn last_errors(&self) -> &[(String, String)] {
        self.connection.last_errors()
    }

    pub fn subscription_state(&self, queue: &str) -> Option<&SubscriptionState> {
        self.subscriptions.state(queue)
    }

    pub fn active_queues(&self) -> Vec<String> {
        self.subscriptions.active_queues()
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery.mode()
    }
}

impl<C: Connector> Drop for SessionAdapter<C> {
    /// Release the broker link if the session was not closed explicitly.
    ///
    /// Inside a tokio runtime the unsubscribe + close runs on a spawned task;
    /// otherwise dropping the link closes its socket.
    fn drop(&mut self) {
        let Some(mut link) = self.connection.take_link() else {
            return;
        };
        let active: Vec<(String, String)> = self
            .subscriptions
            .table()
            .iter()
            .filter_map(|(queue, state)| state.id().map(|id| (queue.clone(), id.to_string())))
            .collect();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (queue, id) in active {
                        let _ = link.unsubscribe(&queue, &[("id".to_string(), id)]).await;
                    }
                    link.close().await;
                });
            }
            Err(_) => debug!("no async runtime, dropping broker link without unsubscribing"),
        }
    }
}
