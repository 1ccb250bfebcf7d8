use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::address::BrokerAddresses;
use crate::config::ConnectHeaders;
use crate::error::SessionError;
use crate::subscription::SubscriptionRegistry;
use crate::transport::{Connector, Link, TransportError};

/// `(host, reason)` pairs collected during the most recent connect pass.
pub type ErrorLog = Vec<(String, String)>;

/// Owns the single broker link and everything needed to re-establish it.
///
/// The link is only reachable through the manager. It is in one of three
/// states: absent, live, or errored (present, but the transport reports a
/// pending error). Health is checked lazily by [`check_connection`], which
/// callers run before touching the link; there is no background heartbeat.
///
/// [`check_connection`]: ConnectionManager::check_connection
pub struct ConnectionManager<C: Connector> {
    connector: C,
    hosts: BrokerAddresses,
    login: String,
    passcode: String,
    headers: ConnectHeaders,
    link: Option<C::Link>,
    errors: ErrorLog,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        hosts: BrokerAddresses,
        login: impl Into<String>,
        passcode: impl Into<String>,
        headers: ConnectHeaders,
    ) -> Self {
        Self {
            connector,
            hosts,
            login: login.into(),
            passcode: passcode.into(),
            headers,
            link: None,
            errors: Vec::new(),
        }
    }

    pub(crate) fn with_errors(mut self, errors: ErrorLog) -> Self {
        self.errors = errors;
        self
    }

    /// Try every broker in priority order and keep the first link that opens.
    ///
    /// Resets the error log, then records one `(host, reason)` entry per
    /// failed host. Hosts after the first success are never contacted.
    ///
    /// # Errors
    ///
    /// `SessionError::Connection` listing every host-tagged failure when no
    /// broker accepted the connection.
    pub(crate) async fn connect(&mut self) -> Result<(), SessionError> {
        self.errors.clear();
        if let Some(mut stale) = self.link.take() {
            debug!("closing previous link before connecting");
            stale.close().await;
        }

        for host in self.hosts.iter() {
            debug!(host, "connecting");
            match self
                .connector
                .open(host, &self.login, &self.passcode, &self.headers)
                .await
            {
                Ok(link) => {
                    info!(host, "connected to broker");
                    self.link = Some(link);
                    return Ok(());
                }
                Err(e) => {
                    warn!(host, error = %e, "broker connection failed");
                    self.errors.push((host.to_string(), e.to_string()));
                }
            }
        }

        let reasons = if self.errors.is_empty() {
            "no broker host was attempted".to_string()
        } else {
            self.errors
                .iter()
                .map(|(host, reason)| format!("[{}]: {}", host, reason))
                .collect::<Vec<_>>()
                .join("; ")
        };
        Err(SessionError::Connection(format!(
            "could not connect to broker by provided hosts: {}",
            reasons
        )))
    }

    /// Unsubscribe everything that is active, then close and drop the link.
    ///
    /// Every subscription ends up `Inactive`, so nothing is resubscribed
    /// later unless the caller asks for it again.
    pub async fn disconnect(&mut self, registry: &mut SubscriptionRegistry) {
        registry.release_all(self.link.as_mut()).await;
        registry.set_pending_restore(BTreeSet::new());
        if let Some(mut link) = self.link.take() {
            link.close().await;
            info!("disconnected from broker");
        }
    }

    /// Reconnect unless the link is present and healthy.
    ///
    /// A healthy link still picks up queues a previous reconnect failed to
    /// restore.
    pub async fn check_connection(
        &mut self,
        registry: &mut SubscriptionRegistry,
    ) -> Result<(), SessionError> {
        match self.link.as_ref().map(Link::error) {
            Some(None) => self.restore_pending(registry).await,
            Some(Some(reason)) => {
                warn!(error = %reason, "broker link reported an error, reconnecting");
                self.reconnect(registry).await
            }
            None => {
                debug!("no broker link, connecting");
                self.reconnect(registry).await
            }
        }
    }

    /// Tear the link down, connect again and restore the subscriptions that
    /// were active before the call.
    ///
    /// If connecting fails, the queues still to be restored are remembered
    /// and picked up by the next reconnect. Every queue is tried even when
    /// one of them fails; the first failure is returned and the failed
    /// queues stay pending.
    pub async fn reconnect(
        &mut self,
        registry: &mut SubscriptionRegistry,
    ) -> Result<(), SessionError> {
        let restore = registry.restore_set();
        self.disconnect(registry).await;
        registry.set_pending_restore(restore);

        self.connect().await?;
        self.restore_pending(registry).await
    }

    async fn restore_pending(
        &mut self,
        registry: &mut SubscriptionRegistry,
    ) -> Result<(), SessionError> {
        let pending: Vec<String> = registry.pending_restore().iter().cloned().collect();
        if pending.is_empty() {
            return Ok(());
        }

        let link = self.link_mut()?;
        let mut first_err = None;
        let mut restored = 0;
        for queue in &pending {
            match registry.subscribe(link, queue).await {
                Ok(_) => restored += 1,
                Err(e) => {
                    warn!(queue = %queue, error = %e, "subscription not restored");
                    first_err.get_or_insert(e);
                }
            }
        }
        info!(restored, failed = pending.len() - restored, "subscriptions restored");
        first_err.map_or(Ok(()), Err)
    }

    /// `true` when a link is present and reports no error.
    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.error().is_none())
    }

    /// The pending error on the current link, if any.
    pub fn link_error(&self) -> Option<String> {
        self.link.as_ref().and_then(Link::error)
    }

    /// The current link. Callers run `check_connection` first.
    pub(crate) fn link_mut(&mut self) -> Result<&mut C::Link, SessionError> {
        self.link
            .as_mut()
            .ok_or(SessionError::Transport(TransportError::Closed))
    }

    pub(crate) fn take_link(&mut self) -> Option<C::Link> {
        self.link.take()
    }

    pub fn hosts(&self) -> &BrokerAddresses {
        &self.hosts
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub(crate) fn passcode(&self) -> &str {
        &self.passcode
    }

    pub fn headers(&self) -> &ConnectHeaders {
        &self.headers
    }

    pub fn last_errors(&self) -> &[(String, String)] {
        &self.errors
    }
}
