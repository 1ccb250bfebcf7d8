//! Queue subscription bookkeeping.
//!
//! The registry remembers every queue the caller ever subscribed to and
//! whether that subscription is currently registered with the broker. It
//! never owns the link: every operation that talks to the broker borrows it
//! from the connection manager for the duration of the call.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::id::next_id;
use crate::transport::Link;

/// Subscription acknowledgement modes as defined by STOMP 1.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AckMode {
    Auto,
    Client,
    #[default]
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

/// Options applied to every SUBSCRIBE the registry sends.
///
/// The defaults ask for `client-individual` acknowledgement and a prefetch
/// of one, so at most one unacknowledged message per subscription is in
/// flight and a crash redelivers at most that message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    pub ack: AckMode,
    /// Value of `activemq.prefetchSize`; `None` omits the header.
    pub prefetch: Option<u32>,
    /// Extra headers appended to every SUBSCRIBE frame.
    pub headers: Vec<(String, String)>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            ack: AckMode::ClientIndividual,
            prefetch: Some(1),
            headers: Vec::new(),
        }
    }
}

/// Whether a queue is currently registered with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Inactive,
    /// Registered under the given subscription id.
    Active(String),
}

impl SubscriptionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionState::Active(_))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            SubscriptionState::Active(id) => Some(id),
            SubscriptionState::Inactive => None,
        }
    }
}

/// Queue name -> subscription state. Entries are only removed by
/// [`SubscriptionRegistry::clear_subscribes`].
pub type SubscriptionTable = BTreeMap<String, SubscriptionState>;

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    table: SubscriptionTable,
    /// Queues a failed reconnect still owes a resubscribe.
    pending_restore: BTreeSet<String>,
    options: SubscriptionOptions,
}

impl SubscriptionRegistry {
    pub fn new(options: SubscriptionOptions) -> Self {
        Self {
            table: BTreeMap::new(),
            pending_restore: BTreeSet::new(),
            options,
        }
    }

    /// Rebuild a registry from snapshotted parts.
    pub(crate) fn from_parts(
        table: SubscriptionTable,
        pending_restore: BTreeSet<String>,
        options: SubscriptionOptions,
    ) -> Self {
        Self {
            table,
            pending_restore,
            options,
        }
    }

    fn subscribe_headers(&self, id: &str) -> Vec<(String, String)> {
        let mut headers = vec![
            ("id".to_string(), id.to_string()),
            ("ack".to_string(), self.options.ack.as_str().to_string()),
        ];
        if let Some(prefetch) = self.options.prefetch {
            headers.push(("activemq.prefetchSize".to_string(), prefetch.to_string()));
        }
        headers.extend(self.options.headers.iter().cloned());
        headers
    }

    /// Subscribe to `queue` unless it is already active.
    ///
    /// Returns the subscription id, which is the existing one when the queue
    /// was already active; in that case nothing is sent to the broker.
    pub async fn subscribe<L: Link>(
        &mut self,
        link: &mut L,
        queue: &str,
    ) -> Result<String, SessionError> {
        if let Some(SubscriptionState::Active(id)) = self.table.get(queue) {
            return Ok(id.clone());
        }

        let id = next_id("client");
        link.subscribe(queue, &self.subscribe_headers(&id)).await?;
        debug!(queue, id = %id, "subscribed");

        self.pending_restore.remove(queue);
        self.table
            .insert(queue.to_string(), SubscriptionState::Active(id.clone()));
        Ok(id)
    }

    /// Unsubscribe from `queue`, keeping its entry as `Inactive`.
    ///
    /// A queue that is unknown or already inactive is left alone. Either way
    /// the queue will not be restored by a later reconnect.
    pub async fn unsubscribe<L: Link>(
        &mut self,
        link: &mut L,
        queue: &str,
    ) -> Result<(), SessionError> {
        self.pending_restore.remove(queue);
        let Some(SubscriptionState::Active(id)) = self.table.get(queue) else {
            return Ok(());
        };

        let headers = [("id".to_string(), id.clone())];
        link.unsubscribe(queue, &headers).await?;
        debug!(queue, id = %id, "unsubscribed");

        self.table
            .insert(queue.to_string(), SubscriptionState::Inactive);
        Ok(())
    }

    /// Subscribe every inactive entry.
    pub async fn subscribe_all<L: Link>(&mut self, link: &mut L) -> Result<(), SessionError> {
        for queue in self.queues_where(|s| !s.is_active()) {
            self.subscribe(link, &queue).await?;
        }
        Ok(())
    }

    /// Unsubscribe every active entry.
    pub async fn unsubscribe_all<L: Link>(&mut self, link: &mut L) -> Result<(), SessionError> {
        for queue in self.queues_where(SubscriptionState::is_active) {
            self.unsubscribe(link, &queue).await?;
        }
        Ok(())
    }

    /// Unsubscribe everything and forget every queue.
    pub async fn clear_subscribes<L: Link>(&mut self, link: &mut L) -> Result<(), SessionError> {
        self.unsubscribe_all(link).await?;
        self.table.clear();
        self.pending_restore.clear();
        Ok(())
    }

    /// Mark every active entry inactive ahead of tearing the link down.
    ///
    /// With a link, each subscription is unsubscribed first. Failures are
    /// logged rather than returned because the link is going away anyway.
    pub(crate) async fn release_all<L: Link>(&mut self, mut link: Option<&mut L>) {
        for queue in self.queues_where(SubscriptionState::is_active) {
            let Some(SubscriptionState::Active(id)) = self
                .table
                .insert(queue.clone(), SubscriptionState::Inactive)
            else {
                continue;
            };
            if let Some(link) = link.as_deref_mut() {
                let headers = [("id".to_string(), id.clone())];
                if let Err(e) = link.unsubscribe(&queue, &headers).await {
                    warn!(queue = %queue, id = %id, error = %e, "unsubscribe failed during disconnect");
                }
            }
        }
    }

    /// Queues to restore after a reconnect: everything active right now plus
    /// anything an earlier failed reconnect still owes.
    pub(crate) fn restore_set(&self) -> BTreeSet<String> {
        self.queues_where(SubscriptionState::is_active)
            .into_iter()
            .chain(self.pending_restore.iter().cloned())
            .collect()
    }

    pub(crate) fn set_pending_restore(&mut self, queues: BTreeSet<String>) {
        self.pending_restore = queues;
    }

    pub(crate) fn pending_restore(&self) -> &BTreeSet<String> {
        &self.pending_restore
    }

    fn queues_where(&self, pred: impl Fn(&SubscriptionState) -> bool) -> Vec<String> {
        self.table
            .iter()
            .filter(|(_, state)| pred(state))
            .map(|(queue, _)| queue.clone())
            .collect()
    }

    pub fn state(&self, queue: &str) -> Option<&SubscriptionState> {
        self.table.get(queue)
    }

    pub fn active_queues(&self) -> Vec<String> {
        self.queues_where(SubscriptionState::is_active)
    }

    pub fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    pub fn options(&self) -> &SubscriptionOptions {
        &self.options
    }
}
