//! In-memory broker used by the session integration tests.
//!
//! `MockConnector` records every transport call, can refuse individual hosts,
//! break the current link, queue inbound frames and inject failures for
//! sends, commits, acks and individual subscriptions.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use stomp_session::{ConnectHeaders, Connector, Frame, Link, SessionConfig, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    Send {
        link: usize,
        destination: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Subscribe {
        link: usize,
        destination: String,
        headers: Vec<(String, String)>,
    },
    Unsubscribe {
        link: usize,
        destination: String,
        id: String,
    },
    Ack { link: usize, id: String },
    Nack { link: usize, id: String },
    Begin { link: usize, transaction: String },
    Commit { link: usize, transaction: String },
    Abort { link: usize, transaction: String },
    Close { link: usize },
}

#[derive(Default)]
struct LinkSlot {
    error: Option<String>,
    inbound: VecDeque<Frame>,
}

#[derive(Default)]
struct Broker {
    calls: Vec<Call>,
    refused: HashMap<String, String>,
    links: Vec<LinkSlot>,
    connect_headers: Vec<ConnectHeaders>,
    fail_sends: Option<String>,
    fail_commits: Option<String>,
    fail_acks: bool,
    fail_subscribes: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    broker: Arc<Mutex<Broker>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail for `host` with `reason`.
    pub fn refuse(&self, host: &str, reason: &str) {
        self.broker
            .lock()
            .refused
            .insert(host.to_string(), reason.to_string());
    }

    pub fn accept(&self, host: &str) {
        self.broker.lock().refused.remove(host);
    }

    /// Put the most recently opened link into an errored state.
    pub fn break_link(&self, reason: &str) {
        let mut broker = self.broker.lock();
        if let Some(slot) = broker.links.last_mut() {
            slot.error = Some(reason.to_string());
        }
    }

    /// Queue `frame` for the most recently opened link.
    pub fn deliver(&self, frame: Frame) {
        let mut broker = self.broker.lock();
        if let Some(slot) = broker.links.last_mut() {
            slot.inbound.push_back(frame);
        }
    }

    pub fn fail_sends(&self, reason: Option<&str>) {
        self.broker.lock().fail_sends = reason.map(str::to_string);
    }

    pub fn fail_commits(&self, reason: Option<&str>) {
        self.broker.lock().fail_commits = reason.map(str::to_string);
    }

    pub fn fail_acks(&self, fail: bool) {
        self.broker.lock().fail_acks = fail;
    }

    /// Make SUBSCRIBE to `destination` fail until `fail` is cleared.
    pub fn fail_subscribe(&self, destination: &str, fail: bool) {
        let mut broker = self.broker.lock();
        if fail {
            broker.fail_subscribes.insert(destination.to_string());
        } else {
            broker.fail_subscribes.remove(destination);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.broker.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.broker.lock().calls.clear();
    }

    /// Hosts passed to `open`, in call order.
    pub fn opens(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Open(host) => Some(host),
                _ => None,
            })
            .collect()
    }

    pub fn subscribes(&self, destination: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Subscribe { destination: d, .. } if d == destination))
            .count()
    }

    pub fn unsubscribes(&self, destination: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Unsubscribe { destination: d, .. } if d == destination))
            .count()
    }

    pub fn links_opened(&self) -> usize {
        self.broker.lock().links.len()
    }

    pub fn last_connect_headers(&self) -> Option<ConnectHeaders> {
        self.broker.lock().connect_headers.last().cloned()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Link = MockLink;

    async fn open(
        &self,
        uri: &str,
        _login: &str,
        _passcode: &str,
        headers: &ConnectHeaders,
    ) -> Result<MockLink, TransportError> {
        let mut broker = self.broker.lock();
        broker.calls.push(Call::Open(uri.to_string()));
        if let Some(reason) = broker.refused.get(uri) {
            return Err(TransportError::Protocol(reason.clone()));
        }
        broker.connect_headers.push(headers.clone());
        broker.links.push(LinkSlot::default());
        Ok(MockLink {
            id: broker.links.len() - 1,
            broker: self.broker.clone(),
        })
    }
}

pub struct MockLink {
    id: usize,
    broker: Arc<Mutex<Broker>>,
}

impl MockLink {
    fn record(&self, call: Call) {
        self.broker.lock().calls.push(call);
    }
}

#[async_trait]
impl Link for MockLink {
    async fn send(
        &mut self,
        destination: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<(), TransportError> {
        self.record(Call::Send {
            link: self.id,
            destination: destination.to_string(),
            headers: headers.to_vec(),
            body: body.to_vec(),
        });
        match self.broker.lock().fail_sends.clone() {
            Some(reason) => Err(TransportError::ServerRejected(reason)),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &mut self,
        destination: &str,
        headers: &[(String, String)],
    ) -> Result<(), TransportError> {
        self.record(Call::Subscribe {
            link: self.id,
            destination: destination.to_string(),
            headers: headers.to_vec(),
        });
        if self.broker.lock().fail_subscribes.contains(destination) {
            return Err(TransportError::ServerRejected(format!(
                "subscription to {} refused",
                destination
            )));
        }
        Ok(())
    }

    async fn unsubscribe(
        &mut self,
        destination: &str,
        headers: &[(String, String)],
    ) -> Result<(), TransportError> {
        let id = headers
            .iter()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.record(Call::Unsubscribe {
            link: self.id,
            destination: destination.to_string(),
            id,
        });
        match self.error() {
            Some(reason) => Err(TransportError::Protocol(reason)),
            None => Ok(()),
        }
    }

    async fn ack(&mut self, id: &str) -> Result<(), TransportError> {
        self.record(Call::Ack {
            link: self.id,
            id: id.to_string(),
        });
        if self.broker.lock().fail_acks {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn nack(&mut self, id: &str) -> Result<(), TransportError> {
        self.record(Call::Nack {
            link: self.id,
            id: id.to_string(),
        });
        if self.broker.lock().fail_acks {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn begin(&mut self, transaction: &str) -> Result<(), TransportError> {
        self.record(Call::Begin {
            link: self.id,
            transaction: transaction.to_string(),
        });
        Ok(())
    }

    async fn commit(&mut self, transaction: &str) -> Result<(), TransportError> {
        self.record(Call::Commit {
            link: self.id,
            transaction: transaction.to_string(),
        });
        match self.broker.lock().fail_commits.clone() {
            Some(reason) => Err(TransportError::ServerRejected(reason)),
            None => Ok(()),
        }
    }

    async fn abort(&mut self, transaction: &str) -> Result<(), TransportError> {
        self.record(Call::Abort {
            link: self.id,
            transaction: transaction.to_string(),
        });
        Ok(())
    }

    fn has_frame(&mut self) -> bool {
        !self.broker.lock().links[self.id].inbound.is_empty()
    }

    async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        self.broker.lock().links[self.id]
            .inbound
            .pop_front()
            .ok_or(TransportError::Closed)
    }

    fn error(&self) -> Option<String> {
        self.broker.lock().links[self.id].error.clone()
    }

    async fn close(&mut self) {
        self.record(Call::Close { link: self.id });
    }
}

pub fn config(url: &str) -> SessionConfig {
    SessionConfig::new(url).credentials("guest", "guest")
}

pub fn header<'a>(headers: &'a [(String, String)], key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
