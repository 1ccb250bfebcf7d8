//! Failover-aware STOMP 1.2 session manager.
//!
//! A [`SessionAdapter`] keeps one logical broker connection alive across an
//! ordered list of candidate brokers, remembers which queues it is subscribed
//! to, and transparently reconnects and resubscribes when the link dies. The
//! link is checked lazily before each operation; there is no heartbeat task.
//!
//! The session core talks to brokers only through the [`transport::Connector`]
//! and [`transport::Link`] traits. [`StompConnector`] is the bundled
//! implementation for plain TCP brokers.

pub mod address;
pub mod codec;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod frame;
mod id;
pub mod parser;
pub mod session;
pub mod subscription;
pub mod transport;

pub use address::BrokerAddresses;
pub use codec::{StompCodec, StompItem};
pub use config::{ConnectHeaders, DEFAULT_STOMP_VERSION, SessionConfig};
pub use connection::{ConnectionManager, ErrorLog};
pub use delivery::{AckTarget, DeliveryChannel, DeliveryMode};
pub use error::SessionError;
pub use frame::Frame;
pub use session::{SessionAdapter, SessionSnapshot};
pub use subscription::{AckMode, SubscriptionOptions, SubscriptionRegistry, SubscriptionState};
pub use transport::stomp::{StompConnector, StompLink};
pub use transport::{Connector, Link, TransportError};
