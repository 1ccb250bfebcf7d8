//! Broker connection strings.
//!
//! Two forms are understood:
//!
//! - a single broker URI, `tcp://localhost:61613`
//! - an ordered failover list, `failover://(tcp://mq1:61613,tcp://mq2:61613)`
//!
//! Failover candidates are tried left to right, so list order is priority
//! order.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

const FAILOVER_SCHEME: &str = "failover";

/// Ordered, non-empty list of broker URIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct BrokerAddresses(Vec<String>);

fn bad_url(input: &str) -> SessionError {
    SessionError::Configuration(format!(
        "bad broker URL '{}': unsupported scheme or malformed payload",
        input
    ))
}

fn valid_scheme(scheme: &str) -> bool {
    !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn valid_payload(payload: &str) -> bool {
    !payload.is_empty()
        && payload
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b':' | b'/' | b'-' | b'_'))
}

/// Split `scheme://payload`, validating the scheme.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, payload) = uri.split_once("://")?;
    valid_scheme(scheme).then_some((scheme, payload))
}

/// A single broker URI: any scheme but `failover`, restricted payload.
fn single_uri(uri: &str) -> Option<&str> {
    let (scheme, payload) = split_scheme(uri)?;
    (!scheme.eq_ignore_ascii_case(FAILOVER_SCHEME) && valid_payload(payload)).then_some(uri)
}

impl BrokerAddresses {
    /// Parse a connection string into its candidate broker URIs.
    ///
    /// # Errors
    ///
    /// `SessionError::Configuration` for anything that is not a single URI or
    /// a failover list of single URIs, and for an empty failover list.
    pub fn parse(input: &str) -> Result<Self, SessionError> {
        let trimmed = input.trim();
        let (scheme, payload) = split_scheme(trimmed).ok_or_else(|| bad_url(input))?;

        if !scheme.eq_ignore_ascii_case(FAILOVER_SCHEME) {
            let uri = single_uri(trimmed).ok_or_else(|| bad_url(input))?;
            return Ok(Self(vec![uri.to_string()]));
        }

        let inner = match (payload.strip_prefix('('), payload.strip_suffix(')')) {
            (Some(_), Some(_)) => &payload[1..payload.len() - 1],
            (None, None) => payload,
            _ => return Err(bad_url(input)),
        };

        let hosts = inner
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| single_uri(part).map(str::to_string).ok_or_else(|| bad_url(input)))
            .collect::<Result<Vec<_>, _>>()?;

        Self::try_from(hosts).map_err(|_| {
            SessionError::Configuration(format!("broker URL '{}' lists no hosts", input))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for BrokerAddresses {
    type Error = SessionError;

    fn try_from(hosts: Vec<String>) -> Result<Self, Self::Error> {
        if hosts.is_empty() {
            return Err(SessionError::Configuration(
                "broker host list is empty".to_string(),
            ));
        }
        Ok(Self(hosts))
    }
}

impl From<BrokerAddresses> for Vec<String> {
    fn from(addresses: BrokerAddresses) -> Self {
        addresses.0
    }
}

impl std::str::FromStr for BrokerAddresses {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
