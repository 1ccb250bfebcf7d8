use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryMode;
use crate::subscription::SubscriptionOptions;

/// STOMP protocol version requested when the caller does not choose one.
pub const DEFAULT_STOMP_VERSION: &str = "1.2";

/// Headers sent with every CONNECT frame.
///
/// Always contains `accept-version`. Inserting a header that already exists
/// replaces its value in place; new headers are appended, so the wire order
/// is stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectHeaders(Vec<(String, String)>);

impl Default for ConnectHeaders {
    fn default() -> Self {
        Self(vec![(
            "accept-version".to_string(),
            DEFAULT_STOMP_VERSION.to_string(),
        )])
    }
}

impl ConnectHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override or extend with `key: value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    /// Defaults merged with `overrides`, later entries winning.
    pub fn merged<I, K, V>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut headers = Self::default();
        for (k, v) in overrides {
            headers.insert(k, v);
        }
        headers
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Everything needed to build a `SessionAdapter`.
///
/// ```
/// use stomp_session::{DeliveryMode, SessionConfig};
///
/// let config = SessionConfig::new("failover://(tcp://mq1:61613,tcp://mq2:61613)")
///     .credentials("guest", "guest")
///     .header("host", "/")
///     .delivery_mode(DeliveryMode::Transactional);
/// assert_eq!(config.headers.get("accept-version"), Some("1.2"));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Connection string, `scheme://payload` or `failover://(uri,...)`
    pub url: String,
    pub login: String,
    pub passcode: String,
    /// CONNECT headers, defaults merged with caller overrides
    pub headers: ConnectHeaders,
    /// Delivery contract used by `send`
    pub delivery: DeliveryMode,
    /// Headers and ack mode used for every SUBSCRIBE
    pub subscription: SubscriptionOptions,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            login: String::new(),
            passcode: String::new(),
            headers: ConnectHeaders::default(),
            delivery: DeliveryMode::default(),
            subscription: SubscriptionOptions::default(),
        }
    }

    pub fn credentials(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.login = login.into();
        self.passcode = passcode.into();
        self
    }

    /// Override or add a CONNECT header (builder style).
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery = mode;
        self
    }

    pub fn subscription_options(mut self, options: SubscriptionOptions) -> Self {
        self.subscription = options;
        self
    }
}
