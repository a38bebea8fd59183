//! Configuration for the gateway client.
//!
//! The collaborator (UI shell) constructs one `ClientConfig` and passes it
//! to [`GatewayClient::spawn`](crate::GatewayClient::spawn). Endpoint and
//! bearer token live here rather than being threaded through every call.

use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::session::SessionKey;
use crate::wire::ClientInfo;

/// Default timeout for socket open + liveness probe
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for challenge wait + handshake response
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for an in-flight request slot
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gateway client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway endpoint. `http`/`https` schemes are rewritten to `ws`/`wss`;
    /// a bare host defaults to `wss`.
    pub endpoint: String,

    /// Bearer token sent in the `connect` request's auth block
    pub token: Option<String>,

    /// Companion channel name (the `<companion>` in `app:<companion>:main`)
    pub companion: String,

    /// Static client descriptor sent during the handshake
    pub client: ClientInfo,

    /// Requested role (e.g. "operator")
    pub role: String,

    /// Requested scopes, in the order they are signed
    pub scopes: Vec<String>,

    /// Locale reported in the handshake
    pub locale: String,

    /// User agent reported in the handshake
    pub user_agent: String,

    /// Alert feed session keys to subscribe (`agent:main:<channel>:<id>`)
    pub alert_feeds: Vec<String>,

    /// Completed alert messages equal to this marker (case-insensitive,
    /// after trim) are acknowledgment-only and dropped from the queue
    pub ack_marker: String,

    /// Timeout for socket open + liveness probe
    pub connect_timeout: Duration,

    /// Timeout for challenge wait + handshake response
    pub handshake_timeout: Duration,

    /// Timeout for each in-flight request
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a config for the given gateway endpoint and companion channel,
    /// with defaults for everything else.
    pub fn new(endpoint: impl Into<String>, companion: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            companion: companion.into(),
            client: ClientInfo::default(),
            role: "operator".to_string(),
            scopes: vec!["operator.read".to_string(), "operator.write".to_string()],
            locale: "en-US".to_string(),
            user_agent: format!("knock/{}", env!("CARGO_PKG_VERSION")),
            alert_feeds: Vec::new(),
            ack_marker: "ACK".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the alert feed session keys to subscribe.
    pub fn with_alert_feeds(mut self, feeds: Vec<String>) -> Self {
        self.alert_feeds = feeds;
        self
    }

    /// Set the client descriptor.
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// The endpoint with its scheme normalized for WebSocket dialing.
    ///
    /// e.g. "http://gw.local:9000" -> "ws://gw.local:9000"
    ///      "gw.example.com"       -> "wss://gw.example.com"
    pub fn normalized_endpoint(&self) -> String {
        let trimmed = self.endpoint.trim();
        if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else {
            format!("wss://{trimmed}")
        }
    }

    /// The foreground chat session key for this companion.
    pub fn companion_session_key(&self) -> SessionKey {
        SessionKey::companion_main(&self.companion)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(GatewayError::Config("endpoint must not be empty".into()));
        }
        if self.companion.trim().is_empty() || self.companion.contains(':') {
            return Err(GatewayError::Config(format!(
                "invalid companion channel name: {:?}",
                self.companion
            )));
        }
        if self.role.trim().is_empty() {
            return Err(GatewayError::Config("role must not be empty".into()));
        }
        for feed in &self.alert_feeds {
            match feed.parse::<SessionKey>() {
                Ok(SessionKey::AlertFeed { .. }) => {}
                Ok(other) => {
                    return Err(GatewayError::Config(format!(
                        "alert feed {feed:?} is not an alert session key (parsed as {other})"
                    )));
                }
                Err(e) => {
                    return Err(GatewayError::Config(format!(
                        "invalid alert feed {feed:?}: {e}"
                    )));
                }
            }
        }
        Ok(())
    }
}
