//! Typed session keys, event routing, and response aggregation.
//!
//! One physical connection multiplexes several logical sessions. Every
//! inbound `chat`/`agent` event names a session key; the router parses the
//! key once, classifies it as foreground chat, alert feed, or noise, and
//! folds cumulative text snapshots into a buffer until the event stream
//! signals completion.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::wire::{AgentEventPayload, ChatEventPayload, EVENT_AGENT, EVENT_CHAT};

// =============================================================================
// Session keys
// =============================================================================

/// A parsed session key.
///
/// Three conventions exist on the wire:
/// - `app:<companion>:main` is the companion's primary chat channel
/// - `agent:main:app:<companion>:<tail>` carries agent-level events for that
///   same channel
/// - `agent:main:<channel>:<id>` is an externally subscribed alert feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Companion { companion: String },
    CompanionAgent { companion: String, tail: String },
    AlertFeed { channel: String, id: String },
}

impl SessionKey {
    /// The primary chat key for a companion channel.
    pub fn companion_main(companion: impl Into<String>) -> Self {
        SessionKey::Companion {
            companion: companion.into(),
        }
    }

    /// The companion channel this key belongs to, if it is one.
    pub fn companion(&self) -> Option<&str> {
        match self {
            SessionKey::Companion { companion } => Some(companion),
            SessionKey::CompanionAgent { companion, .. } => Some(companion),
            SessionKey::AlertFeed { .. } => None,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Companion { companion } => write!(f, "app:{companion}:main"),
            SessionKey::CompanionAgent { companion, tail } => {
                write!(f, "agent:main:app:{companion}:{tail}")
            }
            SessionKey::AlertFeed { channel, id } => write!(f, "agent:main:{channel}:{id}"),
        }
    }
}

/// Error parsing a session key string.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionKeyParseError {
    #[error("unrecognized session key: {0}")]
    Unrecognized(String),
}

impl FromStr for SessionKey {
    type Err = SessionKeyParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            ["app", companion, "main"] if !companion.is_empty() => Ok(SessionKey::Companion {
                companion: (*companion).to_string(),
            }),
            ["agent", "main", "app", companion, tail @ ..]
                if !companion.is_empty() && !tail.is_empty() =>
            {
                Ok(SessionKey::CompanionAgent {
                    companion: (*companion).to_string(),
                    tail: tail.join(":"),
                })
            }
            ["agent", "main", channel, id] if !channel.is_empty() && !id.is_empty() => {
                Ok(SessionKey::AlertFeed {
                    channel: (*channel).to_string(),
                    id: (*id).to_string(),
                })
            }
            _ => Err(SessionKeyParseError::Unrecognized(s.to_string())),
        }
    }
}

// =============================================================================
// Routing
// =============================================================================

/// Where an event's session key routes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Foreground,
    Alert,
    Ignored,
}

/// A completed alert message, delivered FIFO to the display queue.
#[derive(Debug, Clone)]
pub struct AlertMessage {
    /// Wire session key of the feed the alert arrived on
    pub session_key: String,
    /// Final message text
    pub text: String,
    /// When the completion was observed
    pub received_at: chrono::DateTime<chrono::Utc>,
}

/// One-shot completion for the foreground exchange.
pub type ChatCompletion = oneshot::Sender<Result<String>>;

/// Routes inbound session events and aggregates streamed text.
///
/// Buffers hold the last full snapshot, not a concatenation: both event
/// shapes re-deliver the entire accumulated text with every frame. All
/// mutation happens on the connection actor, never concurrently.
pub struct SessionRouter {
    companion: String,
    ack_marker: String,
    subscribed: HashSet<String>,
    foreground_buffer: String,
    foreground_completion: Option<ChatCompletion>,
    alert_buffers: HashMap<String, String>,
    alerts_tx: mpsc::UnboundedSender<AlertMessage>,
}

impl SessionRouter {
    /// Create a router for a companion channel; the returned receiver is the
    /// alert display queue.
    pub fn new(
        companion: impl Into<String>,
        ack_marker: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<AlertMessage>) {
        let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
        (
            Self {
                companion: companion.into(),
                ack_marker: ack_marker.into(),
                subscribed: HashSet::new(),
                foreground_buffer: String::new(),
                foreground_completion: None,
                alert_buffers: HashMap::new(),
                alerts_tx,
            },
            alerts_rx,
        )
    }

    /// Register alert feeds so their events stop being ignored.
    pub fn subscribe_alerts<I: IntoIterator<Item = String>>(&mut self, keys: I) {
        self.subscribed.extend(keys);
    }

    /// Begin a foreground exchange, registering its one-shot completion.
    ///
    /// A still-unresolved previous exchange is superseded: its completion
    /// fires with [`GatewayError::Superseded`] and its buffer is discarded.
    pub fn begin_exchange(&mut self, completion: ChatCompletion) {
        if let Some(previous) = self.foreground_completion.take() {
            debug!("foreground exchange superseded before completion");
            let _ = previous.send(Err(GatewayError::Superseded));
        }
        self.foreground_buffer.clear();
        self.foreground_completion = Some(completion);
    }

    /// Whether a foreground completion is still waiting.
    pub fn has_pending_exchange(&self) -> bool {
        self.foreground_completion.is_some()
    }

    /// Fail the pending foreground exchange, if any.
    pub fn fail_foreground(&mut self, error: GatewayError) {
        if let Some(completion) = self.foreground_completion.take() {
            let _ = completion.send(Err(error));
        }
        self.foreground_buffer.clear();
    }

    /// Route one inbound session event.
    pub fn handle_event(&mut self, event: &str, payload: JsonValue) {
        match event {
            EVENT_CHAT => self.handle_chat_event(payload),
            EVENT_AGENT => self.handle_agent_event(payload),
            other => debug!(event = other, "ignoring unrouted event"),
        }
    }

    fn handle_chat_event(&mut self, payload: JsonValue) {
        let payload: ChatEventPayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping malformed chat event");
                return;
            }
        };
        let Some(key) = self.classify_raw(payload.session_key.as_deref()) else {
            return;
        };

        // Only assistant messages carry the streamed reply; user echoes and
        // their lifecycle states are not ours to complete on.
        let Some(message) = payload.message.as_ref().filter(|m| m.role == "assistant") else {
            return;
        };

        // The full text is re-delivered every frame; replace, not append.
        let snapshot: String = message
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        let done = payload.state.as_deref() == Some("final");
        self.apply(&key, Some(snapshot), done);
    }

    fn handle_agent_event(&mut self, payload: JsonValue) {
        let payload: AgentEventPayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping malformed agent event");
                return;
            }
        };
        let Some(key) = self.classify_raw(payload.session_key.as_deref()) else {
            return;
        };

        if payload.stream.as_deref() != Some("assistant") {
            return;
        }

        let snapshot = payload.data.as_ref().and_then(|data| data.text.clone());
        let done = payload
            .data
            .as_ref()
            .and_then(|data| data.phase.as_deref())
            == Some("end");
        self.apply(&key, snapshot, done);
    }

    /// Parse and classify, returning `None` for ignored sessions.
    fn classify_raw(&self, session_key: Option<&str>) -> Option<SessionKey> {
        let raw = session_key?;
        let key = match raw.parse::<SessionKey>() {
            Ok(key) => key,
            Err(e) => {
                debug!(session = raw, error = %e, "ignoring event with unparseable session key");
                return None;
            }
        };
        match self.classify(&key) {
            Classification::Ignored => {
                debug!(session = raw, "ignoring event for unrelated session");
                None
            }
            _ => Some(key),
        }
    }

    fn classify(&self, key: &SessionKey) -> Classification {
        match key {
            SessionKey::Companion { companion } | SessionKey::CompanionAgent { companion, .. } => {
                if *companion == self.companion {
                    Classification::Foreground
                } else {
                    Classification::Ignored
                }
            }
            SessionKey::AlertFeed { .. } => {
                if self.subscribed.contains(&key.to_string()) {
                    Classification::Alert
                } else {
                    Classification::Ignored
                }
            }
        }
    }

    /// Fold a snapshot into the session's buffer and deliver on completion.
    fn apply(&mut self, key: &SessionKey, snapshot: Option<String>, done: bool) {
        match self.classify(key) {
            Classification::Foreground => {
                if let Some(text) = snapshot {
                    self.foreground_buffer = text;
                }
                if done {
                    let text = std::mem::take(&mut self.foreground_buffer);
                    match self.foreground_completion.take() {
                        Some(completion) => {
                            let _ = completion.send(Ok(text));
                        }
                        None => {
                            debug!(session = %key, "dropping completion with no registered waiter");
                        }
                    }
                }
            }
            Classification::Alert => {
                let wire_key = key.to_string();
                let buffer = self.alert_buffers.entry(wire_key.clone()).or_default();
                if let Some(text) = snapshot {
                    *buffer = text;
                }
                if done {
                    let text = std::mem::take(buffer);
                    if self.is_displayable_alert(&text) {
                        let _ = self.alerts_tx.send(AlertMessage {
                            session_key: wire_key,
                            text,
                            received_at: chrono::Utc::now(),
                        });
                    } else {
                        debug!(session = %key, "dropping acknowledgment-only alert");
                    }
                }
            }
            Classification::Ignored => {}
        }
    }

    /// Non-empty and not acknowledgment-only, per the configured marker.
    fn is_displayable_alert(&self, text: &str) -> bool {
        let trimmed = text.trim();
        !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(&self.ack_marker)
    }
}
