//! Wire envelopes and payload types for the gateway protocol.
//!
//! The gateway speaks JSON text frames over a WebSocket. Outbound frames
//! are requests `{type:"req", id, method, params}`; inbound frames are
//! events `{type:"event", event, payload}` or responses
//! `{type:"res", id, ok, payload}`. Payload field names are camelCase on
//! the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Lowest protocol version this client can speak
pub const PROTOCOL_VERSION_MIN: u32 = 1;

/// Highest protocol version this client can speak
pub const PROTOCOL_VERSION_MAX: u32 = 3;

/// Event name carrying the handshake challenge nonce
pub const EVENT_CONNECT_CHALLENGE: &str = "connect.challenge";

/// Event name for chat-session message events
pub const EVENT_CHAT: &str = "chat";

/// Event name for agent-session stream events
pub const EVENT_AGENT: &str = "agent";

// =============================================================================
// Request kinds and correlation ids
// =============================================================================

/// The kinds of request this client issues.
///
/// Each kind owns a fixed wire id and at most one in-flight request; a new
/// request of a kind replaces the pending one (last-write-wins). The ids are
/// part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Handshake `connect` request
    Connect,
    /// Foreground `chat.send`
    ChatSend,
    /// Alert feed `sessions.subscribe`
    Subscribe,
    /// First outbound message on an alert feed (creates the session)
    AlertInit,
    /// Subsequent outbound messages on an alert feed
    AlertSend,
}

impl RequestKind {
    /// The fixed wire id for this request kind.
    pub fn wire_id(self) -> &'static str {
        match self {
            RequestKind::Connect => "1",
            RequestKind::ChatSend => "2",
            RequestKind::Subscribe => "3",
            RequestKind::AlertInit => "4",
            RequestKind::AlertSend => "5",
        }
    }

    /// The gateway method this kind invokes.
    pub fn method(self) -> &'static str {
        match self {
            RequestKind::Connect => "connect",
            RequestKind::ChatSend => "chat.send",
            RequestKind::Subscribe => "sessions.subscribe",
            RequestKind::AlertInit => "chat.send",
            RequestKind::AlertSend => "chat.send",
        }
    }
}

// =============================================================================
// Envelopes
// =============================================================================

/// Outbound request frame.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub id: String,
    pub method: String,
    pub params: JsonValue,
}

impl RequestEnvelope {
    /// Build a request frame for the given kind.
    pub fn new(kind: RequestKind, params: JsonValue) -> Self {
        Self {
            frame_type: "req",
            id: kind.wire_id().to_string(),
            method: kind.method().to_string(),
            params,
        }
    }
}

/// Inbound frame, either an unsolicited event or a response to a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEnvelope {
    Event {
        event: String,
        #[serde(default)]
        payload: JsonValue,
    },
    Res {
        id: String,
        ok: bool,
        #[serde(default)]
        payload: JsonValue,
        #[serde(default)]
        error: Option<ErrorShape>,
    },
}

/// Error detail attached to a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorShape {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Human-readable error out of a failed response, checking the error shape
/// first and falling back to the payload's `error`/`message` fields.
pub fn response_error_message(error: Option<&ErrorShape>, payload: &JsonValue) -> String {
    if let Some(shape) = error {
        if let Some(msg) = shape.message.as_deref().filter(|m| !m.is_empty()) {
            return msg.to_string();
        }
        if let Some(code) = shape.code.as_deref().filter(|c| !c.is_empty()) {
            return code.to_string();
        }
    }
    for field in ["error", "message"] {
        if let Some(msg) = payload.get(field).and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    "unspecified gateway error".to_string()
}

// =============================================================================
// Handshake payloads
// =============================================================================

/// Payload of the `connect.challenge` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengePayload {
    pub nonce: String,
    /// Challenge issue time in milliseconds; echoed back as `signedAt`
    pub ts: i64,
}

/// Static client descriptor sent during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub display_name: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            id: "companion-desktop".to_string(),
            display_name: "Companion".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            mode: "ui".to_string(),
        }
    }
}

/// Signed device identity block inside the `connect` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBlock {
    pub id: String,
    pub public_key: String,
    pub signature: String,
    pub signed_at: i64,
    pub nonce: String,
}

/// Bearer token block inside the `connect` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    pub token: String,
}

/// Parameters of the handshake `connect` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub caps: Vec<String>,
    pub commands: Vec<String>,
    pub permissions: serde_json::Map<String, JsonValue>,
    pub role: String,
    pub scopes: Vec<String>,
    pub device: DeviceBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParams>,
    pub locale: String,
    pub user_agent: String,
}

// =============================================================================
// Request payloads
// =============================================================================

/// Parameters of `chat.send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    pub session_key: String,
    pub message: String,
    pub idempotency_key: String,
}

/// Parameters of `sessions.subscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    pub session_keys: Vec<String>,
    pub events: Vec<String>,
}

// =============================================================================
// Session event payloads
// =============================================================================

/// Payload of a `chat` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEventPayload {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub message: Option<ChatMessage>,
    /// "final" marks the completed message
    #[serde(default)]
    pub state: Option<String>,
}

/// A structured chat message with content blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One content block of a chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Payload of an `agent` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEventPayload {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub data: Option<AgentStreamData>,
}

/// Cumulative stream data inside an `agent` event.
///
/// `text` is the full accumulated text so far, not a delta.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentStreamData {
    #[serde(default)]
    pub text: Option<String>,
    /// "end" marks stream completion
    #[serde(default)]
    pub phase: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_shape() {
        let params = serde_json::to_value(ChatSendParams {
            session_key: "app:pizza:main".to_string(),
            message: "hello".to_string(),
            idempotency_key: "k-1".to_string(),
        })
        .unwrap();
        let frame = RequestEnvelope::new(RequestKind::ChatSend, params);
        let text = serde_json::to_string(&frame).unwrap();
        let value: JsonValue = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "req");
        assert_eq!(value["id"], "2");
        assert_eq!(value["method"], "chat.send");
        assert_eq!(value["params"]["sessionKey"], "app:pizza:main");
        assert_eq!(value["params"]["idempotencyKey"], "k-1");
    }

    #[test]
    fn test_wire_ids_are_fixed() {
        assert_eq!(RequestKind::Connect.wire_id(), "1");
        assert_eq!(RequestKind::ChatSend.wire_id(), "2");
        assert_eq!(RequestKind::Subscribe.wire_id(), "3");
        assert_eq!(RequestKind::AlertInit.wire_id(), "4");
        assert_eq!(RequestKind::AlertSend.wire_id(), "5");
        assert_eq!(RequestKind::AlertInit.method(), "chat.send");
    }

    #[test]
    fn test_server_envelope_event_decode() {
        let text = r#"{"type":"event","event":"connect.challenge","payload":{"nonce":"abc","ts":1000}}"#;
        let envelope: ServerEnvelope = serde_json::from_str(text).unwrap();
        match envelope {
            ServerEnvelope::Event { event, payload } => {
                assert_eq!(event, EVENT_CONNECT_CHALLENGE);
                let challenge: ChallengePayload = serde_json::from_value(payload).unwrap();
                assert_eq!(challenge.nonce, "abc");
                assert_eq!(challenge.ts, 1000);
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn test_server_envelope_res_decode() {
        let text = r#"{"type":"res","id":"2","ok":true,"payload":{"runId":"r1"}}"#;
        let envelope: ServerEnvelope = serde_json::from_str(text).unwrap();
        match envelope {
            ServerEnvelope::Res { id, ok, payload, error } => {
                assert_eq!(id, "2");
                assert!(ok);
                assert_eq!(payload["runId"], "r1");
                assert!(error.is_none());
            }
            other => panic!("expected res, got {other:?}"),
        }
    }

    #[test]
    fn test_connect_params_round_trip() {
        let params = ConnectParams {
            min_protocol: PROTOCOL_VERSION_MIN,
            max_protocol: PROTOCOL_VERSION_MAX,
            client: ClientInfo::default(),
            caps: Vec::new(),
            commands: Vec::new(),
            permissions: serde_json::Map::new(),
            role: "operator".to_string(),
            scopes: vec!["operator.read".to_string()],
            device: DeviceBlock {
                id: "d".repeat(64),
                public_key: "cGs=".to_string(),
                signature: "c2ln".to_string(),
                signed_at: 1000,
                nonce: "abc".to_string(),
            },
            auth: Some(AuthParams {
                token: "tok123".to_string(),
            }),
            locale: "en-US".to_string(),
            user_agent: "knock/0.1.0".to_string(),
        };

        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["minProtocol"], 1);
        assert_eq!(value["maxProtocol"], 3);
        assert_eq!(value["userAgent"], "knock/0.1.0");
        assert_eq!(value["device"]["publicKey"], "cGs=");
        assert_eq!(value["device"]["signedAt"], 1000);
        assert_eq!(value["auth"]["token"], "tok123");

        // A peer parsing the frame recovers identical nonce, signature and
        // device id.
        let parsed: ConnectParams = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.device.nonce, params.device.nonce);
        assert_eq!(parsed.device.signature, params.device.signature);
        assert_eq!(parsed.device.id, params.device.id);
    }

    #[test]
    fn test_auth_block_omitted_without_token() {
        let params = ConnectParams {
            min_protocol: 1,
            max_protocol: 3,
            client: ClientInfo::default(),
            caps: Vec::new(),
            commands: Vec::new(),
            permissions: serde_json::Map::new(),
            role: "operator".to_string(),
            scopes: Vec::new(),
            device: DeviceBlock {
                id: String::new(),
                public_key: String::new(),
                signature: String::new(),
                signed_at: 0,
                nonce: String::new(),
            },
            auth: None,
            locale: "en-US".to_string(),
            user_agent: "knock".to_string(),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert!(value.get("auth").is_none());
    }

    #[test]
    fn test_agent_event_payload_decode() {
        let payload = json!({
            "sessionKey": "agent:main:app:pizza:main",
            "stream": "assistant",
            "data": { "text": "Hello world", "phase": "end" }
        });
        let parsed: AgentEventPayload = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.session_key.as_deref(), Some("agent:main:app:pizza:main"));
        assert_eq!(parsed.stream.as_deref(), Some("assistant"));
        let data = parsed.data.unwrap();
        assert_eq!(data.text.as_deref(), Some("Hello world"));
        assert_eq!(data.phase.as_deref(), Some("end"));
    }

    #[test]
    fn test_response_error_message_fallbacks() {
        let shape = ErrorShape {
            code: Some("pairing_required".to_string()),
            message: None,
        };
        assert_eq!(
            response_error_message(Some(&shape), &JsonValue::Null),
            "pairing_required"
        );
        assert_eq!(
            response_error_message(None, &json!({"error": "bad token"})),
            "bad token"
        );
        assert_eq!(
            response_error_message(None, &JsonValue::Null),
            "unspecified gateway error"
        );
    }
}
