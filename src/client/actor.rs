//! Connection actor: socket lifecycle, handshake state machine, and
//! request dispatch.
//!
//! All connection state lives in one task. Public API calls and decoded
//! inbound frames arrive over the same command channel, so buffer and
//! correlation-table mutation are never interleaved. A generation counter
//! tags the read task and every armed deadline; after a reconnect or
//! failure, stale messages from a previous life of the connection are
//! ignored.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{CloseReason, ConnectionPhase};
use crate::config::ClientConfig;
use crate::error::{GatewayError, Result};
use crate::identity::{AttestationRequest, DeviceIdentity};
use crate::session::{ChatCompletion, SessionRouter};
use crate::wire::{
    response_error_message, AuthParams, ChallengePayload, ConnectParams, DeviceBlock,
    RequestEnvelope, RequestKind, ServerEnvelope, ChatSendParams, SubscribeParams,
    EVENT_AGENT, EVENT_CHAT, EVENT_CONNECT_CHALLENGE, PROTOCOL_VERSION_MAX, PROTOCOL_VERSION_MIN,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Commands processed by the connection actor.
pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    SendChat {
        message: String,
        reply: ChatCompletion,
    },
    ConnectForAlerts {
        reply: oneshot::Sender<Result<()>>,
    },
    SendAlert {
        message: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Phase {
        reply: oneshot::Sender<ConnectionPhase>,
    },
    Frame {
        generation: u64,
        envelope: ServerEnvelope,
    },
    ProbeOk {
        generation: u64,
    },
    TransportFailed {
        generation: u64,
        reason: String,
    },
    RemoteClosed {
        generation: u64,
    },
    Deadline {
        generation: u64,
        deadline: DeadlineKind,
    },
}

/// Which deadline fired.
pub(crate) enum DeadlineKind {
    /// Liveness probe after socket open
    Probe,
    /// Challenge wait + handshake response
    Handshake,
    /// One in-flight request slot; `seq` guards against a replacement
    /// request reusing the same wire id
    Request { id: String, seq: u64 },
}

/// A server-issued handshake challenge. At most one is live; a later one
/// overwrites an earlier unconsumed one.
struct Challenge {
    nonce: String,
    issued_at_ms: i64,
}

/// The single queued outbound chat message held while not Ready.
struct QueuedChat {
    message: String,
    reply: ChatCompletion,
}

/// One in-flight request. One slot per request kind: the table is keyed by
/// the kind's fixed wire id, so inserting a second request of the same kind
/// replaces the first (last-write-wins, by design).
struct PendingSlot {
    kind: RequestKind,
    seq: u64,
    reply: SlotReply,
}

enum SlotReply {
    /// Handshake `connect`; resolution drives the state machine
    Connect,
    /// Foreground `chat.send`; the completed text arrives via the router
    Chat,
    /// Alert feed `sessions.subscribe`
    Subscribe,
    /// Outbound alert message; `prime` marks the feed-creating first send
    Alert {
        prime: bool,
        reply: oneshot::Sender<Result<()>>,
    },
}

pub(crate) struct ConnectionActor {
    config: ClientConfig,
    identity: DeviceIdentity,
    router: SessionRouter,
    rx: UnboundedReceiver<Command>,
    self_tx: WeakUnboundedSender<Command>,
    phase: ConnectionPhase,
    generation: u64,
    next_seq: u64,
    sink: Option<WsSink>,
    read_task: Option<JoinHandle<()>>,
    challenge: Option<Challenge>,
    pending: HashMap<String, PendingSlot>,
    queued_chat: Option<QueuedChat>,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
    alert_waiters: Vec<oneshot::Sender<Result<()>>>,
    alerts_subscribed: bool,
    alert_primed: bool,
}

impl ConnectionActor {
    pub(crate) fn new(
        config: ClientConfig,
        identity: DeviceIdentity,
        router: SessionRouter,
        rx: UnboundedReceiver<Command>,
        self_tx: WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            config,
            identity,
            router,
            rx,
            self_tx,
            phase: ConnectionPhase::Idle,
            generation: 0,
            next_seq: 0,
            sink: None,
            read_task: None,
            challenge: None,
            pending: HashMap::new(),
            queued_chat: None,
            connect_waiters: Vec::new(),
            alert_waiters: Vec::new(),
            alerts_subscribed: false,
            alert_primed: false,
        }
    }

    /// Run until every handle and in-flight task has dropped its sender.
    pub(crate) async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        debug!("connection actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => self.on_connect(reply).await,
            Command::SendChat { message, reply } => self.on_send_chat(message, reply).await,
            Command::ConnectForAlerts { reply } => self.on_connect_for_alerts(reply).await,
            Command::SendAlert { message, reply } => self.on_send_alert(message, reply).await,
            Command::Disconnect { reply } => {
                self.on_disconnect().await;
                let _ = reply.send(());
            }
            Command::Phase { reply } => {
                let _ = reply.send(self.phase);
            }
            Command::Frame { generation, envelope } => {
                if generation == self.generation {
                    self.on_frame(envelope).await;
                }
            }
            Command::ProbeOk { generation } => {
                if generation == self.generation {
                    self.on_probe_ok().await;
                }
            }
            Command::TransportFailed { generation, reason } => {
                if generation == self.generation {
                    self.fail_connection(CloseReason::Error, GatewayError::Transport(reason));
                }
            }
            Command::RemoteClosed { generation } => {
                if generation == self.generation {
                    self.fail_connection(CloseReason::Remote, GatewayError::Closed);
                }
            }
            Command::Deadline { generation, deadline } => {
                if generation == self.generation {
                    self.on_deadline(deadline);
                }
            }
        }
    }

    // =========================================================================
    // Public entry points
    // =========================================================================

    async fn on_connect(&mut self, reply: oneshot::Sender<Result<()>>) {
        match self.phase {
            ConnectionPhase::Ready => {
                let _ = reply.send(Ok(()));
            }
            ConnectionPhase::Connecting
            | ConnectionPhase::AwaitingChallenge
            | ConnectionPhase::Handshaking => self.connect_waiters.push(reply),
            ConnectionPhase::Idle | ConnectionPhase::Closed(_) => {
                self.connect_waiters.push(reply);
                self.start_connect().await;
            }
        }
    }

    async fn on_send_chat(&mut self, message: String, reply: ChatCompletion) {
        match self.phase {
            ConnectionPhase::Ready => self.dispatch_chat(message, reply).await,
            ConnectionPhase::Connecting
            | ConnectionPhase::AwaitingChallenge
            | ConnectionPhase::Handshaking => self.queue_chat(message, reply),
            ConnectionPhase::Idle | ConnectionPhase::Closed(_) => {
                self.queue_chat(message, reply);
                self.start_connect().await;
            }
        }
    }

    /// Hold the message for the Ready flush. At most one is held; a second
    /// call replaces it and the superseded caller is told so.
    fn queue_chat(&mut self, message: String, reply: ChatCompletion) {
        if let Some(previous) = self.queued_chat.take() {
            debug!("queued chat message superseded");
            let _ = previous.reply.send(Err(GatewayError::Superseded));
        }
        self.queued_chat = Some(QueuedChat { message, reply });
    }

    async fn on_connect_for_alerts(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.config.alert_feeds.is_empty() {
            let _ = reply.send(Err(GatewayError::Config(
                "no alert feeds configured".to_string(),
            )));
            return;
        }
        if self.alerts_subscribed && self.phase == ConnectionPhase::Ready {
            let _ = reply.send(Ok(()));
            return;
        }

        self.alert_waiters.push(reply);
        match self.phase {
            ConnectionPhase::Ready => {
                if !self.subscribe_in_flight() {
                    self.send_subscribe().await;
                }
            }
            ConnectionPhase::Idle | ConnectionPhase::Closed(_) => self.start_connect().await,
            // Subscription is issued once the handshake completes
            _ => {}
        }
    }

    fn subscribe_in_flight(&self) -> bool {
        self.pending.contains_key(RequestKind::Subscribe.wire_id())
    }

    async fn on_send_alert(&mut self, message: String, reply: oneshot::Sender<Result<()>>) {
        let Some(feed) = self.config.alert_feeds.first().cloned() else {
            let _ = reply.send(Err(GatewayError::Config(
                "no alert feeds configured".to_string(),
            )));
            return;
        };
        if self.phase != ConnectionPhase::Ready {
            let _ = reply.send(Err(GatewayError::Closed));
            return;
        }

        let kind = if self.alert_primed {
            RequestKind::AlertSend
        } else {
            RequestKind::AlertInit
        };
        let params = ChatSendParams {
            session_key: feed,
            message,
            idempotency_key: Uuid::new_v4().to_string(),
        };
        self.insert_slot(
            kind,
            SlotReply::Alert {
                prime: kind == RequestKind::AlertInit,
                reply,
            },
        );
        self.send_request(kind, &params).await;
    }

    async fn on_disconnect(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "going away".into(),
            };
            let _ = sink.send(Message::Close(Some(frame))).await;
            let _ = sink.close().await;
        }
        self.fail_connection(CloseReason::Local, GatewayError::Closed);
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    async fn start_connect(&mut self) {
        self.generation += 1;
        self.phase = ConnectionPhase::Connecting;
        self.challenge = None;

        let endpoint = self.config.normalized_endpoint();
        info!(endpoint = %endpoint, "connecting to gateway");

        let connected =
            tokio::time::timeout(self.config.connect_timeout, connect_async(endpoint.as_str()))
                .await;
        let ws = match connected {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                self.fail_connection(CloseReason::Error, GatewayError::Transport(e.to_string()));
                return;
            }
            Err(_) => {
                self.fail_connection(CloseReason::Error, GatewayError::Timeout("socket open"));
                return;
            }
        };

        let (mut sink, stream) = ws.split();
        self.spawn_read_task(stream);

        // Liveness probe: the connection is not trusted until the gateway
        // answers a ping.
        if let Err(e) = sink.send(Message::Ping(b"knock".to_vec())).await {
            self.fail_connection(CloseReason::Error, GatewayError::Transport(e.to_string()));
            return;
        }
        self.sink = Some(sink);
        self.arm_deadline(self.config.connect_timeout, DeadlineKind::Probe);
    }

    fn spawn_read_task(&mut self, stream: WsStream) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let generation = self.generation;
        self.read_task = Some(tokio::spawn(read_loop(stream, tx, generation)));
    }

    async fn on_probe_ok(&mut self) {
        if self.phase != ConnectionPhase::Connecting {
            return;
        }
        debug!("liveness probe confirmed");
        self.phase = ConnectionPhase::AwaitingChallenge;
        self.arm_deadline(self.config.handshake_timeout, DeadlineKind::Handshake);
        if self.challenge.is_some() {
            self.start_handshake().await;
        }
    }

    async fn start_handshake(&mut self) {
        // The challenge is consumed by the signed request it produces.
        let Some(challenge) = self.challenge.take() else {
            return;
        };
        self.phase = ConnectionPhase::Handshaking;

        let token = self.config.token.clone().unwrap_or_default();
        let attestation = AttestationRequest {
            client_id: &self.config.client.id,
            client_mode: &self.config.client.mode,
            role: &self.config.role,
            scopes: &self.config.scopes,
            signed_at_ms: challenge.issued_at_ms,
            token: &token,
            nonce: &challenge.nonce,
        };
        let signature = match self.identity.sign_attestation(&attestation) {
            Ok(signature) => signature,
            Err(e) => {
                // Never transmit an empty or unverified signature.
                self.fail_connection(CloseReason::Error, e);
                return;
            }
        };

        let params = ConnectParams {
            min_protocol: PROTOCOL_VERSION_MIN,
            max_protocol: PROTOCOL_VERSION_MAX,
            client: self.config.client.clone(),
            caps: Vec::new(),
            commands: Vec::new(),
            permissions: serde_json::Map::new(),
            role: self.config.role.clone(),
            scopes: self.config.scopes.clone(),
            device: DeviceBlock {
                id: self.identity.device_id().to_string(),
                public_key: self.identity.public_key_base64(),
                signature,
                signed_at: challenge.issued_at_ms,
                nonce: challenge.nonce,
            },
            auth: self
                .config
                .token
                .clone()
                .map(|token| AuthParams { token }),
            locale: self.config.locale.clone(),
            user_agent: self.config.user_agent.clone(),
        };

        self.insert_slot(RequestKind::Connect, SlotReply::Connect);
        self.send_request(RequestKind::Connect, &params).await;
    }

    async fn on_ready(&mut self) {
        self.phase = ConnectionPhase::Ready;
        info!(device_id = %self.identity.device_id(), "gateway connection ready");

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        // Flush exactly one queued outbound chat message, if present.
        if let Some(queued) = self.queued_chat.take() {
            self.dispatch_chat(queued.message, queued.reply).await;
        }
        if !self.alert_waiters.is_empty() && !self.alerts_subscribed {
            self.send_subscribe().await;
        }
    }

    /// Tear down the connection and fail everything still waiting on it.
    fn fail_connection(&mut self, reason: CloseReason, error: GatewayError) {
        self.generation += 1;
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.sink = None;
        self.challenge = None;
        self.phase = ConnectionPhase::Closed(reason);
        self.alerts_subscribed = false;
        self.alert_primed = false;

        let slots: Vec<PendingSlot> = self.pending.drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            self.fail_slot(slot, error.clone());
        }
        if let Some(queued) = self.queued_chat.take() {
            let _ = queued.reply.send(Err(error.clone()));
        }
        self.router.fail_foreground(error.clone());
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }
        for waiter in self.alert_waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }

        match reason {
            CloseReason::Local => info!("gateway connection closed"),
            _ => warn!(error = %error, "gateway connection closed"),
        }
    }

    // =========================================================================
    // Request dispatch and correlation
    // =========================================================================

    async fn dispatch_chat(&mut self, message: String, reply: ChatCompletion) {
        // Claim the slot before registering the exchange: displacing a
        // pending chat.send fails the OLD exchange through the router, so
        // the new completion must not be registered yet.
        self.insert_slot(RequestKind::ChatSend, SlotReply::Chat);
        self.router.begin_exchange(reply);
        let params = ChatSendParams {
            session_key: self.config.companion_session_key().to_string(),
            message,
            idempotency_key: Uuid::new_v4().to_string(),
        };
        self.send_request(RequestKind::ChatSend, &params).await;
    }

    async fn send_subscribe(&mut self) {
        // Register the feeds before the ack so no early event is dropped.
        self.router
            .subscribe_alerts(self.config.alert_feeds.iter().cloned());
        let params = SubscribeParams {
            session_keys: self.config.alert_feeds.clone(),
            events: vec![EVENT_CHAT.to_string(), EVENT_AGENT.to_string()],
        };
        self.insert_slot(RequestKind::Subscribe, SlotReply::Subscribe);
        self.send_request(RequestKind::Subscribe, &params).await;
    }

    /// Claim the slot for a request kind. A still-pending request of the
    /// same kind is displaced and resolved as superseded.
    fn insert_slot(&mut self, kind: RequestKind, reply: SlotReply) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let displaced = self.pending.insert(
            kind.wire_id().to_string(),
            PendingSlot { kind, seq, reply },
        );
        if let Some(slot) = displaced {
            debug!(id = slot.kind.wire_id(), "pending request displaced");
            self.fail_slot(slot, GatewayError::Superseded);
        }
        self.arm_deadline(
            self.config.request_timeout,
            DeadlineKind::Request {
                id: kind.wire_id().to_string(),
                seq,
            },
        );
    }

    fn fail_slot(&mut self, slot: PendingSlot, error: GatewayError) {
        match slot.reply {
            // Connect failures are handled where they are detected; the
            // drained slot itself carries no waiter.
            SlotReply::Connect => {}
            SlotReply::Chat => self.router.fail_foreground(error),
            SlotReply::Subscribe => {
                for waiter in self.alert_waiters.drain(..) {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
            SlotReply::Alert { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }

    async fn send_request<P: Serialize>(&mut self, kind: RequestKind, params: &P) {
        let params = match serde_json::to_value(params) {
            Ok(value) => value,
            Err(e) => {
                self.fail_connection(CloseReason::Error, GatewayError::Protocol(e.to_string()));
                return;
            }
        };
        let frame = RequestEnvelope::new(kind, params);
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.fail_connection(CloseReason::Error, GatewayError::Protocol(e.to_string()));
                return;
            }
        };

        let Some(sink) = self.sink.as_mut() else {
            self.fail_connection(CloseReason::Error, GatewayError::Closed);
            return;
        };
        match sink.send(Message::Text(text)).await {
            Ok(()) => {
                debug!(id = kind.wire_id(), method = kind.method(), "request sent");
            }
            Err(e) => {
                self.fail_connection(CloseReason::Error, GatewayError::Transport(e.to_string()));
            }
        }
    }

    // =========================================================================
    // Inbound frames
    // =========================================================================

    async fn on_frame(&mut self, envelope: ServerEnvelope) {
        match envelope {
            ServerEnvelope::Event { event, payload } => match event.as_str() {
                EVENT_CONNECT_CHALLENGE => self.on_challenge(payload).await,
                EVENT_CHAT | EVENT_AGENT => self.router.handle_event(&event, payload),
                other => debug!(event = other, "ignoring unhandled event"),
            },
            ServerEnvelope::Res {
                id,
                ok,
                payload,
                error,
            } => {
                let message = if ok {
                    String::new()
                } else {
                    response_error_message(error.as_ref(), &payload)
                };
                self.on_response(id, ok, message).await;
            }
        }
    }

    async fn on_challenge(&mut self, payload: serde_json::Value) {
        let challenge: ChallengePayload = match serde_json::from_value(payload) {
            Ok(challenge) => challenge,
            Err(e) => {
                warn!(error = %e, "dropping malformed challenge event");
                return;
            }
        };
        if self.challenge.is_some() {
            debug!("challenge overwritten before being consumed");
        }
        self.challenge = Some(Challenge {
            nonce: challenge.nonce,
            issued_at_ms: challenge.ts,
        });

        match self.phase {
            ConnectionPhase::AwaitingChallenge => self.start_handshake().await,
            // Probe still outstanding; handshake starts on ProbeOk
            ConnectionPhase::Connecting => {}
            _ => debug!(phase = ?self.phase, "challenge received outside handshake"),
        }
    }

    async fn on_response(&mut self, id: String, ok: bool, message: String) {
        let Some(slot) = self.pending.remove(&id) else {
            debug!(id = %id, "response with no pending request");
            return;
        };

        match slot.reply {
            SlotReply::Connect => {
                if ok {
                    self.on_ready().await;
                } else {
                    self.fail_connection(CloseReason::Error, GatewayError::Auth(message));
                }
            }
            SlotReply::Chat => {
                if ok {
                    debug!("chat.send accepted; awaiting session completion");
                } else {
                    self.router.fail_foreground(GatewayError::Rejected(message));
                }
            }
            SlotReply::Subscribe => {
                if ok {
                    self.alerts_subscribed = true;
                    info!(feeds = self.config.alert_feeds.len(), "alert feeds subscribed");
                    for waiter in self.alert_waiters.drain(..) {
                        let _ = waiter.send(Ok(()));
                    }
                } else {
                    for waiter in self.alert_waiters.drain(..) {
                        let _ = waiter.send(Err(GatewayError::Rejected(message.clone())));
                    }
                }
            }
            SlotReply::Alert { prime, reply } => {
                if ok {
                    if prime {
                        self.alert_primed = true;
                    }
                    let _ = reply.send(Ok(()));
                } else {
                    let _ = reply.send(Err(GatewayError::Rejected(message)));
                }
            }
        }
    }

    // =========================================================================
    // Deadlines
    // =========================================================================

    fn arm_deadline(&self, duration: Duration, deadline: DeadlineKind) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let generation = self.generation;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Command::Deadline {
                generation,
                deadline,
            });
        });
    }

    fn on_deadline(&mut self, deadline: DeadlineKind) {
        match deadline {
            DeadlineKind::Probe => {
                if self.phase == ConnectionPhase::Connecting {
                    self.fail_connection(CloseReason::Error, GatewayError::Timeout("liveness probe"));
                }
            }
            DeadlineKind::Handshake => {
                if matches!(
                    self.phase,
                    ConnectionPhase::AwaitingChallenge | ConnectionPhase::Handshaking
                ) {
                    self.fail_connection(CloseReason::Error, GatewayError::Timeout("handshake"));
                }
            }
            DeadlineKind::Request { id, seq } => {
                // A replacement request reuses the wire id; only the slot
                // this deadline was armed for may expire.
                match self.pending.get(&id) {
                    Some(slot) if slot.seq == seq => {}
                    _ => return,
                }
                let Some(slot) = self.pending.remove(&id) else {
                    return;
                };
                warn!(id = %id, "request timed out");
                if matches!(slot.reply, SlotReply::Connect) {
                    self.fail_connection(CloseReason::Error, GatewayError::Timeout("handshake"));
                } else {
                    self.fail_slot(slot, GatewayError::Timeout("request response"));
                }
            }
        }
    }
}

/// Drive the socket's read half, forwarding decoded frames to the actor.
///
/// A decode failure drops the single frame and keeps reading; a transport
/// failure or close frame ends the loop.
async fn read_loop(mut stream: WsStream, tx: UnboundedSender<Command>, generation: u64) {
    let mut probe_confirmed = false;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Pong(_)) => {
                if !probe_confirmed {
                    probe_confirmed = true;
                    if tx.send(Command::ProbeOk { generation }).is_err() {
                        return;
                    }
                }
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerEnvelope>(&text) {
                Ok(envelope) => {
                    if tx
                        .send(Command::Frame {
                            generation,
                            envelope,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "dropping undecodable frame");
                }
            },
            Ok(Message::Close(_)) => {
                let _ = tx.send(Command::RemoteClosed { generation });
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(Command::TransportFailed {
                    generation,
                    reason: e.to_string(),
                });
                return;
            }
        }
    }
    let _ = tx.send(Command::RemoteClosed { generation });
}
