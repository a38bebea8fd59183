//! Gateway protocol client.
//!
//! One [`GatewayClient`] owns one physical connection. The handle is cheap
//! to clone and safe to call from any task; every call is forwarded onto
//! the connection actor, which serializes all state mutation. Results come
//! back as futures and channels; nothing here knows or cares about UI
//! threads.

mod actor;

use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::error::{GatewayError, Result};
use crate::identity::DeviceIdentity;
use crate::session::{AlertMessage, SessionRouter};

use actor::{Command, ConnectionActor};

/// FIFO queue of completed alert messages.
pub type AlertReceiver = mpsc::UnboundedReceiver<AlertMessage>;

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No connection attempt yet
    Idle,
    /// Socket opening, liveness probe outstanding
    Connecting,
    /// Probe confirmed, waiting for the challenge event
    AwaitingChallenge,
    /// Signed `connect` request in flight
    Handshaking,
    /// Handshake accepted; requests dispatch immediately
    Ready,
    /// Connection closed; only an explicit new call reconnects
    Closed(CloseReason),
}

/// Why a connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport failure, probe/handshake timeout, or handshake rejection
    Error,
    /// The gateway closed the socket
    Remote,
    /// Explicit [`GatewayClient::disconnect`]
    Local,
}

/// Handle to a gateway connection.
#[derive(Clone)]
pub struct GatewayClient {
    tx: mpsc::UnboundedSender<Command>,
}

impl GatewayClient {
    /// Validate the config and spawn the connection actor.
    ///
    /// No socket is opened yet; the first [`send`](Self::send) or
    /// [`connect_for_alerts`](Self::connect_for_alerts) connects. The
    /// returned receiver is the alert display queue.
    pub fn spawn(config: ClientConfig, identity: DeviceIdentity) -> Result<(Self, AlertReceiver)> {
        config.validate()?;
        let (router, alerts_rx) =
            SessionRouter::new(config.companion.clone(), config.ack_marker.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = ConnectionActor::new(config, identity, router, rx, tx.downgrade());
        tokio::spawn(actor.run());
        Ok((Self { tx }, alerts_rx))
    }

    /// Establish the connection and run the handshake, resolving once the
    /// connection is Ready.
    ///
    /// [`send`](Self::send) and
    /// [`connect_for_alerts`](Self::connect_for_alerts) connect on demand;
    /// calling this first merely front-loads the handshake.
    pub async fn connect(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Connect { reply: reply_tx })?;
        reply_rx.await.map_err(|_| GatewayError::Closed)?
    }

    /// Send a chat message to the companion channel and await the completed
    /// reply text.
    ///
    /// Connects (and handshakes) first if needed; while not Ready, at most
    /// one message is held queued and a second call replaces it; the
    /// superseded call resolves with [`GatewayError::Superseded`]. The same
    /// last-write-wins policy applies to a still-unresolved previous send.
    pub async fn send(&self, message: impl Into<String>) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::SendChat {
            message: message.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| GatewayError::Closed)?
    }

    /// Establish the connection and subscribe the configured alert feeds.
    ///
    /// Resolves once the subscription is acknowledged. Completed alert
    /// messages are then pushed to the queue returned by
    /// [`spawn`](Self::spawn).
    pub async fn connect_for_alerts(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::ConnectForAlerts { reply: reply_tx })?;
        reply_rx.await.map_err(|_| GatewayError::Closed)?
    }

    /// Send a message on the first configured alert feed.
    ///
    /// Requires an established connection (see
    /// [`connect_for_alerts`](Self::connect_for_alerts)); resolves when the
    /// gateway acknowledges the request.
    pub async fn send_alert(&self, message: impl Into<String>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::SendAlert {
            message: message.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| GatewayError::Closed)?
    }

    /// Close the connection with a normal "going away" closure.
    ///
    /// Every exchange still awaiting completion fails with
    /// [`GatewayError::Closed`], so nothing is left permanently unresolved.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Disconnect { reply: reply_tx })?;
        reply_rx.await.map_err(|_| GatewayError::Closed)
    }

    /// Current connection phase.
    pub async fn phase(&self) -> Result<ConnectionPhase> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Phase { reply: reply_tx })?;
        reply_rx.await.map_err(|_| GatewayError::Closed)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| GatewayError::Closed)
    }
}
