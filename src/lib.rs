//! Knock - authenticated WebSocket gateway client for desktop companions
//!
//! Knock is the protocol core behind a desktop companion app: it keeps one
//! persistent connection to a remote gateway, proves control of a
//! per-device Ed25519 key during a challenge-response handshake, and
//! multiplexes chat and alert sessions over that single socket.
//!
//! ## Services
//!
//! - **Identity**: persistent device keypair and signed connection
//!   attestations
//! - **Client**: socket lifecycle, handshake state machine, request
//!   dispatch with per-kind correlation slots
//! - **Session routing**: typed session keys, cumulative-text aggregation,
//!   one-shot chat completions and a FIFO alert queue
//!
//! ## Usage
//!
//! ```ignore
//! use knock::{ClientConfig, DeviceIdentity, FileKeyStore, GatewayClient, MemoryKeyStore};
//!
//! let store = FileKeyStore::default_path()
//!     .map(FileKeyStore::new)
//!     .expect("no user data directory");
//! let identity = DeviceIdentity::initialize(&store);
//!
//! let config = ClientConfig::new("https://gateway.example.com", "pizza")
//!     .with_token("bearer-token")
//!     .with_alert_feeds(vec!["agent:main:ops:incidents".to_string()]);
//!
//! let (client, mut alerts) = GatewayClient::spawn(config, identity)?;
//! let reply = client.send("good morning").await?;
//! # Ok::<(), knock::GatewayError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod wire;

pub use client::{AlertReceiver, CloseReason, ConnectionPhase, GatewayClient};
pub use config::ClientConfig;
pub use error::{GatewayError, Result};
pub use identity::{AttestationRequest, DeviceIdentity, FileKeyStore, KeyStore, MemoryKeyStore};
pub use session::{AlertMessage, SessionKey};
pub use wire::ClientInfo;
