//! Device identity management.
//!
//! Every installation owns a persistent Ed25519 keypair. The public key
//! hashes to a stable device id; the private key signs a per-connection
//! attestation proving control of the device during the gateway handshake.
//!
//! The keypair is generated on first use and persisted through a
//! [`KeyStore`]. When storage is unavailable the identity degrades to an
//! in-memory key for the process lifetime: continuity across restarts is
//! lost and a warning is logged, never silently swallowed.

pub mod crypto;
pub mod manager;
pub mod store;

pub use manager::{AttestationRequest, DeviceIdentity};
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore};
