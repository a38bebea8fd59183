//! Persistent storage for the device signing key.
//!
//! The key seed is the one secret this crate owns. [`FileKeyStore`] keeps it
//! in a mode-0600 file under the user data directory; [`MemoryKeyStore`]
//! holds it for the process lifetime only and backs the degraded mode used
//! when disk storage is unavailable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{GatewayError, Result};
use crate::identity::crypto::SEED_LEN;

/// Storage seam for the 32-byte Ed25519 seed.
pub trait KeyStore: Send + Sync {
    /// Load the persisted seed, or `None` if no key has been stored yet.
    fn load(&self) -> Result<Option<[u8; SEED_LEN]>>;

    /// Persist the seed, replacing any previous one.
    fn save(&self, seed: &[u8; SEED_LEN]) -> Result<()>;

    /// Remove the persisted seed.
    fn delete(&self) -> Result<()>;
}

/// Key store backed by a single file under the user data directory.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Create a store at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default key path: `<user data dir>/knock/device_key`.
    ///
    /// Returns `None` when the platform has no user data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("knock").join("device_key"))
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<[u8; SEED_LEN]>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GatewayError::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let seed: [u8; SEED_LEN] = bytes.as_slice().try_into().map_err(|_| {
            GatewayError::Storage(format!(
                "key file {} has {} bytes, expected {SEED_LEN}",
                self.path.display(),
                bytes.len()
            ))
        })?;
        Ok(Some(seed))
    }

    fn save(&self, seed: &[u8; SEED_LEN]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GatewayError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(&self.path, seed).map_err(|e| {
            GatewayError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })?;

        // Owner-only read/write; the seed is the device's secret.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).map_err(
                |e| {
                    GatewayError::Storage(format!(
                        "failed to set permissions on {}: {e}",
                        self.path.display()
                    ))
                },
            )?;
        }

        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::Storage(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Process-lifetime key store with no persistence.
#[derive(Default)]
pub struct MemoryKeyStore {
    seed: Mutex<Option<[u8; SEED_LEN]>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<[u8; SEED_LEN]>> {
        Ok(*self.seed.lock().expect("key store mutex poisoned"))
    }

    fn save(&self, seed: &[u8; SEED_LEN]) -> Result<()> {
        *self.seed.lock().expect("key store mutex poisoned") = Some(*seed);
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.seed.lock().expect("key store mutex poisoned") = None;
        Ok(())
    }
}
