//! Device identity: stable id plus signed connection attestations.

use ed25519_dalek::SigningKey;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result};
use crate::identity::crypto;
use crate::identity::store::KeyStore;

/// Attestation version prefix. Bumping it invalidates older gateways.
const ATTESTATION_VERSION: &str = "v2";

/// Inputs to one connection attestation.
///
/// `scopes` are joined in the order given; reordering them changes the
/// signed bytes and therefore the signature.
#[derive(Debug, Clone)]
pub struct AttestationRequest<'a> {
    pub client_id: &'a str,
    pub client_mode: &'a str,
    pub role: &'a str,
    pub scopes: &'a [String],
    pub signed_at_ms: i64,
    pub token: &'a str,
    pub nonce: &'a str,
}

/// The device's signing identity.
///
/// Construct once per process via [`DeviceIdentity::initialize`] and pass by
/// reference; the keypair stays stable across restarts unless explicitly
/// [`reset`](DeviceIdentity::reset).
pub struct DeviceIdentity {
    signing_key: SigningKey,
    device_id: String,
    persisted: bool,
}

impl DeviceIdentity {
    /// Ensure a keypair exists, loading it from the store or generating and
    /// persisting a new one.
    ///
    /// Idempotent: repeated calls against the same store yield the same
    /// identity. Call this before any network operation so that storage
    /// access (which may prompt the user on some platforms) cannot race a
    /// time-sensitive handshake.
    ///
    /// Storage unavailability degrades to an in-memory key for the process
    /// lifetime: device-identity continuity across restarts is lost, which
    /// is logged as a warning.
    pub fn initialize(store: &dyn KeyStore) -> Self {
        match store.load() {
            Ok(Some(seed)) => {
                let identity = Self::from_seed(seed, true);
                debug!(device_id = %identity.device_id, "loaded device identity");
                identity
            }
            Ok(None) => {
                let (signing_key, _) = crypto::generate_keypair();
                let seed = signing_key.to_bytes();
                let persisted = match store.save(&seed) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            error = %e,
                            "key storage unavailable; device identity will not survive restart"
                        );
                        false
                    }
                };
                let identity = Self::from_seed(seed, persisted);
                debug!(device_id = %identity.device_id, persisted, "generated device identity");
                identity
            }
            Err(e) => {
                // Do not overwrite whatever is on disk; run ephemeral.
                warn!(
                    error = %e,
                    "failed to load device key; falling back to in-memory identity"
                );
                let (signing_key, _) = crypto::generate_keypair();
                Self::from_seed(signing_key.to_bytes(), false)
            }
        }
    }

    fn from_seed(seed: [u8; crypto::SEED_LEN], persisted: bool) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let device_id = crypto::device_id_for(&signing_key.verifying_key());
        Self {
            signing_key,
            device_id,
            persisted,
        }
    }

    /// Discard the current keypair and generate a fresh one, persisting it.
    pub fn reset(&mut self, store: &dyn KeyStore) -> Result<()> {
        store.delete()?;
        let (signing_key, _) = crypto::generate_keypair();
        let seed = signing_key.to_bytes();
        store.save(&seed)?;
        *self = Self::from_seed(seed, true);
        Ok(())
    }

    /// The 64-char lowercase hex SHA-256 digest of the raw public key.
    ///
    /// Deterministic and independent of signing operations.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The raw public key, standard base64.
    pub fn public_key_base64(&self) -> String {
        crypto::public_key_base64(&self.signing_key.verifying_key())
    }

    /// Whether the key survives process restart.
    pub fn is_persistent(&self) -> bool {
        self.persisted
    }

    /// Sign a connection attestation, returning the base64 signature.
    ///
    /// The signature is locally verified against the public key before it is
    /// returned; a failure here means the attestation must not be sent.
    pub fn sign_attestation(&self, request: &AttestationRequest<'_>) -> Result<String> {
        let payload = self.attestation_payload(request);
        let signature = crypto::sign_payload(&self.signing_key, payload.as_bytes());

        if !crypto::verify_payload(
            &self.signing_key.verifying_key(),
            payload.as_bytes(),
            &signature,
        ) {
            return Err(GatewayError::Signing(
                "attestation signature failed local verification".to_string(),
            ));
        }

        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
        Ok(BASE64.encode(signature.to_bytes()))
    }

    /// The canonical pipe-delimited string covered by the signature.
    pub(crate) fn attestation_payload(&self, request: &AttestationRequest<'_>) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            ATTESTATION_VERSION,
            self.device_id,
            request.client_id,
            request.client_mode,
            request.role,
            request.scopes.join(","),
            request.signed_at_ms,
            request.token,
            request.nonce,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::store::MemoryKeyStore;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use ed25519_dalek::{Signature, VerifyingKey};

    fn request<'a>(scopes: &'a [String]) -> AttestationRequest<'a> {
        AttestationRequest {
            client_id: "cli",
            client_mode: "cli",
            role: "operator",
            scopes,
            signed_at_ms: 1000,
            token: "tok123",
            nonce: "abc",
        }
    }

    fn verify(identity: &DeviceIdentity, payload: &str, signature_b64: &str) -> bool {
        let key_bytes: [u8; 32] = BASE64
            .decode(identity.public_key_base64())
            .unwrap()
            .try_into()
            .unwrap();
        let verifying_key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        let sig_bytes: [u8; 64] = BASE64.decode(signature_b64).unwrap().try_into().unwrap();
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key
            .verify_strict(payload.as_bytes(), &signature)
            .is_ok()
    }

    #[test]
    fn test_canonical_payload_shape() {
        let store = MemoryKeyStore::new();
        let identity = DeviceIdentity::initialize(&store);
        let scopes = vec!["operator.read".to_string(), "operator.write".to_string()];

        let payload = identity.attestation_payload(&request(&scopes));
        assert_eq!(
            payload,
            format!(
                "v2|{}|cli|cli|operator|operator.read,operator.write|1000|tok123|abc",
                identity.device_id()
            )
        );
    }

    #[test]
    fn test_signature_verifies_for_exact_payload() {
        let store = MemoryKeyStore::new();
        let identity = DeviceIdentity::initialize(&store);
        let scopes = vec!["operator.read".to_string()];

        let req = request(&scopes);
        let signature = identity.sign_attestation(&req).unwrap();
        let payload = identity.attestation_payload(&req);

        assert!(verify(&identity, &payload, &signature));
        assert!(!verify(&identity, &format!("{payload}x"), &signature));
    }

    #[test]
    fn test_signature_is_deterministic_and_input_sensitive() {
        let store = MemoryKeyStore::new();
        let identity = DeviceIdentity::initialize(&store);
        let scopes = vec!["operator.read".to_string()];

        let base = identity.sign_attestation(&request(&scopes)).unwrap();
        let again = identity.sign_attestation(&request(&scopes)).unwrap();
        assert_eq!(base, again);

        let mut other_nonce = request(&scopes);
        other_nonce.nonce = "xyz";
        assert_ne!(base, identity.sign_attestation(&other_nonce).unwrap());

        let mut other_ts = request(&scopes);
        other_ts.signed_at_ms = 1001;
        assert_ne!(base, identity.sign_attestation(&other_ts).unwrap());
    }

    #[test]
    fn test_device_id_stable_across_signing() {
        let store = MemoryKeyStore::new();
        let identity = DeviceIdentity::initialize(&store);
        let scopes = vec!["operator.read".to_string()];

        let id_before = identity.device_id().to_string();
        identity.sign_attestation(&request(&scopes)).unwrap();
        identity.sign_attestation(&request(&scopes)).unwrap();
        assert_eq!(identity.device_id(), id_before);
        assert_eq!(id_before.len(), 64);
    }

    #[test]
    fn test_initialize_is_idempotent_per_store() {
        let store = MemoryKeyStore::new();
        let first = DeviceIdentity::initialize(&store);
        let second = DeviceIdentity::initialize(&store);
        assert_eq!(first.device_id(), second.device_id());
        assert!(first.is_persistent());
    }

    #[test]
    fn test_storage_failure_degrades_to_memory() {
        struct BrokenStore;
        impl KeyStore for BrokenStore {
            fn load(&self) -> crate::Result<Option<[u8; 32]>> {
                Err(GatewayError::Storage("disk on fire".to_string()))
            }
            fn save(&self, _: &[u8; 32]) -> crate::Result<()> {
                Err(GatewayError::Storage("disk on fire".to_string()))
            }
            fn delete(&self) -> crate::Result<()> {
                Err(GatewayError::Storage("disk on fire".to_string()))
            }
        }

        let identity = DeviceIdentity::initialize(&BrokenStore);
        assert!(!identity.is_persistent());
        // Signing still works on the ephemeral key
        let scopes = vec!["operator.read".to_string()];
        assert!(identity.sign_attestation(&request(&scopes)).is_ok());
    }

    #[test]
    fn test_reset_rotates_key() {
        let store = MemoryKeyStore::new();
        let mut identity = DeviceIdentity::initialize(&store);
        let old_id = identity.device_id().to_string();

        identity.reset(&store).unwrap();
        assert_ne!(identity.device_id(), old_id);

        // The rotated key is what subsequent initializes load
        let reloaded = DeviceIdentity::initialize(&store);
        assert_eq!(reloaded.device_id(), identity.device_id());
    }
}
