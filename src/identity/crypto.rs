//! Cryptographic primitives for device identity.
//!
//! # Algorithms
//!
//! - **Key generation**: Ed25519
//! - **Device id**: lowercase hex SHA-256 of the raw public key bytes
//! - **Transport encoding**: standard base64 for keys and signatures

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Ed25519 seed length (32 bytes)
pub const SEED_LEN: usize = 32;

/// Generate a new Ed25519 signing keypair.
///
/// Uses the OS cryptographically secure random number generator.
pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key)
}

/// Derive the device id from a public key.
///
/// The id is the 64-char lowercase hex SHA-256 digest of the raw 32-byte
/// public key. It is a pure function of the key: the same key always hashes
/// to the same id.
pub fn device_id_for(verifying_key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(verifying_key.as_bytes()))
}

/// Encode a public key as standard base64 for transport.
pub fn public_key_base64(verifying_key: &VerifyingKey) -> String {
    BASE64.encode(verifying_key.as_bytes())
}

/// Sign a payload with the device signing key.
pub fn sign_payload(signing_key: &SigningKey, payload: &[u8]) -> Signature {
    signing_key.sign(payload)
}

/// Verify a signature against a public key, rejecting malleable encodings.
pub fn verify_payload(
    verifying_key: &VerifyingKey,
    payload: &[u8],
    signature: &Signature,
) -> bool {
    verifying_key.verify_strict(payload, signature).is_ok()
}
