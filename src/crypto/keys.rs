//! Raw-key Ed25519 and X25519 helpers
//!
//! Identities store keys as plain 32-byte arrays; these helpers turn them
//! into dalek key types at the point of use and validate lengths on the way.

use crate::error::{ValidationError, VerificationError};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Size of every Ed25519 / X25519 key handled by the crate
pub const KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature
pub const SIGNATURE_SIZE: usize = 64;

/// Secret key bytes, wiped on drop
pub type SecretBytes = Zeroizing<[u8; KEY_SIZE]>;

/// Generate an Ed25519 keypair as (private seed, public key).
pub fn generate_signing_keypair() -> (SecretBytes, [u8; KEY_SIZE]) {
    let signing_key = SigningKey::generate(&mut OsRng);
    (
        Zeroizing::new(signing_key.to_bytes()),
        signing_key.verifying_key().to_bytes(),
    )
}

/// Generate an X25519 keypair as (private key, public key).
pub fn generate_encryption_keypair() -> (SecretBytes, [u8; KEY_SIZE]) {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = X25519PublicKey::from(&secret);
    (Zeroizing::new(secret.to_bytes()), public.to_bytes())
}

/// Convert a byte slice to a fixed-size key, or `None` when the length is wrong.
pub(crate) fn key_array(bytes: &[u8]) -> Option<[u8; KEY_SIZE]> {
    bytes.try_into().ok()
}

fn private_key_array(bytes: &[u8]) -> Result<SecretBytes, ValidationError> {
    key_array(bytes)
        .map(Zeroizing::new)
        .ok_or(ValidationError::InvalidPrivateKeySize {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })
}

/// Ed25519 public key for a private seed
pub fn signing_public_key(private_key: &[u8]) -> Result<[u8; KEY_SIZE], ValidationError> {
    let seed = private_key_array(private_key)?;
    Ok(SigningKey::from_bytes(&seed).verifying_key().to_bytes())
}

/// X25519 public key for a private key
pub fn encryption_public_key(private_key: &[u8]) -> Result<[u8; KEY_SIZE], ValidationError> {
    let secret = StaticSecret::from(*private_key_array(private_key)?);
    Ok(X25519PublicKey::from(&secret).to_bytes())
}

/// Sign `message` with an Ed25519 private seed (plain Ed25519, no pre-hash).
pub fn sign(private_key: &[u8], message: &[u8]) -> Result<[u8; SIGNATURE_SIZE], ValidationError> {
    let seed = private_key_array(private_key)?;
    Ok(SigningKey::from_bytes(&seed).sign(message).to_bytes())
}

/// Verify an Ed25519 signature over `message`.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), VerificationError> {
    let public_key = key_array(public_key).ok_or(VerificationError::InvalidPublicKey)?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|_| VerificationError::InvalidPublicKey)?;
    let signature =
        Signature::from_slice(signature).map_err(|_| VerificationError::MalformedSignature)?;

    verifying_key
        .verify_strict(message, &signature)
        .map_err(|_| VerificationError::InvalidSignature)
}
