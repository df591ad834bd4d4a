//! Cryptographic utilities for agent identities
//!
//! Key handling lives in [`keys`]. This module adds symmetric AES-256-GCM
//! encryption and sealed boxes: anonymous encryption to an identity's
//! X25519 public key, where only the holder of the matching secret can open.

pub mod keys;

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// AES-256-GCM encryption key size
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// Size of the ephemeral public key at the front of a sealed box
pub const EPHEMERAL_KEY_SIZE: usize = 32;

/// AES-GCM authentication tag size
const TAG_SIZE: usize = 16;

/// HKDF info string binding derived keys to the sealed-box construction
const SEALED_BOX_INFO: &[u8] = b"arbor-sealed-box-v1";

/// Encrypt data using AES-256-GCM
pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    // Prepend nonce to ciphertext
    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt data using AES-256-GCM
pub fn decrypt(key: &[u8; KEY_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
    let encrypted = &ciphertext[NONCE_SIZE..];

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
}

/// Derive the sealed-box AES key from an X25519 shared secret.
///
/// Both public keys go into the salt so a box cannot be replayed against a
/// different recipient.
fn derive_box_key(
    shared_secret: &[u8],
    ephemeral_public: &[u8; EPHEMERAL_KEY_SIZE],
    recipient_public: &[u8; EPHEMERAL_KEY_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut salt = [0u8; EPHEMERAL_KEY_SIZE * 2];
    salt[..EPHEMERAL_KEY_SIZE].copy_from_slice(ephemeral_public);
    salt[EPHEMERAL_KEY_SIZE..].copy_from_slice(recipient_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(SEALED_BOX_INFO, &mut key[..])
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

/// Encrypt `plaintext` to a recipient's X25519 public key.
///
/// Layout: `ephemeral_public(32) || nonce(12) || ciphertext+tag`.
pub fn seal(plaintext: &[u8], recipient_public: &[u8; EPHEMERAL_KEY_SIZE]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(*recipient_public));

    if !shared.was_contributory() {
        return Err(Error::Crypto("Recipient key is a low-order point".to_string()));
    }

    let key = derive_box_key(shared.as_bytes(), &ephemeral_public, recipient_public)?;
    let body = encrypt(&key, plaintext)?;

    let mut sealed = Vec::with_capacity(EPHEMERAL_KEY_SIZE + body.len());
    sealed.extend_from_slice(&ephemeral_public);
    sealed.extend_from_slice(&body);
    Ok(sealed)
}

/// Open a sealed box with the recipient's X25519 secret key.
pub fn open(sealed: &[u8], recipient_secret: &[u8; EPHEMERAL_KEY_SIZE]) -> Result<Vec<u8>> {
    if sealed.len() < EPHEMERAL_KEY_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Sealed box too short".to_string()));
    }

    let (ephemeral_bytes, body) = sealed.split_at(EPHEMERAL_KEY_SIZE);
    let mut ephemeral_public = [0u8; EPHEMERAL_KEY_SIZE];
    ephemeral_public.copy_from_slice(ephemeral_bytes);

    let secret = StaticSecret::from(*recipient_secret);
    let recipient_public = X25519PublicKey::from(&secret).to_bytes();
    let shared = secret.diffie_hellman(&X25519PublicKey::from(ephemeral_public));

    if !shared.was_contributory() {
        return Err(Error::Crypto("Ephemeral key is a low-order point".to_string()));
    }

    let key = derive_box_key(shared.as_bytes(), &ephemeral_public, &recipient_public)?;
    decrypt(&key, body)
}
