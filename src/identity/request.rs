//! Replay-protected signed requests

use super::derive_agent_id;
use crate::crypto::keys;
use crate::error::{ValidationError, VerificationError};
use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use rand::{rngs::OsRng, RngCore};

/// Size of the per-request random nonce
pub const NONCE_SIZE: usize = 16;

/// A payload signed by an agent.
///
/// The signature covers the canonical encoding returned by
/// [`SignedRequest::signing_payload`]: each of `payload`, `agent_id` and the
/// RFC 3339 timestamp (microsecond precision, `Z` suffix) as
/// `u32 big-endian length || bytes`, followed by the raw 16-byte nonce.
/// Signatures are plain Ed25519 over those bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    payload: Vec<u8>,
    agent_id: String,
    timestamp: DateTime<Utc>,
    nonce: [u8; NONCE_SIZE],
    signature: Vec<u8>,
}

impl SignedRequest {
    /// Assemble a request from its parts, validating each field.
    pub fn new(
        payload: impl Into<Vec<u8>>,
        agent_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        nonce: &[u8],
        signature: impl Into<Vec<u8>>,
    ) -> Result<Self, ValidationError> {
        let payload = payload.into();
        let agent_id = agent_id.into();
        let signature = signature.into();

        if payload.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }
        if agent_id.is_empty() {
            return Err(ValidationError::MissingAgentId);
        }
        let nonce: [u8; NONCE_SIZE] =
            nonce
                .try_into()
                .map_err(|_| ValidationError::InvalidNonceSize {
                    expected: NONCE_SIZE,
                    actual: nonce.len(),
                })?;
        if nonce == [0u8; NONCE_SIZE] {
            return Err(ValidationError::ZeroNonce);
        }
        if signature.is_empty() {
            return Err(ValidationError::EmptySignature);
        }

        Ok(Self {
            payload,
            agent_id,
            timestamp,
            nonce,
            signature,
        })
    }

    /// Sign `payload` now with a fresh random nonce.
    pub fn sign(
        payload: impl Into<Vec<u8>>,
        agent_id: &str,
        private_key: &[u8],
    ) -> Result<Self, ValidationError> {
        let payload = payload.into();
        // Truncated to what the canonical timestamp encoding can carry
        let timestamp = truncate_to_micros(Utc::now());
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let message = canonical_bytes(&payload, agent_id, &timestamp, &nonce);
        let signature = keys::sign(private_key, &message)?;

        Self::new(payload, agent_id, timestamp, &nonce, signature.to_vec())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The exact bytes covered by the signature
    pub fn signing_payload(&self) -> Vec<u8> {
        canonical_bytes(&self.payload, &self.agent_id, &self.timestamp, &self.nonce)
    }

    /// Verify against the signer's public key.
    ///
    /// The agent id must derive from `public_key`; the signature must cover
    /// the recomputed canonical bytes.
    pub fn verify(&self, public_key: &[u8]) -> Result<(), VerificationError> {
        let expected = derive_agent_id(public_key);
        if expected != self.agent_id {
            return Err(VerificationError::AgentMismatch {
                expected,
                actual: self.agent_id.clone(),
            });
        }
        keys::verify(public_key, &self.signing_payload(), &self.signature)
    }
}

fn truncate_to_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(time)
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn canonical_bytes(
    payload: &[u8],
    agent_id: &str,
    timestamp: &DateTime<Utc>,
    nonce: &[u8; NONCE_SIZE],
) -> Vec<u8> {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut out =
        Vec::with_capacity(12 + payload.len() + agent_id.len() + timestamp.len() + NONCE_SIZE);
    push_field(&mut out, payload);
    push_field(&mut out, agent_id.as_bytes());
    push_field(&mut out, timestamp.as_bytes());
    out.extend_from_slice(nonce);
    out
}
