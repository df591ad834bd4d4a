//! Arbor security error types
//!
//! Every failure in the core is a structured value. Construction validators,
//! sanitizers, delegation and authorization each have their own closed set of
//! variants so callers can match on the precise cause.

use thiserror::Error;

/// Arbor security error type
#[derive(Error, Debug)]
pub enum Error {
    /// Construction-time validation failure
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Sanitizer failure
    #[error("Sanitizer error: {0}")]
    Sanitize(#[from] SanitizeError),

    /// Capability delegation failure
    #[error("Delegation error: {0}")]
    Delegation(#[from] DelegationError),

    /// Capability authorization failure
    #[error("Authorization denied: {0}")]
    Authorization(#[from] AuthorizationDenied),

    /// Signed request verification failure
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Arbor security operations
pub type Result<T> = std::result::Result<T, Error>;

/// Validation errors raised while constructing capabilities, identities
/// and signed requests. Validators short-circuit on the first failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid resource uri: {0}")]
    InvalidResourceUri(String),

    #[error("invalid principal id: {0}")]
    InvalidPrincipalId(String),

    #[error("expires_at must be after granted_at")]
    ExpiresBeforeGranted,

    #[error("invalid delegation depth {0} (must be 0..={max})", max = crate::capability::MAX_DELEGATION_DEPTH)]
    InvalidDelegationDepth(u8),

    #[error("invalid public key size: expected {expected} bytes, got {actual}")]
    InvalidPublicKeySize { expected: usize, actual: usize },

    #[error("invalid private key size: expected {expected} bytes, got {actual}")]
    InvalidPrivateKeySize { expected: usize, actual: usize },

    #[error("agent id {actual} does not match public key (expected {expected})")]
    AgentIdMismatch { expected: String, actual: String },

    #[error("invalid agent id: {0}")]
    InvalidAgentId(String),

    #[error("invalid key version {0} (must be >= 1)")]
    InvalidKeyVersion(u32),

    #[error("name must not be empty")]
    EmptyName,

    #[error("payload must not be empty")]
    EmptyPayload,

    #[error("agent id is required")]
    MissingAgentId,

    #[error("invalid nonce size: expected {expected} bytes, got {actual}")]
    InvalidNonceSize { expected: usize, actual: usize },

    #[error("nonce is all zeroes")]
    ZeroNonce,

    #[error("signature must not be empty")]
    EmptySignature,

    #[error("cannot move identity from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("{0} private key does not match its public key")]
    KeyPairMismatch(&'static str),
}

/// Errors returned by sanitizers and the sanitizer registry.
///
/// Chains surface these untouched, including the pattern list behind a
/// detection failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("unknown sanitizer: {0}")]
    UnknownSanitizer(String),

    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("{sanitizer} sanitizer expects {expected} input")]
    UnsupportedInput {
        sanitizer: &'static str,
        expected: &'static str,
    },

    #[error("identifier not allowed: {0}")]
    IdentifierNotAllowed(String),

    #[error("null byte in input")]
    NullByteInInput,

    #[error("path traversal: {0}")]
    PathTraversal(String),

    #[error("blocked scheme: {0}")]
    BlockedScheme(String),

    #[error("url has no host")]
    MissingHost,

    #[error("private address: {0}")]
    PrivateIp(String),

    #[error("metadata endpoint: {0}")]
    MetadataEndpoint(String),

    #[error("blocked port: {0}")]
    BlockedPort(u16),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("prompt injection detected: {}", .0.join(", "))]
    PromptInjectionDetected(Vec<String>),

    #[error("maximum nesting depth {0} exceeded")]
    MaxDepthExceeded(usize),

    #[error("maximum element count exceeded: {actual} > {limit}")]
    MaxSizeExceeded { actual: usize, limit: usize },

    #[error("input too large: {actual} bytes > {limit}")]
    TooLarge { actual: usize, limit: usize },

    #[error("json decode error: {0}")]
    JsonDecodeError(String),

    #[error("binary term decode error: {0}")]
    BinaryDecodeError(String),

    #[error("unknown atom: {0}")]
    UnknownAtom(String),
}

/// Errors raised when deriving a child capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("delegation depth exhausted")]
    DepthExhausted,

    #[error("{requested} is outside the delegated scope {granted}")]
    ScopeEscalation { granted: String, requested: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Reasons an authorization check refuses a capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDenied {
    #[error("capability {0} has expired")]
    Expired(String),

    #[error("capability belongs to {expected}, not {actual}")]
    PrincipalMismatch { expected: String, actual: String },

    #[error("capability does not grant {0}")]
    ResourceNotGranted(String),

    #[error("operation {0} is not permitted by capability constraints")]
    OperationNotPermitted(String),

    #[error("capability has been revoked: {0}")]
    Revoked(String),

    #[error("trust profile is frozen: {0}")]
    Frozen(String),

    #[error("action {action} requires tier {required}, agent is {actual}")]
    InsufficientTier {
        action: String,
        required: String,
        actual: String,
    },

    #[error("action {0} is not allowed at any tier")]
    ActionNotAllowed(String),
}

/// Signed request verification failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("signature verification failed")]
    InvalidSignature,

    #[error("malformed signature")]
    MalformedSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("request signed by {actual}, expected {expected}")]
    AgentMismatch { expected: String, actual: String },

    #[error("request is {age_secs}s old (limit {limit_secs}s)")]
    StaleRequest { age_secs: i64, limit_secs: i64 },

    #[error("request timestamp is {ahead_secs}s in the future (limit {limit_secs}s)")]
    FutureRequest { ahead_secs: i64, limit_secs: i64 },

    #[error("nonce has already been used")]
    ReplayedNonce,

    #[error("identity is {0}")]
    InactiveIdentity(String),
}
