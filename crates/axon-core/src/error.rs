//! Error types for axon-core.

use thiserror::Error;

/// Errors from armor parsing, envelope handling, and identity derivation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed armor: {0}")]
    MalformedArmor(String),

    #[error("unexpected armor label: expected {expected}, got {got}")]
    UnexpectedLabel { expected: String, got: String },

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("public key has no encryption subkey")]
    NoEncryptionSubkey,

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("not a recipient of this message")]
    NotRecipient,

    #[error("decryption failed")]
    DecryptFailed,

    #[error("encryption failed: {0}")]
    EncryptFailed(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("timestamp out of range")]
    TimestampOutOfRange,
}

/// Validation errors for record content and metadata.
///
/// These decide the fate of a single record: the record is rejected, the
/// batch it arrived in stops, and the node's own data is untouched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("content must be signed")]
    MissingSignature,

    #[error("content must be encrypted")]
    MissingEncryption,

    #[error("content must not be encrypted")]
    UnexpectedEncryption,

    #[error("content must not have recipients")]
    UnexpectedRecipients,

    #[error("supplied sender {supplied} does not match content sender {derived}")]
    SenderMismatch { supplied: String, derived: String },

    #[error("supplied recipients do not match content recipients")]
    RecipientsMismatch,

    #[error("supplied fingerprint {supplied} does not match public key fingerprint {derived}")]
    FingerprintMismatch { supplied: String, derived: String },

    #[error("parent bulletin {0} not found")]
    MissingParent(String),

    #[error("reply topic {topic:?} does not match parent topic {parent_topic:?}")]
    TopicMismatch { topic: String, parent_topic: String },

    #[error("invalid content: {0}")]
    InvalidContent(#[from] CoreError),
}
