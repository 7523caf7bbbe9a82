//! Error type shared by every fallible operation in the crate.

use thiserror::Error;
use time::OffsetDateTime;

use crate::cert::serial::Serial;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CaError>;

/// Represents errors that can occur while generating keys, building
/// certificates or operating an authority.
///
/// Chain validation failures are not errors; see
/// [`ValidationResult`](crate::validator::ValidationResult).
#[derive(Debug, Error)]
pub enum CaError {
    /// Key strength below the configured policy minimum.
    #[error("Weak key parameters: {bits}-bit equivalent strength is below the {minimum}-bit minimum")]
    WeakParameter { bits: u32, minimum: u32 },

    /// `not_before` is not strictly earlier than `not_after`.
    #[error("Invalid validity window: not before {not_before} is not earlier than not after {not_after}")]
    InvalidValidityWindow {
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    },

    /// Requested certificate would outlive its issuer.
    #[error("Validity window ends at {not_after}, after the issuer expires at {issuer_not_after}")]
    ValidityWindowExceedsIssuer {
        not_after: OffsetDateTime,
        issuer_not_after: OffsetDateTime,
    },

    /// A lifetime in days reaches past the last representable date.
    #[error("Lifetime of {days} days from {from} runs past the last representable date")]
    LifetimeOutOfRange { from: OffsetDateTime, days: i64 },

    /// Distinguished name failed validation.
    #[error("Malformed distinguished name: {0}")]
    MalformedName(String),

    /// Signing request signature does not verify against its embedded key.
    #[error("Invalid proof of possession for subject {subject}")]
    InvalidProofOfPossession { subject: String },

    /// A signature did not verify.
    #[error("Signature verification failed: {0}")]
    SignatureMismatch(String),

    /// The issuing certificate is not a CA certificate.
    #[error("Issuer {subject} is not a certificate authority")]
    IssuerNotAuthority { subject: String },

    /// The issuing key does not belong to the issuing certificate.
    #[error("Issuer key does not match the certificate of {subject}")]
    IssuerKeyMismatch { subject: String },

    /// `bootstrap` was called on an authority that already has a root.
    #[error("Authority is already bootstrapped with root {subject}")]
    AlreadyBootstrapped { subject: String },

    /// The authority cannot issue in its current lifecycle state.
    #[error("Authority not ready: {0}")]
    AuthorityNotReady(String),

    /// An active certificate already exists for the subject.
    #[error("Subject {subject} already holds active certificate {serial}")]
    DuplicateSubjectPolicyViolation { subject: String, serial: Serial },

    /// The serial was never issued by this authority.
    #[error("Unknown serial number {0}")]
    UnknownSerial(Serial),

    /// The issuance counter cannot grow any further.
    #[error("Serial number space exhausted")]
    SerialSpaceExhausted,

    /// File system failure, passed through unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Encrypted key material could not be decrypted.
    #[error("Failed to decrypt key: {0}")]
    Decryption(String),

    /// Input could not be parsed.
    #[error("Failed to parse input: {0}")]
    Parse(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    Encoding(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Authority state could not be serialized or restored.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<der::Error> for CaError {
    /// Converts a `der::Error` into a `CaError`.
    fn from(err: der::Error) -> Self {
        CaError::Encoding(err.to_string())
    }
}

impl From<pkcs8::Error> for CaError {
    fn from(err: pkcs8::Error) -> Self {
        CaError::Parse(err.to_string())
    }
}

impl From<spki::Error> for CaError {
    fn from(err: spki::Error) -> Self {
        CaError::Parse(err.to_string())
    }
}

impl From<pem::PemError> for CaError {
    fn from(err: pem::PemError) -> Self {
        CaError::Parse(err.to_string())
    }
}

impl From<rsa::Error> for CaError {
    fn from(err: rsa::Error) -> Self {
        CaError::KeyGeneration(err.to_string())
    }
}

impl From<serde_json::Error> for CaError {
    fn from(err: serde_json::Error) -> Self {
        CaError::Persistence(err.to_string())
    }
}

impl From<time::error::ComponentRange> for CaError {
    fn from(err: time::error::ComponentRange) -> Self {
        CaError::Encoding(err.to_string())
    }
}
