//! Certificate chain validation.
//!
//! A failed validation is an ordinary outcome, so [`ChainValidator::validate`]
//! returns a [`ValidationResult`] rather than an error.

use std::fmt;

use time::OffsetDateTime;
use tracing::debug;

use crate::authority::revocation::RevocationList;
use crate::cert::Certificate;
use crate::cert::extensions::BasicConstraints;
use crate::cert::serial::Serial;
use crate::config::AuthorityConfig;

const DEFAULT_MAX_DEPTH: usize = 8;

/// Why a chain was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    /// More certificates than the depth limit, including cyclic input.
    ChainTooLong,
    /// No path ends at a trusted self-signed root.
    UntrustedRoot,
    /// Issuers with the right name exist but none produced the signature.
    SignatureMismatch,
    /// The issuing certificate may not sign certificates.
    NotAnAuthority,
    Expired,
    NotYetValid,
    Revoked,
    /// A certificate could not be decoded.
    Malformed,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvalidReason::ChainTooLong => "chain too long",
            InvalidReason::UntrustedRoot => "untrusted root",
            InvalidReason::SignatureMismatch => "signature mismatch",
            InvalidReason::NotAnAuthority => "issuer is not an authority",
            InvalidReason::Expired => "expired",
            InvalidReason::NotYetValid => "not yet valid",
            InvalidReason::Revoked => "revoked",
            InvalidReason::Malformed => "malformed certificate",
        };
        f.write_str(text)
    }
}

/// Outcome of a chain validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The chain from the leaf (first) to the trusted root (last).
    Valid { chain: Vec<Certificate> },
    /// The first failing certificate, counting from the leaf. `serial` is
    /// `None` only when that certificate's serial itself is unreadable.
    Invalid {
        reason: InvalidReason,
        serial: Option<Serial>,
    },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            ValidationResult::Valid { .. } => None,
            ValidationResult::Invalid { reason, .. } => Some(*reason),
        }
    }

    pub fn chain(&self) -> Option<&[Certificate]> {
        match self {
            ValidationResult::Valid { chain } => Some(chain),
            ValidationResult::Invalid { .. } => None,
        }
    }

    fn invalid(reason: InvalidReason, cert: &Certificate) -> Self {
        ValidationResult::Invalid {
            reason,
            serial: cert.serial().ok(),
        }
    }
}

/// Walks a certificate up to a trusted root.
///
/// Holds only immutable inputs, so one validator can serve any number of
/// threads at once.
///
/// ```no_run
/// # use certkit_ca::cert::Certificate;
/// # use certkit_ca::validator::{ChainValidator, InvalidReason};
/// # fn check(leaf: Certificate, intermediate: Certificate, root: Certificate) {
/// let result = ChainValidator::new()
///     .with_intermediates([intermediate])
///     .validate(&leaf, &[root], time::OffsetDateTime::now_utc());
/// if let Some(reason) = result.reason() {
///     eprintln!("rejected: {reason}");
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChainValidator {
    intermediates: Vec<Certificate>,
    revocations: Vec<RevocationList>,
    max_depth: usize,
}

impl Default for ChainValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainValidator {
    pub fn new() -> Self {
        Self {
            intermediates: Vec::new(),
            revocations: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn from_config(config: &AuthorityConfig) -> Self {
        Self::new().with_max_depth(config.max_chain_depth)
    }

    /// Untrusted certificates that may sit between the leaf and a root.
    pub fn with_intermediates(mut self, intermediates: impl IntoIterator<Item = Certificate>) -> Self {
        self.intermediates.extend(intermediates);
        self
    }

    /// Revocations to consult for certificates issued by `list.issuer()`.
    pub fn with_revocations(mut self, list: RevocationList) -> Self {
        self.revocations.push(list);
        self
    }

    /// Maximum number of certificates in a chain, root included.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Validates `leaf` at time `at` against `trusted_roots`.
    ///
    /// For each certificate, starting at the leaf: find an issuer by name
    /// among the roots and then the intermediates whose key verifies the
    /// signature, require that issuer to be a CA, check the validity window
    /// and finally the revocation lists of that issuer. A self-issued
    /// certificate ends the walk and must be one of `trusted_roots`.
    pub fn validate(
        &self,
        leaf: &Certificate,
        trusted_roots: &[Certificate],
        at: OffsetDateTime,
    ) -> ValidationResult {
        let mut chain = vec![leaf.clone()];
        let mut current = leaf.clone();

        loop {
            if chain.len() > self.max_depth {
                debug!(depth = chain.len(), max = self.max_depth, "chain exceeds depth limit");
                return ValidationResult::invalid(InvalidReason::ChainTooLong, &current);
            }
            if current.serial().is_err() || current.find_extension::<BasicConstraints>().is_err() {
                return ValidationResult::invalid(InvalidReason::Malformed, &current);
            }

            if current.is_self_issued() {
                return self.check_root(&current, trusted_roots, at, chain);
            }

            let issuer = match self.find_issuer(&current, trusted_roots) {
                Ok(issuer) => issuer,
                Err(reason) => return ValidationResult::invalid(reason, &current),
            };
            if !issuer.is_ca() {
                return ValidationResult::invalid(InvalidReason::NotAnAuthority, &current);
            }
            if let Some(reason) = window_violation(&current, at) {
                return ValidationResult::invalid(reason, &current);
            }
            match self.is_revoked(&current) {
                Ok(false) => {}
                Ok(true) => return ValidationResult::invalid(InvalidReason::Revoked, &current),
                Err(reason) => return ValidationResult::invalid(reason, &current),
            }

            debug!(
                serial = ?current.serial().ok(),
                issuer_serial = ?issuer.serial().ok(),
                "verified chain link"
            );
            chain.push(issuer.clone());
            current = issuer.clone();
        }
    }

    fn check_root(
        &self,
        root: &Certificate,
        trusted_roots: &[Certificate],
        at: OffsetDateTime,
        chain: Vec<Certificate>,
    ) -> ValidationResult {
        if !trusted_roots.contains(root) {
            return ValidationResult::invalid(InvalidReason::UntrustedRoot, root);
        }
        let self_signed = root
            .public_key()
            .and_then(|key| root.verify_signature(&key))
            .is_ok();
        if !self_signed {
            return ValidationResult::invalid(InvalidReason::UntrustedRoot, root);
        }
        if let Some(reason) = window_violation(root, at) {
            return ValidationResult::invalid(reason, root);
        }
        debug!(serial = ?root.serial().ok(), length = chain.len(), "chain reached trusted root");
        ValidationResult::Valid { chain }
    }

    /// First certificate named as `cert`'s issuer whose key verifies it.
    fn find_issuer<'a>(
        &'a self,
        cert: &Certificate,
        trusted_roots: &'a [Certificate],
    ) -> Result<&'a Certificate, InvalidReason> {
        let issuer_name = &cert.inner.tbs_certificate.issuer;
        let mut named = trusted_roots
            .iter()
            .chain(self.intermediates.iter())
            .filter(|candidate| candidate.inner.tbs_certificate.subject == *issuer_name)
            .peekable();
        if named.peek().is_none() {
            return Err(InvalidReason::UntrustedRoot);
        }
        named
            .find(|candidate| {
                candidate
                    .public_key()
                    .and_then(|key| cert.verify_signature(&key))
                    .is_ok()
            })
            .ok_or(InvalidReason::SignatureMismatch)
    }

    fn is_revoked(&self, cert: &Certificate) -> Result<bool, InvalidReason> {
        if self.revocations.is_empty() {
            return Ok(false);
        }
        let issuer = cert.issuer().map_err(|_| InvalidReason::Malformed)?;
        let serial = cert.serial().map_err(|_| InvalidReason::Malformed)?;
        Ok(self
            .revocations
            .iter()
            .filter(|list| list.issuer() == &issuer)
            .any(|list| list.contains(&serial)))
    }
}

fn window_violation(cert: &Certificate, at: OffsetDateTime) -> Option<InvalidReason> {
    if at < cert.not_before() {
        Some(InvalidReason::NotYetValid)
    } else if at > cert.not_after() {
        Some(InvalidReason::Expired)
    } else {
        None
    }
}
