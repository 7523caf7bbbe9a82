//! The certification authority: a root key, its self-signed certificate and
//! the bookkeeping of everything issued under it.
//!
//! ```no_run
//! use certkit_ca::authority::CertificationAuthority;
//! use certkit_ca::builder::CertificateBuilder;
//! use certkit_ca::cert::params::DistinguishedName;
//! use certkit_ca::config::AuthorityConfig;
//! use certkit_ca::key::KeyPair;
//!
//! # fn main() -> certkit_ca::error::Result<()> {
//! let authority = CertificationAuthority::new(AuthorityConfig::default())?;
//! let root = authority.bootstrap(&DistinguishedName::new().common_name("Root"), 2048, 10)?;
//!
//! let key = KeyPair::generate_ecdsa_p256();
//! let subject = DistinguishedName::new().common_name("user@example.com");
//! let request = CertificateBuilder::build_signing_request(&subject, &key)?;
//! let leaf = authority.issue(&request, 365, false)?;
//!
//! let result = authority
//!     .chain_validator()
//!     .validate(&leaf, &[root], time::OffsetDateTime::now_utc());
//! assert!(result.is_valid());
//! # Ok(())
//! # }
//! ```

pub mod persist;
pub mod revocation;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::builder::CertificateBuilder;
use crate::cert::params::{DistinguishedName, Validity, days_after};
use crate::cert::serial::Serial;
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::config::AuthorityConfig;
use crate::error::{CaError, Result};
use crate::key::KeyAlgorithm;
use crate::keystore::KeyStore;
use crate::request::SigningRequest;
use crate::validator::ChainValidator;
use revocation::{Crl, RevocationEntry, RevocationList, RevocationReason};

/// Where an authority is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// No root yet.
    Uninitialized,
    /// Root exists, nothing issued.
    Bootstrapped,
    /// At least one certificate issued.
    Operating,
    /// Explicitly retired or root expired. Issuance is disabled.
    Retired,
}

#[derive(Debug, Clone)]
enum Lifecycle {
    Uninitialized,
    /// Root key generation in progress outside the lock.
    Bootstrapping(DistinguishedName),
    Bootstrapped(Arc<CertificateWithPrivateKey>),
    Operating(Arc<CertificateWithPrivateKey>),
    Retired(Arc<CertificateWithPrivateKey>),
}

impl Lifecycle {
    fn root(&self) -> Option<&Arc<CertificateWithPrivateKey>> {
        match self {
            Lifecycle::Uninitialized | Lifecycle::Bootstrapping(_) => None,
            Lifecycle::Bootstrapped(root) | Lifecycle::Operating(root) | Lifecycle::Retired(root) => {
                Some(root)
            }
        }
    }

    fn state(&self) -> LifecycleState {
        match self {
            Lifecycle::Uninitialized | Lifecycle::Bootstrapping(_) => LifecycleState::Uninitialized,
            Lifecycle::Bootstrapped(_) => LifecycleState::Bootstrapped,
            Lifecycle::Operating(_) => LifecycleState::Operating,
            Lifecycle::Retired(_) => LifecycleState::Retired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IssuedRecord {
    subject: DistinguishedName,
    not_after: OffsetDateTime,
}

#[derive(Debug)]
struct AuthorityState {
    lifecycle: Lifecycle,
    next_counter: u64,
    issued: BTreeMap<Serial, IssuedRecord>,
    revocations: RevocationList,
    crl_number: u64,
}

impl AuthorityState {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            next_counter: 1,
            issued: BTreeMap::new(),
            revocations: RevocationList::new(DistinguishedName::default()),
            crl_number: 0,
        }
    }

    /// Moves to `Retired` once the root has expired.
    fn retire_if_expired(&mut self, now: OffsetDateTime) {
        let expired = match &self.lifecycle {
            Lifecycle::Bootstrapped(root) | Lifecycle::Operating(root) => {
                now > root.cert.not_after()
            }
            _ => false,
        };
        if let (true, Some(root)) = (expired, self.lifecycle.root().cloned()) {
            info!(not_after = %root.cert.not_after(), "root certificate expired, retiring authority");
            self.lifecycle = Lifecycle::Retired(root);
        }
    }

    /// The root, provided the authority may issue right now.
    fn issuing_root(&mut self, now: OffsetDateTime) -> Result<Arc<CertificateWithPrivateKey>> {
        self.retire_if_expired(now);
        match &self.lifecycle {
            Lifecycle::Bootstrapped(root) | Lifecycle::Operating(root) => Ok(root.clone()),
            Lifecycle::Uninitialized | Lifecycle::Bootstrapping(_) => Err(
                CaError::AuthorityNotReady("authority has no root certificate".to_string()),
            ),
            Lifecycle::Retired(root) => Err(CaError::AuthorityNotReady(format!(
                "authority is retired (root valid until {})",
                root.cert.not_after()
            ))),
        }
    }

    /// Serial of an unrevoked, unexpired certificate held by `subject`.
    fn active_serial_for(&self, subject: &DistinguishedName, now: OffsetDateTime) -> Option<Serial> {
        self.issued
            .iter()
            .find(|(serial, record)| {
                record.subject == *subject
                    && record.not_after >= now
                    && !self.revocations.contains(serial)
            })
            .map(|(serial, _)| serial.clone())
    }

    fn reserve_serial(&mut self) -> Result<Serial> {
        let serial = Serial::from_counter(self.next_counter)?;
        self.next_counter += 1;
        Ok(serial)
    }
}

/// A single-root certification authority.
///
/// All methods take `&self`; share the authority between threads behind an
/// `Arc`. Mutable state sits behind one lock that is never held while keys
/// are generated or data is signed.
#[derive(Debug)]
pub struct CertificationAuthority {
    config: AuthorityConfig,
    key_store: KeyStore,
    state: Mutex<AuthorityState>,
}

impl CertificationAuthority {
    /// Creates an authority without a root.
    pub fn new(config: AuthorityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_state(config, AuthorityState::new()))
    }

    fn with_state(config: AuthorityConfig, state: AuthorityState) -> Self {
        Self {
            key_store: KeyStore::from(&config),
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Generates an RSA root key and a self-signed root certificate valid
    /// for `validity_years` years of 365 days.
    pub fn bootstrap(
        &self,
        subject: &DistinguishedName,
        key_size_bits: u32,
        validity_years: u32,
    ) -> Result<Certificate> {
        let validity = Validity::for_days(i64::from(validity_years) * 365)?;
        self.bootstrap_with(subject, KeyAlgorithm::Rsa { bits: key_size_bits }, validity)
    }

    /// Generates a root key of any supported algorithm and self-signs it.
    ///
    /// Exactly one call succeeds per authority; every other call, concurrent
    /// or later, fails with [`CaError::AlreadyBootstrapped`].
    pub fn bootstrap_with(
        &self,
        subject: &DistinguishedName,
        algorithm: KeyAlgorithm,
        validity: Validity,
    ) -> Result<Certificate> {
        subject.validate()?;
        if validity.not_before >= validity.not_after {
            return Err(CaError::InvalidValidityWindow {
                not_before: validity.not_before,
                not_after: validity.not_after,
            });
        }

        {
            let mut state = self.state.lock();
            let existing = match &state.lifecycle {
                Lifecycle::Uninitialized => None,
                Lifecycle::Bootstrapping(pending) => Some(pending.to_string()),
                other => Some(
                    other
                        .root()
                        .and_then(|root| root.cert.subject().ok())
                        .map(|dn| dn.to_string())
                        .unwrap_or_default(),
                ),
            };
            if let Some(subject) = existing {
                return Err(CaError::AlreadyBootstrapped { subject });
            }
            state.lifecycle = Lifecycle::Bootstrapping(subject.clone());
        }

        let outcome = self.key_store.generate(algorithm).and_then(|key| {
            let cert = CertificateBuilder::build_self_signed(subject, &key, validity, true)?;
            Ok(CertificateWithPrivateKey { cert, key })
        });

        let mut state = self.state.lock();
        match outcome {
            Ok(root) => {
                let cert = root.cert.clone();
                state.revocations.set_issuer(subject.clone());
                state.lifecycle = Lifecycle::Bootstrapped(Arc::new(root));
                info!(
                    %subject,
                    ?algorithm,
                    not_after = %cert.not_after(),
                    "bootstrapped certification authority"
                );
                Ok(cert)
            }
            Err(err) => {
                state.lifecycle = Lifecycle::Uninitialized;
                warn!(%subject, %err, "bootstrap failed");
                Err(err)
            }
        }
    }

    /// Issues a certificate for `request`, valid from now for `validity_days`.
    ///
    /// The request's proof of possession is checked before any state is
    /// touched. Each issuance takes the next value of a counter that never
    /// goes back, so a serial is never reused, not even when signing fails.
    pub fn issue(
        &self,
        request: &SigningRequest,
        validity_days: u32,
        is_ca: bool,
    ) -> Result<Certificate> {
        let now = OffsetDateTime::now_utc();
        let root = self.state.lock().issuing_root(now)?;

        if let Err(err) = request.verify() {
            warn!(%err, "rejected signing request");
            return Err(err);
        }
        let subject = request.subject()?;
        // saturates at the last representable date, which no issuer outlives
        let not_after = now.saturating_add(time::Duration::days(i64::from(validity_days)));
        let validity = Validity::new(now, not_after)?;
        let issuer_not_after = root.cert.not_after();
        if validity.not_after > issuer_not_after {
            return Err(CaError::ValidityWindowExceedsIssuer {
                not_after: validity.not_after,
                issuer_not_after,
            });
        }

        let serial = {
            let mut state = self.state.lock();
            state.issuing_root(now)?;
            self.check_duplicate(&state, &subject, now)?;
            state.reserve_serial()?
        };

        let cert = CertificateBuilder::sign(
            request,
            &root.cert,
            &root.key,
            validity,
            is_ca,
            serial.clone(),
        )?;

        let mut state = self.state.lock();
        // another issuance for the same subject may have landed while signing
        self.check_duplicate(&state, &subject, now)?;
        state.issued.insert(
            serial.clone(),
            IssuedRecord {
                subject: subject.clone(),
                not_after: validity.not_after,
            },
        );
        let promoted = match &state.lifecycle {
            Lifecycle::Bootstrapped(root) => Some(root.clone()),
            _ => None,
        };
        if let Some(root) = promoted {
            state.lifecycle = Lifecycle::Operating(root);
        }
        info!(%subject, %serial, is_ca, not_after = %validity.not_after, "issued certificate");
        Ok(cert)
    }

    /// Issues an end-entity certificate with the configured default lifetime.
    pub fn issue_leaf(&self, request: &SigningRequest) -> Result<Certificate> {
        self.issue(request, self.config.default_leaf_validity_days, false)
    }

    fn check_duplicate(
        &self,
        state: &AuthorityState,
        subject: &DistinguishedName,
        now: OffsetDateTime,
    ) -> Result<()> {
        if !self.config.reject_duplicate_subjects {
            return Ok(());
        }
        match state.active_serial_for(subject, now) {
            Some(serial) => {
                warn!(%subject, %serial, "subject already holds an active certificate");
                Err(CaError::DuplicateSubjectPolicyViolation {
                    subject: subject.to_string(),
                    serial,
                })
            }
            None => Ok(()),
        }
    }

    /// Revokes a certificate this authority issued. Revoking twice is a no-op.
    pub fn revoke(&self, serial: &Serial, reason: RevocationReason) -> Result<()> {
        let mut state = self.state.lock();
        if !state.issued.contains_key(serial) {
            warn!(%serial, "refusing to revoke unknown serial");
            return Err(CaError::UnknownSerial(serial.clone()));
        }
        let entry = RevocationEntry {
            serial: serial.clone(),
            revoked_at: OffsetDateTime::now_utc().replace_nanosecond(0)?,
            reason,
        };
        if state.revocations.insert(entry) {
            info!(%serial, ?reason, "revoked certificate");
        } else {
            debug!(%serial, "certificate already revoked");
        }
        Ok(())
    }

    pub fn is_revoked(&self, serial: &Serial) -> bool {
        self.state.lock().revocations.contains(serial)
    }

    pub fn state(&self) -> LifecycleState {
        let mut state = self.state.lock();
        state.retire_if_expired(OffsetDateTime::now_utc());
        state.lifecycle.state()
    }

    pub fn root_certificate(&self) -> Option<Certificate> {
        self.state.lock().lifecycle.root().map(|root| root.cert.clone())
    }

    /// Permanently disables issuance. Retiring twice is a no-op.
    pub fn retire(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.lifecycle.state() {
            LifecycleState::Retired => Ok(()),
            LifecycleState::Uninitialized => Err(CaError::AuthorityNotReady(
                "authority has no root to retire".to_string(),
            )),
            LifecycleState::Bootstrapped | LifecycleState::Operating => {
                if let Some(root) = state.lifecycle.root().cloned() {
                    info!(issued = state.issued.len(), "retired certification authority");
                    state.lifecycle = Lifecycle::Retired(root);
                }
                Ok(())
            }
        }
    }

    /// Writes the root private key through the [`KeyStore`].
    pub fn export_root_key(
        &self,
        path: impl AsRef<std::path::Path>,
        passphrase: Option<&str>,
    ) -> Result<()> {
        let root = self.state.lock().lifecycle.root().cloned().ok_or_else(|| {
            CaError::AuthorityNotReady("authority has no root key".to_string())
        })?;
        self.key_store.export_private(&root.key, path, passphrase)
    }

    /// Snapshot of the revocations recorded so far.
    pub fn revocation_list(&self) -> RevocationList {
        self.state.lock().revocations.clone()
    }

    pub fn revocations(&self) -> Vec<RevocationEntry> {
        self.state.lock().revocations.entries().to_vec()
    }

    pub fn issued_count(&self) -> usize {
        self.state.lock().issued.len()
    }

    /// Signs a CRL over the current revocations, valid for `next_update_days`.
    ///
    /// Works in every state that has a root, retired included.
    pub fn issue_crl(&self, next_update_days: u32) -> Result<Crl> {
        let this_update = OffsetDateTime::now_utc().replace_nanosecond(0)?;
        let next_update = days_after(this_update, i64::from(next_update_days))?;

        let (root, list, crl_number) = {
            let mut state = self.state.lock();
            let root = state.lifecycle.root().cloned().ok_or_else(|| {
                CaError::AuthorityNotReady("authority has no root certificate".to_string())
            })?;
            state.crl_number += 1;
            (root, state.revocations.clone(), state.crl_number)
        };

        let crl = Crl::sign(&root, &list, crl_number, this_update, next_update)?;
        info!(crl_number, entries = list.len(), "issued certificate revocation list");
        Ok(crl)
    }

    /// A validator preloaded with this authority's revocations and depth limit.
    pub fn chain_validator(&self) -> ChainValidator {
        ChainValidator::new()
            .with_max_depth(self.config.max_chain_depth)
            .with_revocations(self.revocation_list())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPair;

    fn bootstrapped(config: AuthorityConfig) -> CertificationAuthority {
        let authority = CertificationAuthority::new(config).unwrap();
        authority
            .bootstrap_with(
                &DistinguishedName::new().common_name("Test Root"),
                KeyAlgorithm::EcdsaP256,
                Validity::for_days(3650).unwrap(),
            )
            .unwrap();
        authority
    }

    fn request(cn: &str) -> SigningRequest {
        let key = KeyPair::generate_ed25519();
        CertificateBuilder::build_signing_request(&DistinguishedName::new().common_name(cn), &key)
            .unwrap()
    }

    #[test]
    fn lifecycle_moves_forward() {
        let authority = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
        assert_eq!(authority.state(), LifecycleState::Uninitialized);
        assert!(matches!(
            authority.issue(&request("early"), 30, false),
            Err(CaError::AuthorityNotReady(_))
        ));

        authority
            .bootstrap_with(
                &DistinguishedName::new().common_name("Root"),
                KeyAlgorithm::Ed25519,
                Validity::for_days(365).unwrap(),
            )
            .unwrap();
        assert_eq!(authority.state(), LifecycleState::Bootstrapped);

        authority.issue(&request("first"), 30, false).unwrap();
        assert_eq!(authority.state(), LifecycleState::Operating);

        authority.retire().unwrap();
        assert_eq!(authority.state(), LifecycleState::Retired);
        assert!(matches!(
            authority.issue(&request("late"), 30, false),
            Err(CaError::AuthorityNotReady(_))
        ));
    }

    #[test]
    fn second_bootstrap_fails() {
        let authority = bootstrapped(AuthorityConfig::default());
        let again = authority.bootstrap_with(
            &DistinguishedName::new().common_name("Other Root"),
            KeyAlgorithm::EcdsaP256,
            Validity::for_days(10).unwrap(),
        );
        assert!(matches!(again, Err(CaError::AlreadyBootstrapped { .. })));
        assert_eq!(
            authority.root_certificate().unwrap().subject().unwrap(),
            DistinguishedName::new().common_name("Test Root")
        );
    }

    #[test]
    fn failed_bootstrap_leaves_authority_uninitialized() {
        let authority = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
        let weak = authority.bootstrap(&DistinguishedName::new().common_name("Weak"), 1024, 1);
        assert!(matches!(weak, Err(CaError::WeakParameter { .. })));
        assert_eq!(authority.state(), LifecycleState::Uninitialized);

        authority
            .bootstrap_with(
                &DistinguishedName::new().common_name("Strong"),
                KeyAlgorithm::EcdsaP384,
                Validity::for_days(30).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn parameter_errors_do_not_consume_serials() {
        let authority = bootstrapped(AuthorityConfig::default());
        let first = authority.issue(&request("a"), 30, false).unwrap();

        // zero days is an invalid window and fails before a serial is reserved
        assert!(authority.issue(&request("b"), 0, false).is_err());
        let second = authority.issue(&request("c"), 30, false).unwrap();
        assert_eq!(second.serial().unwrap().counter(), Some(2));
        assert_eq!(first.serial().unwrap().counter(), Some(1));
        assert_eq!(authority.issued_count(), 2);
    }

    #[test]
    fn duplicate_subjects_follow_policy() {
        let permissive = bootstrapped(AuthorityConfig::default());
        permissive.issue(&request("dup"), 30, false).unwrap();
        permissive.issue(&request("dup"), 30, false).unwrap();

        let strict = bootstrapped(AuthorityConfig::builder().reject_duplicate_subjects(true).build());
        let first = strict.issue(&request("dup"), 30, false).unwrap();
        let serial = first.serial().unwrap();
        match strict.issue(&request("dup"), 30, false) {
            Err(CaError::DuplicateSubjectPolicyViolation { serial: held, .. }) => {
                assert_eq!(held, serial)
            }
            other => panic!("expected policy violation, got {other:?}"),
        }

        strict.revoke(&serial, RevocationReason::Superseded).unwrap();
        strict.issue(&request("dup"), 30, false).unwrap();
    }

    #[test]
    fn revoke_is_idempotent_and_checks_serials() {
        let authority = bootstrapped(AuthorityConfig::default());
        let cert = authority.issue(&request("r"), 30, false).unwrap();
        let serial = cert.serial().unwrap();

        assert!(!authority.is_revoked(&serial));
        authority.revoke(&serial, RevocationReason::KeyCompromise).unwrap();
        authority.revoke(&serial, RevocationReason::Unspecified).unwrap();
        assert!(authority.is_revoked(&serial));
        assert_eq!(authority.revocations().len(), 1);
        assert_eq!(authority.revocations()[0].reason, RevocationReason::KeyCompromise);

        let root_serial = authority.root_certificate().unwrap().serial().unwrap();
        assert!(matches!(
            authority.revoke(&root_serial, RevocationReason::Unspecified),
            Err(CaError::UnknownSerial(_))
        ));
    }

    #[test]
    fn revocation_still_works_after_retirement() {
        let authority = bootstrapped(AuthorityConfig::default());
        let serial = authority.issue(&request("x"), 30, false).unwrap().serial().unwrap();
        authority.retire().unwrap();
        authority.revoke(&serial, RevocationReason::CessationOfOperation).unwrap();
        assert!(authority.is_revoked(&serial));
        assert_eq!(authority.issue_crl(7).unwrap().entries().unwrap().len(), 1);
    }

    #[test]
    fn leaf_may_not_outlive_root() {
        let authority = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
        authority
            .bootstrap_with(
                &DistinguishedName::new().common_name("Short Root"),
                KeyAlgorithm::EcdsaP256,
                Validity::for_days(10).unwrap(),
            )
            .unwrap();
        assert!(matches!(
            authority.issue(&request("long"), 30, false),
            Err(CaError::ValidityWindowExceedsIssuer { .. })
        ));
        assert_eq!(authority.issued_count(), 0);
    }

    #[test]
    fn lifetimes_past_the_last_date_are_errors() {
        let authority = bootstrapped(AuthorityConfig::default());
        assert!(matches!(
            authority.issue(&request("forever"), u32::MAX, false),
            Err(CaError::ValidityWindowExceedsIssuer { .. })
        ));
        assert!(matches!(
            authority.issue_crl(u32::MAX),
            Err(CaError::LifetimeOutOfRange { .. })
        ));
        assert_eq!(authority.issued_count(), 0);
        assert_eq!(authority.state(), LifecycleState::Bootstrapped);

        let fresh = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
        assert!(matches!(
            fresh.bootstrap(&DistinguishedName::new().common_name("Root"), 2048, 100_000),
            Err(CaError::LifetimeOutOfRange { .. })
        ));
        assert_eq!(fresh.state(), LifecycleState::Uninitialized);
    }
}
