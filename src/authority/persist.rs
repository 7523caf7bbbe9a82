//! Saving and restoring authority state.
//!
//! The state is a JSON document. The root key is stored as encrypted
//! PKCS#8, certificates and names as base64 DER. Where the bytes end up is
//! up to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use der::{Decode, Encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

use super::revocation::{RevocationEntry, RevocationList};
use super::{AuthorityState, CertificationAuthority, IssuedRecord, Lifecycle, LifecycleState};
use crate::cert::params::DistinguishedName;
use crate::cert::serial::Serial;
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::config::AuthorityConfig;
use crate::error::{CaError, Result};
use crate::key::KeyPair;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedAuthority {
    format: u32,
    state: LifecycleState,
    root_certificate: String,
    root_key: String,
    next_counter: u64,
    crl_number: u64,
    issued: Vec<PersistedIssuance>,
    revocations: Vec<RevocationEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIssuance {
    serial: Serial,
    subject: String,
    #[serde(with = "time::serde::rfc3339")]
    not_after: OffsetDateTime,
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CaError::Persistence(format!("{field}: {e}")))
}

impl CertificationAuthority {
    /// Serializes the authority, encrypting the root key with `passphrase`.
    pub fn serialize(&self, passphrase: &str) -> Result<Vec<u8>> {
        let (root, persisted) = {
            let state = self.state.lock();
            let root = state.lifecycle.root().cloned().ok_or_else(|| {
                CaError::AuthorityNotReady("authority has no root to persist".to_string())
            })?;
            let issued = state
                .issued
                .iter()
                .map(|(serial, record)| -> Result<PersistedIssuance> {
                    Ok(PersistedIssuance {
                        serial: serial.clone(),
                        subject: STANDARD.encode(record.subject.to_x509_name()?.to_der()?),
                        not_after: record.not_after,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let persisted = PersistedAuthority {
                format: FORMAT_VERSION,
                state: state.lifecycle.state(),
                root_certificate: STANDARD.encode(root.cert.to_der()?),
                root_key: String::new(),
                next_counter: state.next_counter,
                crl_number: state.crl_number,
                issued,
                revocations: state.revocations.entries().to_vec(),
            };
            (root, persisted)
        };

        // scrypt is slow; keep it outside the lock
        let root_key = root.key.to_encrypted_pkcs8_der(passphrase)?;
        let persisted = PersistedAuthority {
            root_key: STANDARD.encode(root_key.as_bytes()),
            ..persisted
        };
        Ok(serde_json::to_vec_pretty(&persisted)?)
    }

    /// Restores an authority written by [`serialize`](Self::serialize).
    ///
    /// A wrong passphrase fails with [`CaError::Decryption`]; inconsistent
    /// content fails with [`CaError::Persistence`].
    pub fn deserialize(bytes: &[u8], passphrase: &str, config: AuthorityConfig) -> Result<Self> {
        config.validate()?;
        let persisted: PersistedAuthority = serde_json::from_slice(bytes)?;
        if persisted.format != FORMAT_VERSION {
            return Err(CaError::Persistence(format!(
                "unsupported state format {}",
                persisted.format
            )));
        }

        let cert = Certificate::from_der(&decode_base64("root_certificate", &persisted.root_certificate)?)?;
        let key = KeyPair::from_encrypted_pkcs8_der(
            &decode_base64("root_key", &persisted.root_key)?,
            passphrase,
        )?;
        if cert.public_key()? != key.public_key() {
            return Err(CaError::Persistence(
                "root key does not match the root certificate".to_string(),
            ));
        }

        let mut issued = BTreeMap::new();
        for issuance in persisted.issued {
            let name = x509_cert::name::Name::from_der(&decode_base64("subject", &issuance.subject)?)
                .map_err(|e| CaError::Persistence(format!("subject: {e}")))?;
            match issuance.serial.counter() {
                Some(counter) if counter < persisted.next_counter => {}
                _ => {
                    return Err(CaError::Persistence(format!(
                        "serial {} is not below the issuance counter",
                        issuance.serial
                    )));
                }
            }
            issued.insert(
                issuance.serial,
                IssuedRecord {
                    subject: DistinguishedName::from_x509_name(&name)?,
                    not_after: issuance.not_after,
                },
            );
        }

        let mut revocations = RevocationList::new(cert.subject()?);
        for entry in persisted.revocations {
            if !issued.contains_key(&entry.serial) {
                return Err(CaError::Persistence(format!(
                    "revoked serial {} was never issued",
                    entry.serial
                )));
            }
            revocations.insert(entry);
        }

        let root = Arc::new(CertificateWithPrivateKey { cert, key });
        let lifecycle = match persisted.state {
            LifecycleState::Bootstrapped => Lifecycle::Bootstrapped(root),
            LifecycleState::Operating => Lifecycle::Operating(root),
            LifecycleState::Retired => Lifecycle::Retired(root),
            LifecycleState::Uninitialized => {
                return Err(CaError::Persistence(
                    "state has a root but claims to be uninitialized".to_string(),
                ));
            }
        };

        info!(
            state = ?persisted.state,
            issued = issued.len(),
            revoked = revocations.len(),
            "restored certification authority"
        );
        Ok(Self::with_state(
            config,
            AuthorityState {
                lifecycle,
                next_counter: persisted.next_counter,
                issued,
                revocations,
                crl_number: persisted.crl_number,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::revocation::RevocationReason;
    use crate::builder::CertificateBuilder;
    use crate::cert::params::Validity;
    use crate::key::KeyAlgorithm;

    fn operating_authority() -> (CertificationAuthority, Serial) {
        let authority = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
        authority
            .bootstrap_with(
                &DistinguishedName::new().common_name("Persisted Root"),
                KeyAlgorithm::EcdsaP256,
                Validity::for_days(100).unwrap(),
            )
            .unwrap();
        let key = KeyPair::generate_ed25519();
        let request = CertificateBuilder::build_signing_request(
            &DistinguishedName::new().common_name("leaf"),
            &key,
        )
        .unwrap();
        let serial = authority.issue(&request, 10, false).unwrap().serial().unwrap();
        (authority, serial)
    }

    #[test]
    fn state_survives_a_round_trip() {
        let (authority, serial) = operating_authority();
        authority.revoke(&serial, RevocationReason::Superseded).unwrap();
        let bytes = authority.serialize("correct horse").unwrap();

        let restored =
            CertificationAuthority::deserialize(&bytes, "correct horse", AuthorityConfig::default())
                .unwrap();
        assert_eq!(restored.state(), LifecycleState::Operating);
        assert_eq!(restored.root_certificate(), authority.root_certificate());
        assert_eq!(restored.issued_count(), 1);
        assert!(restored.is_revoked(&serial));
        assert_eq!(restored.revocations(), authority.revocations());

        // the counter carries on where it stopped
        let key = KeyPair::generate_ed25519();
        let request = CertificateBuilder::build_signing_request(
            &DistinguishedName::new().common_name("next"),
            &key,
        )
        .unwrap();
        let next = restored.issue(&request, 10, false).unwrap();
        assert_eq!(next.serial().unwrap().counter(), Some(2));
    }

    #[test]
    fn wrong_passphrase_is_a_decryption_error() {
        let (authority, _) = operating_authority();
        let bytes = authority.serialize("right").unwrap();
        assert!(matches!(
            CertificationAuthority::deserialize(&bytes, "wrong", AuthorityConfig::default()),
            Err(CaError::Decryption(_))
        ));
    }

    #[test]
    fn uninitialized_authority_cannot_be_saved() {
        let authority = CertificationAuthority::new(AuthorityConfig::default()).unwrap();
        assert!(matches!(
            authority.serialize("x"),
            Err(CaError::AuthorityNotReady(_))
        ));
        assert!(matches!(
            CertificationAuthority::deserialize(b"{}", "x", AuthorityConfig::default()),
            Err(CaError::Persistence(_))
        ));
    }
}
