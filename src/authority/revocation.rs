use std::collections::BTreeMap;

use const_oid::ObjectIdentifier;
use der::{Decode, Encode, asn1::Uint};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::CrlReason;

use crate::cert::extensions::{AuthorityKeyIdentifier, ToAndFromX509Extension};
use crate::cert::params::DistinguishedName;
use crate::cert::serial::Serial;
use crate::cert::{Certificate, CertificateWithPrivateKey, to_x509_time};
use crate::error::{CaError, Result};
use crate::key::PublicKey;
use crate::pem_utils::{X509_CRL, der_to_pem, pem_to_der_expecting};

/// Why a certificate was revoked (RFC 5280 CRLReason subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RevocationReason {
    #[default]
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    PrivilegeWithdrawn,
}

impl From<RevocationReason> for CrlReason {
    fn from(reason: RevocationReason) -> Self {
        match reason {
            RevocationReason::Unspecified => CrlReason::Unspecified,
            RevocationReason::KeyCompromise => CrlReason::KeyCompromise,
            RevocationReason::CaCompromise => CrlReason::CaCompromise,
            RevocationReason::AffiliationChanged => CrlReason::AffiliationChanged,
            RevocationReason::Superseded => CrlReason::Superseded,
            RevocationReason::CessationOfOperation => CrlReason::CessationOfOperation,
            RevocationReason::PrivilegeWithdrawn => CrlReason::PrivilegeWithdrawn,
        }
    }
}

impl From<CrlReason> for RevocationReason {
    /// Reasons outside the supported subset collapse to the closest one we
    /// track; a hold is still treated as revoked.
    fn from(reason: CrlReason) -> Self {
        match reason {
            CrlReason::KeyCompromise => RevocationReason::KeyCompromise,
            CrlReason::CaCompromise | CrlReason::AaCompromise => RevocationReason::CaCompromise,
            CrlReason::AffiliationChanged => RevocationReason::AffiliationChanged,
            CrlReason::Superseded => RevocationReason::Superseded,
            CrlReason::CessationOfOperation => RevocationReason::CessationOfOperation,
            CrlReason::PrivilegeWithdrawn => RevocationReason::PrivilegeWithdrawn,
            _ => RevocationReason::Unspecified,
        }
    }
}

impl ToAndFromX509Extension for RevocationReason {
    const OID: ObjectIdentifier = const_oid::db::rfc5280::ID_CE_CRL_REASONS;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>> {
        Ok(CrlReason::from(*self).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self> {
        Ok(CrlReason::from_der(extension)?.into())
    }
}

/// One revoked certificate. Entries are never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub serial: Serial,
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,
    pub reason: RevocationReason,
}

/// Revocations published by a single issuer.
///
/// Entries keep insertion order; lookups by serial go through an ordered
/// index. Validators receive clones, so a list handed out never changes
/// underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationList {
    issuer: DistinguishedName,
    entries: Vec<RevocationEntry>,
    index: BTreeMap<Serial, usize>,
}

impl RevocationList {
    pub fn new(issuer: DistinguishedName) -> Self {
        Self {
            issuer,
            entries: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn entries(&self) -> &[RevocationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, serial: &Serial) -> Option<&RevocationEntry> {
        self.index.get(serial).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, serial: &Serial) -> bool {
        self.index.contains_key(serial)
    }

    /// Appends `entry` unless its serial is already listed. Returns whether
    /// the list grew.
    pub(crate) fn insert(&mut self, entry: RevocationEntry) -> bool {
        if self.index.contains_key(&entry.serial) {
            return false;
        }
        self.index.insert(entry.serial.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    pub(crate) fn set_issuer(&mut self, issuer: DistinguishedName) {
        self.issuer = issuer;
    }

    /// Loads the entries of `crl` after checking that `issuer` signed it.
    pub fn from_crl(crl: &Crl, issuer: &Certificate) -> Result<Self> {
        if crl.inner.tbs_cert_list.issuer != issuer.inner.tbs_certificate.subject {
            return Err(CaError::SignatureMismatch(
                "CRL issuer does not name the supplied certificate".to_string(),
            ));
        }
        crl.verify_signature(&issuer.public_key()?)?;

        let mut list = RevocationList::new(issuer.subject()?);
        for entry in crl.entries()? {
            list.insert(entry);
        }
        debug!(issuer = %list.issuer, entries = list.len(), "loaded revocation list from CRL");
        Ok(list)
    }
}

/// An X.509 v2 certificate revocation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crl {
    pub inner: CertificateList,
}

impl Crl {
    /// Signs a CRL covering every entry of `list`.
    pub(crate) fn sign(
        issuer: &CertificateWithPrivateKey,
        list: &RevocationList,
        crl_number: u64,
        this_update: OffsetDateTime,
        next_update: OffsetDateTime,
    ) -> Result<Self> {
        let mut revoked = Vec::with_capacity(list.len());
        for entry in list.entries() {
            revoked.push(RevokedCert {
                serial_number: entry.serial.to_x509()?,
                revocation_date: to_x509_time(entry.revoked_at)?,
                crl_entry_extensions: Some(vec![entry.reason.to_x509_extension(false)?]),
            });
        }

        let key_identifier = issuer.key.public_key().key_identifier()?;
        let crl_number = x509_cert::ext::Extension {
            extn_id: const_oid::db::rfc5280::ID_CE_CRL_NUMBER,
            critical: false,
            extn_value: der::asn1::OctetString::new(
                Uint::new(&crl_number.to_be_bytes())?.to_der()?,
            )?,
        };

        let signature_algorithm = issuer.key.signature_algorithm();
        let tbs_cert_list = TbsCertList {
            version: x509_cert::Version::V2,
            signature: signature_algorithm.into(),
            issuer: issuer.cert.inner.tbs_certificate.subject.clone(),
            this_update: to_x509_time(this_update)?,
            next_update: Some(to_x509_time(next_update)?),
            revoked_certificates: (!revoked.is_empty()).then_some(revoked),
            crl_extensions: Some(vec![
                AuthorityKeyIdentifier { key_identifier }.to_x509_extension(false)?,
                crl_number,
            ]),
        };

        let signature = issuer.key.sign_data(&tbs_cert_list.to_der()?)?;
        Ok(Self {
            inner: CertificateList {
                tbs_cert_list,
                signature_algorithm: signature_algorithm.into(),
                signature: der::asn1::BitString::from_bytes(&signature)?,
            },
        })
    }

    pub fn issuer(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_cert_list.issuer)
    }

    pub fn this_update(&self) -> OffsetDateTime {
        OffsetDateTime::from(self.inner.tbs_cert_list.this_update.to_system_time())
    }

    pub fn next_update(&self) -> Option<OffsetDateTime> {
        self.inner
            .tbs_cert_list
            .next_update
            .as_ref()
            .map(|t| OffsetDateTime::from(t.to_system_time()))
    }

    /// Decodes the revoked entries. A missing reason code reads as
    /// [`RevocationReason::Unspecified`].
    pub fn entries(&self) -> Result<Vec<RevocationEntry>> {
        self.inner
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
            .map(|revoked| {
                let reason = revoked
                    .crl_entry_extensions
                    .iter()
                    .flatten()
                    .find(|ext| ext.extn_id == RevocationReason::OID)
                    .map(|ext| RevocationReason::from_x509_extension_value(ext.extn_value.as_bytes()))
                    .transpose()?
                    .unwrap_or_default();
                Ok(RevocationEntry {
                    serial: Serial::from_x509(&revoked.serial_number)?,
                    revoked_at: OffsetDateTime::from(revoked.revocation_date.to_system_time()),
                    reason,
                })
            })
            .collect()
    }

    pub fn verify_signature(&self, issuer_key: &PublicKey) -> Result<()> {
        if self.inner.signature_algorithm != self.inner.tbs_cert_list.signature {
            return Err(CaError::SignatureMismatch(
                "outer and inner signature algorithms differ".to_string(),
            ));
        }
        let tbs = self.inner.tbs_cert_list.to_der()?;
        issuer_key.verify(
            &self.inner.signature_algorithm,
            &tbs,
            self.inner.signature.raw_bytes(),
        )
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(der_to_pem(&self.to_der()?, X509_CRL))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateList::from_der(der).map_err(|e| CaError::Parse(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Self::from_der(&pem_to_der_expecting(pem, X509_CRL)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(counter: u64, reason: RevocationReason) -> RevocationEntry {
        RevocationEntry {
            serial: Serial::from_counter(counter).unwrap(),
            revoked_at: OffsetDateTime::now_utc(),
            reason,
        }
    }

    #[test]
    fn insert_is_idempotent_per_serial() {
        let mut list = RevocationList::new(DistinguishedName::new().common_name("Root"));
        let first = entry(1, RevocationReason::KeyCompromise);
        assert!(list.insert(first.clone()));
        let mut again = first.clone();
        again.reason = RevocationReason::Superseded;
        assert!(!list.insert(again));

        assert_eq!(list.len(), 1);
        assert_eq!(list.get(&first.serial).unwrap().reason, RevocationReason::KeyCompromise);
        assert!(!list.contains(&Serial::from_counter(2).unwrap()));
    }

    #[test]
    fn reason_survives_extension_encoding() {
        let encoded = RevocationReason::CessationOfOperation
            .to_x509_extension_value()
            .unwrap();
        assert_eq!(
            RevocationReason::from_x509_extension_value(&encoded).unwrap(),
            RevocationReason::CessationOfOperation
        );
    }

    #[test]
    fn reason_serializes_in_kebab_case() {
        let json = serde_json::to_string(&RevocationReason::KeyCompromise).unwrap();
        assert_eq!(json, "\"key-compromise\"");
    }
}
