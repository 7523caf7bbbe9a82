use der::Encode;

use crate::cert::params::{DistinguishedName, Validity};
use crate::cert::serial::Serial;
use crate::cert::Certificate;
use crate::error::Result;
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::TbsCertificate;

/// Represents an entity capable of issuing certificates.
///
/// Implementors supply a name and a signing key; [`Issuer::issue`] does the
/// encoding and signing. Policy checks (proof of possession, validity
/// nesting) live in [`CertificateBuilder`](crate::builder::CertificateBuilder).
pub trait Issuer {
    /// Returns the distinguished name of the issuer.
    fn issuer_name(&self) -> Result<DistinguishedName>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Signs a certificate for `subject_public_key`.
    fn issue(
        &self,
        subject: &DistinguishedName,
        subject_public_key: &PublicKey,
        validity: Validity,
        is_ca: bool,
        serial: Serial,
    ) -> Result<Certificate> {
        let key = self.signing_key();
        let signature_algorithm = key.signature_algorithm();

        let tbs_cert = TbsCertificate {
            serial,
            signature_algorithm,
            issuer: self.issuer_name()?,
            validity,
            subject: subject.clone(),
            subject_public_key: subject_public_key.clone(),
            is_ca,
            authority_key_id: key.public_key().key_identifier()?,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let signature = key.sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = x509_cert::Certificate {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algorithm.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issuer for self-signed certificates: the subject names itself.
pub(crate) struct SelfIssuer<'a> {
    pub name: DistinguishedName,
    pub key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<DistinguishedName> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// Borrowed issuer certificate plus its private key.
pub(crate) struct IssuerRef<'a> {
    pub cert: &'a Certificate,
    pub key: &'a KeyPair,
}

impl Issuer for IssuerRef<'_> {
    fn issuer_name(&self) -> Result<DistinguishedName> {
        // The name of the issuer is the subject of the certificate
        self.cert.subject()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}
