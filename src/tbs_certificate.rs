use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
    ToAndFromX509Extension,
};
use crate::cert::params::{DistinguishedName, Validity};
use crate::cert::serial::Serial;
use crate::cert::{SignatureAlgorithm, to_x509_time};
use crate::error::Result;
use crate::key::PublicKey;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
/// This struct contains all the fields required to generate a valid X.509 certificate.
///
/// # Fields
/// * `serial` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The distinguished name of the certificate issuer.
/// * `validity` - The certificate's validity period.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `is_ca` - Whether the certificate may sign other certificates.
/// * `authority_key_id` - Key identifier of the issuer's public key.
pub struct TbsCertificate {
    pub serial: Serial,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: DistinguishedName,
    pub validity: Validity,
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub is_ca: bool,
    pub authority_key_id: Vec<u8>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    ///
    /// Writes BasicConstraints and KeyUsage (both critical) plus the subject
    /// and authority key identifiers.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let basic_constraints = BasicConstraints {
            is_ca: self.is_ca,
            max_path_length: None,
        };
        let key_usage = if self.is_ca {
            KeyUsage::authority()
        } else {
            KeyUsage::end_entity()
        };
        let subject_key_id = SubjectKeyIdentifier(self.subject_public_key.key_identifier()?);
        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: self.authority_key_id.clone(),
        };

        let extensions = vec![
            basic_constraints.to_x509_extension(true)?,
            key_usage.to_x509_extension(true)?,
            subject_key_id.to_x509_extension(false)?,
            authority_key_id.to_x509_extension(false)?,
        ];

        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.validity.not_before)?,
            not_after: to_x509_time(self.validity.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial.to_x509()?,
            signature: self.signature_algorithm.into(),
            issuer: self.issuer.to_x509_name()?,
            validity,
            subject: self.subject.to_x509_name()?,
            subject_public_key_info: self.subject_public_key.to_x509spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }
}
