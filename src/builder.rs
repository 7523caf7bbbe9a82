//! Certificate and signing-request construction.
//!
//! ```no_run
//! use certkit_ca::builder::CertificateBuilder;
//! use certkit_ca::cert::params::{DistinguishedName, Validity};
//! use certkit_ca::cert::serial::Serial;
//! use certkit_ca::key::KeyPair;
//!
//! # fn main() -> certkit_ca::error::Result<()> {
//! let ca_key = KeyPair::generate_ecdsa_p256();
//! let ca_subject = DistinguishedName::new().common_name("Example CA");
//! let ca_cert = CertificateBuilder::build_self_signed(
//!     &ca_subject,
//!     &ca_key,
//!     Validity::for_days(3650)?,
//!     true,
//! )?;
//!
//! let server_key = KeyPair::generate_ed25519();
//! let server_subject = DistinguishedName::new().common_name("server.example.com");
//! let request = CertificateBuilder::build_signing_request(&server_subject, &server_key)?;
//! let server_cert = CertificateBuilder::sign(
//!     &request,
//!     &ca_cert,
//!     &ca_key,
//!     Validity::for_days(365)?,
//!     false,
//!     Serial::random()?,
//! )?;
//! # Ok(())
//! # }
//! ```

use tracing::{debug, warn};

use crate::cert::Certificate;
use crate::cert::params::{DistinguishedName, Validity};
use crate::cert::serial::Serial;
use crate::error::{CaError, Result};
use crate::issuer::{Issuer, IssuerRef, SelfIssuer};
use crate::key::KeyPair;
use crate::request::SigningRequest;

/// Stateless constructor for certificates and signing requests.
pub struct CertificateBuilder;

impl CertificateBuilder {
    /// Builds a self-signed certificate (issuer = subject) with a random serial.
    pub fn build_self_signed(
        subject: &DistinguishedName,
        key: &KeyPair,
        validity: Validity,
        is_ca: bool,
    ) -> Result<Certificate> {
        Self::build_self_signed_with_serial(subject, key, validity, is_ca, Serial::random()?)
    }

    pub(crate) fn build_self_signed_with_serial(
        subject: &DistinguishedName,
        key: &KeyPair,
        validity: Validity,
        is_ca: bool,
        serial: Serial,
    ) -> Result<Certificate> {
        check_window(&validity)?;
        subject.validate()?;

        let issuer = SelfIssuer {
            name: subject.clone(),
            key,
        };
        debug!(%subject, %serial, "building self-signed certificate");
        issuer.issue(subject, &key.public_key(), validity, is_ca, serial)
    }

    /// Builds a PKCS#10 request carrying a proof-of-possession signature.
    pub fn build_signing_request(
        subject: &DistinguishedName,
        key: &KeyPair,
    ) -> Result<SigningRequest> {
        SigningRequest::new(subject, key)
    }

    /// Signs `request` with the issuer's key.
    ///
    /// Checks, in order: proof of possession, the validity window, that the
    /// window ends no later than the issuer's, that the issuer is a CA, and
    /// that `issuer_key` belongs to `issuer_cert`.
    pub fn sign(
        request: &SigningRequest,
        issuer_cert: &Certificate,
        issuer_key: &KeyPair,
        validity: Validity,
        is_ca: bool,
        serial: Serial,
    ) -> Result<Certificate> {
        if let Err(err) = request.verify() {
            warn!(%err, "rejecting signing request");
            return Err(err);
        }
        check_window(&validity)?;

        let issuer_not_after = issuer_cert.not_after();
        if validity.not_after > issuer_not_after {
            return Err(CaError::ValidityWindowExceedsIssuer {
                not_after: validity.not_after,
                issuer_not_after,
            });
        }

        let issuer_subject = issuer_cert.subject()?;
        if !issuer_cert.is_ca() {
            return Err(CaError::IssuerNotAuthority {
                subject: issuer_subject.to_string(),
            });
        }
        if issuer_cert.public_key()? != issuer_key.public_key() {
            return Err(CaError::IssuerKeyMismatch {
                subject: issuer_subject.to_string(),
            });
        }

        let subject = request.subject()?;
        subject.validate()?;
        debug!(%subject, issuer = %issuer_subject, %serial, is_ca, "signing certificate");

        let issuer = IssuerRef {
            cert: issuer_cert,
            key: issuer_key,
        };
        issuer.issue(&subject, &request.public_key()?, validity, is_ca, serial)
    }
}

fn check_window(validity: &Validity) -> Result<()> {
    if validity.not_before >= validity.not_after {
        return Err(CaError::InvalidValidityWindow {
            not_before: validity.not_before,
            not_after: validity.not_after,
        });
    }
    Ok(())
}
