use der::{Decode, DecodePem, Encode, EncodePem};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::SignatureAlgorithm;
use crate::cert::params::DistinguishedName;
use crate::error::{CaError, Result};
use crate::key::{KeyPair, PublicKey};

/// A PKCS#10 certification request.
///
/// The proof-of-possession signature covers the DER encoding of the request
/// info, which holds both the subject and the public key, so altering
/// either invalidates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    pub inner: CertReq,
}

impl SigningRequest {
    /// Builds and signs a request for `subject` with `key`.
    pub fn new(subject: &DistinguishedName, key: &KeyPair) -> Result<Self> {
        let info = CertReqInfo {
            version: Version::V1,
            subject: subject.to_x509_name()?,
            public_key: key.public_key().to_x509spki()?,
            attributes: Default::default(),
        };
        let signature = key.sign_data(&info.to_der()?)?;
        Ok(Self {
            inner: CertReq {
                info,
                algorithm: key.signature_algorithm().into(),
                signature: der::asn1::BitString::from_bytes(&signature)?,
            },
        })
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.info.public_key)
    }

    pub fn proof_of_possession(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    pub fn signature_algorithm(&self) -> Result<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(self.inner.algorithm.oid)
    }

    /// Checks that the embedded key signed the request info.
    pub fn verify(&self) -> Result<()> {
        let subject = DistinguishedName::from_x509_name(&self.inner.info.subject)
            .map(|dn| dn.to_string())
            .unwrap_or_else(|_| "<malformed>".to_string());
        let invalid = || CaError::InvalidProofOfPossession {
            subject: subject.clone(),
        };
        let public_key = self.public_key().map_err(|_| invalid())?;
        let info = self.inner.info.to_der()?;
        public_key
            .verify(&self.inner.algorithm, &info, self.proof_of_possession())
            .map_err(|_| invalid())
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| CaError::Encoding(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der).map_err(|e| CaError::Parse(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = CertReq::from_pem(pem).map_err(|e| CaError::Parse(e.to_string()))?;
        Ok(Self { inner })
    }
}
