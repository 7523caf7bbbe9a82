use std::fmt;

use der::{Decode, Encode};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, SecretDocument};
use rsa::pkcs1v15::{
    Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

use crate::cert::SignatureAlgorithm;
use crate::error::{CaError, Result};

/// Key algorithms an authority or end entity can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum KeyAlgorithm {
    /// RSA with the given modulus size.
    Rsa { bits: u32 },
    /// ECDSA over NIST P-256.
    EcdsaP256,
    /// ECDSA over NIST P-384.
    EcdsaP384,
    /// Edwards-curve signatures over Curve25519.
    Ed25519,
}

impl KeyAlgorithm {
    /// Strength expressed as the RSA modulus size offering comparable security.
    pub fn rsa_equivalent_bits(&self) -> u32 {
        match self {
            KeyAlgorithm::Rsa { bits } => *bits,
            KeyAlgorithm::EcdsaP256 | KeyAlgorithm::Ed25519 => 3072,
            KeyAlgorithm::EcdsaP384 => 7680,
        }
    }
}

/// A private key together with the means to derive its public half.
///
/// Private material only leaves this type through the explicit PKCS#8
/// export methods.
pub enum KeyPair {
    Rsa(Box<RsaPrivateKey>),
    EcdsaP256(P256SigningKey),
    EcdsaP384(P384SigningKey),
    Ed25519(Ed25519SigningKey),
}

impl KeyPair {
    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)?;
        Ok(KeyPair::Rsa(Box::new(private)))
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let mut rng = rand_core::OsRng;
        KeyPair::EcdsaP256(P256SigningKey::random(&mut rng))
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let mut rng = rand_core::OsRng;
        KeyPair::EcdsaP384(P384SigningKey::random(&mut rng))
    }

    /// Generate an Ed25519 key pair.
    pub fn generate_ed25519() -> Self {
        let mut rng = rand_core::OsRng;
        KeyPair::Ed25519(Ed25519SigningKey::generate(&mut rng))
    }

    /// Generate a key pair for the given algorithm, without any policy check.
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        match algorithm {
            KeyAlgorithm::Rsa { bits } => Self::generate_rsa(bits as usize),
            KeyAlgorithm::EcdsaP256 => Ok(Self::generate_ecdsa_p256()),
            KeyAlgorithm::EcdsaP384 => Ok(Self::generate_ecdsa_p384()),
            KeyAlgorithm::Ed25519 => Ok(Self::generate_ed25519()),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa(private) => KeyAlgorithm::Rsa {
                bits: rsa::traits::PublicKeyParts::size(private.as_ref()) as u32 * 8,
            },
            KeyPair::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384(_) => KeyAlgorithm::EcdsaP384,
            KeyPair::Ed25519(_) => KeyAlgorithm::Ed25519,
        }
    }

    /// Public half, derived from the private key on every call.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Rsa(private) => PublicKey::Rsa(RsaPublicKey::from(private.as_ref())),
            KeyPair::EcdsaP256(signing_key) => PublicKey::EcdsaP256(*signing_key.verifying_key()),
            KeyPair::EcdsaP384(signing_key) => PublicKey::EcdsaP384(*signing_key.verifying_key()),
            KeyPair::Ed25519(signing_key) => PublicKey::Ed25519(signing_key.verifying_key()),
        }
    }

    /// Algorithm this key signs certificates and requests with.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256(_) => SignatureAlgorithm::Sha256WithECDSA,
            KeyPair::EcdsaP384(_) => SignatureAlgorithm::Sha384WithECDSA,
            KeyPair::Ed25519(_) => SignatureAlgorithm::Ed25519,
        }
    }

    /// Signs `data` with this key's [`signature_algorithm`](Self::signature_algorithm).
    ///
    /// ECDSA signatures are returned DER encoded, as X.509 expects.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa(private) => {
                let signing_key = RsaSigningKey::<Sha256>::new(private.as_ref().clone());
                let signature = signing_key
                    .try_sign(data)
                    .map_err(|e| CaError::Encoding(e.to_string()))?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256(signing_key) => {
                let signature: p256::ecdsa::Signature = signing_key
                    .try_sign(data)
                    .map_err(|e| CaError::Encoding(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384(signing_key) => {
                let signature: p384::ecdsa::Signature = signing_key
                    .try_sign(data)
                    .map_err(|e| CaError::Encoding(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::Ed25519(signing_key) => Ok(signing_key.sign(data).to_bytes().to_vec()),
        }
    }

    /// Exports the private key as an unencrypted PKCS#8 document.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let document = match self {
            KeyPair::Rsa(private) => private.to_pkcs8_der(),
            KeyPair::EcdsaP256(signing_key) => signing_key.to_pkcs8_der(),
            KeyPair::EcdsaP384(signing_key) => signing_key.to_pkcs8_der(),
            KeyPair::Ed25519(signing_key) => signing_key.to_pkcs8_der(),
        };
        document.map_err(|e| CaError::Encoding(e.to_string()))
    }

    /// Exports the private key as PKCS#8, encrypted with `passphrase`
    /// (PBES2: scrypt key derivation with AES-256-CBC).
    pub fn to_encrypted_pkcs8_der(&self, passphrase: &str) -> Result<SecretDocument> {
        let plain = self.to_pkcs8_der()?;
        let info = pkcs8::PrivateKeyInfo::from_der(plain.as_bytes())?;
        info.encrypt(rand_core::OsRng, passphrase.as_bytes())
            .map_err(|e| CaError::Encoding(e.to_string()))
    }

    /// Imports a private key from unencrypted PKCS#8 DER.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::from_der(der)?;
        let oid = info.algorithm.oid;
        if oid == const_oid::db::rfc5912::RSA_ENCRYPTION {
            let private = RsaPrivateKey::from_pkcs8_der(der)?;
            return Ok(KeyPair::Rsa(Box::new(private)));
        }
        if oid == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
            if let Ok(signing_key) = P256SigningKey::from_pkcs8_der(der) {
                return Ok(KeyPair::EcdsaP256(signing_key));
            }
            let signing_key = P384SigningKey::from_pkcs8_der(der)?;
            return Ok(KeyPair::EcdsaP384(signing_key));
        }
        if oid == const_oid::db::rfc8410::ID_ED_25519 {
            let signing_key = Ed25519SigningKey::from_pkcs8_der(der)?;
            return Ok(KeyPair::Ed25519(signing_key));
        }
        Err(CaError::Parse(format!("unsupported private key algorithm {oid}")))
    }

    /// Imports a private key from encrypted PKCS#8 DER.
    ///
    /// A wrong passphrase surfaces as [`CaError::Decryption`], including the
    /// rare case where decryption "succeeds" but yields garbage.
    pub fn from_encrypted_pkcs8_der(der: &[u8], passphrase: &str) -> Result<Self> {
        let info = pkcs8::EncryptedPrivateKeyInfo::from_der(der)?;
        let plain = info
            .decrypt(passphrase.as_bytes())
            .map_err(|e| CaError::Decryption(e.to_string()))?;
        Self::from_pkcs8_der(plain.as_bytes()).map_err(|e| CaError::Decryption(e.to_string()))
    }
}

impl PartialEq for KeyPair {
    /// Two key pairs are equal when their public halves are.
    fn eq(&self, other: &Self) -> bool {
        self.public_key() == other.public_key()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .field("key_id", &self.public_key().key_identifier().ok())
            .finish_non_exhaustive()
    }
}

/// A public key of one of the supported algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    Ed25519(Ed25519VerifyingKey),
}

impl PublicKey {
    /// Encodes the key as a DER SubjectPublicKeyInfo.
    pub fn to_public_key_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            PublicKey::Rsa(public) => public.to_public_key_der(),
            PublicKey::EcdsaP256(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::EcdsaP384(verifying_key) => verifying_key.to_public_key_der(),
            PublicKey::Ed25519(verifying_key) => verifying_key.to_public_key_der(),
        };
        Ok(document
            .map_err(|e| CaError::Encoding(e.to_string()))?
            .as_bytes()
            .to_vec())
    }

    /// Decodes a DER SubjectPublicKeyInfo.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self> {
        let spki = SubjectPublicKeyInfoOwned::from_der(der)?;
        let oid = spki.algorithm.oid;
        if oid == const_oid::db::rfc5912::RSA_ENCRYPTION {
            return Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(der)?));
        }
        if oid == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY {
            if let Ok(verifying_key) = P256VerifyingKey::from_public_key_der(der) {
                return Ok(PublicKey::EcdsaP256(verifying_key));
            }
            return Ok(PublicKey::EcdsaP384(P384VerifyingKey::from_public_key_der(
                der,
            )?));
        }
        if oid == const_oid::db::rfc8410::ID_ED_25519 {
            return Ok(PublicKey::Ed25519(Ed25519VerifyingKey::from_public_key_der(
                der,
            )?));
        }
        Err(CaError::Parse(format!("unsupported public key algorithm {oid}")))
    }

    pub fn to_x509spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_der(
            &self.to_public_key_der()?,
        )?)
    }

    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        Self::from_public_key_der(&spki.to_der()?)
    }

    /// SHA-1 over the subjectPublicKey bits (RFC 5280 4.2.1.2, method 1).
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_x509spki()?;
        Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
    }

    /// Verifies `signature` over `message`.
    ///
    /// The algorithm identifier must match this key's type; RSA keys accept
    /// only PKCS#1 v1.5 with SHA-256.
    pub fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        message: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let expected = match self {
            PublicKey::Rsa(_) => SignatureAlgorithm::Sha256WithRSA,
            PublicKey::EcdsaP256(_) => SignatureAlgorithm::Sha256WithECDSA,
            PublicKey::EcdsaP384(_) => SignatureAlgorithm::Sha384WithECDSA,
            PublicKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
        };
        if algorithm.oid != expected.oid() {
            return Err(CaError::SignatureMismatch(format!(
                "algorithm {} does not match key type {:?}",
                algorithm.oid, expected
            )));
        }
        let mismatch = |e: rsa::signature::Error| CaError::SignatureMismatch(e.to_string());
        match self {
            PublicKey::Rsa(public) => {
                let verifying_key = RsaVerifyingKey::<Sha256>::new(public.clone());
                let signature = RsaSignature::try_from(signature).map_err(mismatch)?;
                verifying_key.verify(message, &signature).map_err(mismatch)
            }
            PublicKey::EcdsaP256(verifying_key) => {
                let signature = p256::ecdsa::Signature::from_der(signature).map_err(mismatch)?;
                verifying_key.verify(message, &signature).map_err(mismatch)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                let signature = p384::ecdsa::Signature::from_der(signature).map_err(mismatch)?;
                verifying_key.verify(message, &signature).map_err(mismatch)
            }
            PublicKey::Ed25519(verifying_key) => {
                let signature =
                    ed25519_dalek::Signature::from_slice(signature).map_err(mismatch)?;
                verifying_key.verify(message, &signature).map_err(mismatch)
            }
        }
    }
}
