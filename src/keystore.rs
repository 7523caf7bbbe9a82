//! Key generation and key files.
//!
//! Private keys are written as PKCS#8 PEM, encrypted with PBES2 (scrypt and
//! AES-256-CBC) when a passphrase is given. Files are readable by the owner
//! only.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::{info, warn};

use crate::config::AuthorityConfig;
use crate::error::{CaError, Result};
use crate::key::{KeyAlgorithm, KeyPair, PublicKey};
use crate::pem_utils::{
    ENCRYPTED_PRIVATE_KEY, PRIVATE_KEY, PUBLIC_KEY, der_to_pem, pem_to_der,
    pem_to_der_expecting,
};

/// Generates key pairs subject to a minimum strength and moves them to and
/// from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStore {
    min_key_bits: u32,
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl From<&AuthorityConfig> for KeyStore {
    fn from(config: &AuthorityConfig) -> Self {
        Self::new(config.min_key_bits)
    }
}

impl KeyStore {
    pub fn new(min_key_bits: u32) -> Self {
        Self { min_key_bits }
    }

    pub fn min_key_bits(&self) -> u32 {
        self.min_key_bits
    }

    /// Generates a fresh key pair from the OS CSPRNG.
    ///
    /// Fails with [`CaError::WeakParameter`] when the algorithm's
    /// RSA-equivalent strength is below the configured minimum.
    pub fn generate(&self, algorithm: KeyAlgorithm) -> Result<KeyPair> {
        let bits = algorithm.rsa_equivalent_bits();
        if bits < self.min_key_bits {
            warn!(?algorithm, minimum = self.min_key_bits, "refusing weak key");
            return Err(CaError::WeakParameter {
                bits,
                minimum: self.min_key_bits,
            });
        }
        KeyPair::generate(algorithm)
    }

    pub fn generate_rsa(&self, bits: u32) -> Result<KeyPair> {
        self.generate(KeyAlgorithm::Rsa { bits })
    }

    /// Writes `key` to `path` as PKCS#8 PEM, encrypted when `passphrase` is set.
    pub fn export_private(
        &self,
        key: &KeyPair,
        path: impl AsRef<Path>,
        passphrase: Option<&str>,
    ) -> Result<()> {
        let path = path.as_ref();
        let pem = match passphrase {
            Some(passphrase) => der_to_pem(
                key.to_encrypted_pkcs8_der(passphrase)?.as_bytes(),
                ENCRYPTED_PRIVATE_KEY,
            ),
            None => der_to_pem(key.to_pkcs8_der()?.as_bytes(), PRIVATE_KEY),
        };
        write_owner_only(path, pem.as_bytes())?;
        info!(
            path = %path.display(),
            algorithm = ?key.algorithm(),
            encrypted = passphrase.is_some(),
            "exported private key"
        );
        Ok(())
    }

    /// Reads a private key written by [`export_private`](Self::export_private)
    /// or by any tool producing PKCS#8 PEM.
    pub fn load_private(&self, path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<KeyPair> {
        let source = fs::read_to_string(path.as_ref())?;
        let (label, der) = pem_to_der(&source)?;
        match (label.as_str(), passphrase) {
            (PRIVATE_KEY, _) => KeyPair::from_pkcs8_der(&der),
            (ENCRYPTED_PRIVATE_KEY, Some(passphrase)) => {
                KeyPair::from_encrypted_pkcs8_der(&der, passphrase)
            }
            (ENCRYPTED_PRIVATE_KEY, None) => Err(CaError::Decryption(
                "key is encrypted and no passphrase was given".to_string(),
            )),
            (other, _) => Err(CaError::Parse(format!(
                "unexpected PEM label {other} for a private key"
            ))),
        }
    }

    pub fn export_public(&self, key: &PublicKey, path: impl AsRef<Path>) -> Result<()> {
        let pem = der_to_pem(&key.to_public_key_der()?, PUBLIC_KEY);
        fs::write(path, pem)?;
        Ok(())
    }

    pub fn load_public(&self, path: impl AsRef<Path>) -> Result<PublicKey> {
        let source = fs::read_to_string(path.as_ref())?;
        PublicKey::from_public_key_der(&pem_to_der_expecting(&source, PUBLIC_KEY)?)
    }
}

#[cfg(unix)]
fn write_owner_only(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
