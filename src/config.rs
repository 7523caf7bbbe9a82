use std::path::Path;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{CaError, Result};

/// Policy knobs for a [`CertificationAuthority`](crate::authority::CertificationAuthority)
/// and its [`KeyStore`](crate::keystore::KeyStore).
///
/// Build in code with [`AuthorityConfig::builder`] or load from TOML; any
/// field left out takes its default.
///
/// ```
/// use certkit_ca::config::AuthorityConfig;
///
/// let config = AuthorityConfig::from_toml_str("reject_duplicate_subjects = true").unwrap();
/// assert!(config.reject_duplicate_subjects);
/// assert_eq!(config.min_key_bits, 2048);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// Minimum RSA-equivalent key strength accepted for generated keys.
    #[builder(default = default_min_key_bits())]
    #[serde(default = "default_min_key_bits")]
    pub min_key_bits: u32,
    /// Maximum number of certificates a validated chain may contain.
    #[builder(default = default_max_chain_depth())]
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
    /// Refuse to issue while the subject still holds an active certificate.
    #[builder(default)]
    #[serde(default)]
    pub reject_duplicate_subjects: bool,
    #[builder(default = default_leaf_validity_days())]
    #[serde(default = "default_leaf_validity_days")]
    pub default_leaf_validity_days: u32,
}

fn default_min_key_bits() -> u32 {
    2048
}

fn default_max_chain_depth() -> usize {
    8
}

fn default_leaf_validity_days() -> u32 {
    365
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            min_key_bits: default_min_key_bits(),
            max_chain_depth: default_max_chain_depth(),
            reject_duplicate_subjects: false,
            default_leaf_validity_days: default_leaf_validity_days(),
        }
    }
}

impl AuthorityConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| CaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Rejects settings no deployment should run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_key_bits < 1024 {
            return Err(CaError::Config(format!(
                "min_key_bits must be at least 1024, got {}",
                self.min_key_bits
            )));
        }
        if self.max_chain_depth == 0 {
            return Err(CaError::Config(
                "max_chain_depth must be greater than zero".to_string(),
            ));
        }
        if self.default_leaf_validity_days == 0 {
            return Err(CaError::Config(
                "default_leaf_validity_days must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
