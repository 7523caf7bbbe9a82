//! # certkit-ca - A Pure Rust Certificate Authority Engine
//!
//! certkit-ca implements the core of a small certification authority on top of
//! the RustCrypto crates: key generation and key files, X.509 v3 issuance from
//! PKCS#10 signing requests, revocation bookkeeping with CRL output, and chain
//! validation against trusted roots.
//!
//! ## Supported Key Types
//!
//! - **RSA**: any size meeting the configured minimum (2048 bits by default),
//!   signing with PKCS#1 v1.5 and SHA-256
//! - **ECDSA**: P-256 (SHA-256) and P-384 (SHA-384)
//! - **Ed25519**: Edwards curve digital signature algorithm
//!
//! ## Supported Formats
//!
//! - **DER**: Distinguished Encoding Rules (binary format)
//! - **PEM**: `CERTIFICATE`, `CERTIFICATE REQUEST`, `PRIVATE KEY`,
//!   `ENCRYPTED PRIVATE KEY`, `PUBLIC KEY` and `X509 CRL`
//!
//! ## Quick Start
//!
//! ### Running an Authority
//!
//! ```rust,no_run
//! use certkit_ca::{
//!     authority::{CertificationAuthority, revocation::RevocationReason},
//!     builder::CertificateBuilder,
//!     cert::params::DistinguishedName,
//!     config::AuthorityConfig,
//!     key::KeyAlgorithm,
//!     keystore::KeyStore,
//!     validator::InvalidReason,
//! };
//!
//! # fn main() -> Result<(), certkit_ca::error::CaError> {
//! let authority = CertificationAuthority::new(AuthorityConfig::default())?;
//! let root = authority.bootstrap(
//!     &DistinguishedName::new()
//!         .country("MD")
//!         .organization("MyPKI")
//!         .common_name("MyPKI Root CA"),
//!     2048,
//!     10,
//! )?;
//!
//! // The subject keeps its private key and only sends the request.
//! let key = KeyStore::default().generate(KeyAlgorithm::EcdsaP256)?;
//! let subject = DistinguishedName::new().common_name("user@example.com");
//! let request = CertificateBuilder::build_signing_request(&subject, &key)?;
//! let leaf = authority.issue(&request, 365, false)?;
//!
//! let now = time::OffsetDateTime::now_utc();
//! assert!(authority.chain_validator().validate(&leaf, &[root.clone()], now).is_valid());
//!
//! authority.revoke(&leaf.serial()?, RevocationReason::KeyCompromise)?;
//! let result = authority.chain_validator().validate(&leaf, &[root], now);
//! assert_eq!(result.reason(), Some(InvalidReason::Revoked));
//! # Ok(())
//! # }
//! ```
//!
//! ### Publishing Revocations
//!
//! ```rust,no_run
//! use certkit_ca::{authority::{CertificationAuthority, revocation::RevocationList}};
//!
//! # fn publish(authority: &CertificationAuthority) -> Result<(), certkit_ca::error::CaError> {
//! let crl = authority.issue_crl(7)?;
//! std::fs::write("ca.crl.pem", crl.to_pem()?)?;
//!
//! // A relying party loads the CRL back, checking the signature.
//! let root = authority.root_certificate().expect("bootstrapped");
//! let list = RevocationList::from_crl(&crl, &root)?;
//! println!("{} revoked certificates", list.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Operations return [`error::Result`]. Chain validation is the exception: an
//! invalid chain is an expected outcome and comes back as
//! [`validator::ValidationResult::Invalid`].
//!
//! ```rust
//! use certkit_ca::{error::CaError, keystore::KeyStore};
//!
//! match KeyStore::default().generate_rsa(1024) {
//!     Err(CaError::WeakParameter { bits, minimum }) => println!("{bits} < {minimum}"),
//!     Ok(_) => unreachable!(),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Logging
//!
//! Events are emitted through [`tracing`]; install a subscriber to see them.
//!
//! ## Module Organization
//!
//! - [`key`]: Key pairs, public keys, signing and PKCS#8
//! - [`keystore`]: Key generation policy and key files
//! - [`cert`]: Certificates, names, serials and extensions
//! - [`request`]: PKCS#10 signing requests
//! - [`builder`]: Self-signed certificates, requests and signing
//! - [`issuer`]: The signing step shared by every issuer
//! - [`authority`]: The stateful authority, revocation and persistence
//! - [`validator`]: Chain validation
//! - [`config`]: Authority policy
//! - [`error`]: Error types
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod authority;
pub mod builder;
pub mod cert;
pub mod config;
pub mod error;
pub mod issuer;
pub mod key;
pub mod keystore;
pub mod pem_utils;
pub mod request;
pub mod tbs_certificate;
pub mod validator;
