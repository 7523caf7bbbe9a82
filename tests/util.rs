#![allow(dead_code)]

use certkit_ca::authority::CertificationAuthority;
use certkit_ca::builder::CertificateBuilder;
use certkit_ca::cert::Certificate;
use certkit_ca::cert::params::{DistinguishedName, Validity};
use certkit_ca::config::AuthorityConfig;
use certkit_ca::key::{KeyAlgorithm, KeyPair};
use certkit_ca::request::SigningRequest;

pub fn root_subject() -> DistinguishedName {
    DistinguishedName::new()
        .country("MD")
        .organization("MyPKI")
        .common_name("MyPKI Root CA")
}

pub fn user_subject() -> DistinguishedName {
    DistinguishedName::new()
        .country("MD")
        .organization("User Company")
        .common_name("user@example.com")
}

/// An authority with a P-256 root valid for ten years.
pub fn generate_authority(config: AuthorityConfig) -> (CertificationAuthority, Certificate) {
    let authority = CertificationAuthority::new(config).unwrap();
    let root = authority
        .bootstrap_with(
            &root_subject(),
            KeyAlgorithm::EcdsaP256,
            Validity::for_days(3650).unwrap(),
        )
        .unwrap();
    (authority, root)
}

pub fn signing_request(subject: &DistinguishedName) -> (SigningRequest, KeyPair) {
    let key = KeyPair::generate_ed25519();
    let request = CertificateBuilder::build_signing_request(subject, &key).unwrap();
    (request, key)
}

pub fn cn(common_name: &str) -> DistinguishedName {
    DistinguishedName::new().common_name(common_name)
}
