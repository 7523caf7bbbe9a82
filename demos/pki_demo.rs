//! Sets up a root CA, issues a user certificate from a signing request and
//! verifies the result. Files land in `ca/` and `user/` under the current
//! directory.
//!
//! ```sh
//! cargo run --example pki_demo
//! ```

use std::fs;

use certkit_ca::authority::CertificationAuthority;
use certkit_ca::builder::CertificateBuilder;
use certkit_ca::cert::params::DistinguishedName;
use certkit_ca::config::AuthorityConfig;
use certkit_ca::error::Result;
use certkit_ca::keystore::KeyStore;
use certkit_ca::validator::ValidationResult;

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    fs::create_dir_all("ca")?;
    fs::create_dir_all("user")?;

    let config = AuthorityConfig::default();
    let key_store = KeyStore::from(&config);
    let authority = CertificationAuthority::new(config)?;

    // Root CA: RSA 2048, ten years
    let root_subject = DistinguishedName::new()
        .country("MD")
        .organization("MyPKI")
        .common_name("MyPKI Root CA");
    let root = authority.bootstrap(&root_subject, 2048, 10)?;
    authority.export_root_key("ca/ca.key.pem", None)?;
    fs::write("ca/ca.cert.pem", root.to_pem()?)?;

    // User key and signing request
    let user_key = key_store.generate_rsa(2048)?;
    key_store.export_private(&user_key, "user/user.key.pem", None)?;
    let user_subject = DistinguishedName::new()
        .country("MD")
        .organization("User Company")
        .common_name("user@example.com");
    let request = CertificateBuilder::build_signing_request(&user_subject, &user_key)?;
    fs::write("user/user.csr.pem", request.to_pem()?)?;

    let user_cert = authority.issue(&request, 365, false)?;
    fs::write("user/user.cert.pem", user_cert.to_pem()?)?;
    println!(
        "Issued {} (serial {}) under {}",
        user_cert.subject()?,
        user_cert.serial()?,
        root.subject()?
    );

    match authority
        .chain_validator()
        .validate(&user_cert, &[root], time::OffsetDateTime::now_utc())
    {
        ValidationResult::Valid { chain } => {
            println!("User certificate verified, chain length {}.", chain.len())
        }
        ValidationResult::Invalid { reason, serial } => {
            println!("User certificate rejected: {reason} (serial {serial:?})")
        }
    }
    Ok(())
}
