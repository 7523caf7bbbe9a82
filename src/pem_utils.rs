use crate::error::{CaError, Result};

pub const PRIVATE_KEY: &str = "PRIVATE KEY";
pub const ENCRYPTED_PRIVATE_KEY: &str = "ENCRYPTED PRIVATE KEY";
pub const PUBLIC_KEY: &str = "PUBLIC KEY";
pub const X509_CRL: &str = "X509 CRL";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
///
/// Lines end in LF, which is what OpenSSL writes.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert a PEM‑encoded string to its label and DER‑encoded bytes.
pub fn pem_to_der(pem_str: &str) -> Result<(String, Vec<u8>)> {
    let pem = pem::parse(pem_str)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}

/// Like [`pem_to_der`], but fails unless the label is `expected`.
pub fn pem_to_der_expecting(pem_str: &str, expected: &str) -> Result<Vec<u8>> {
    let (label, der) = pem_to_der(pem_str)?;
    if label != expected {
        return Err(CaError::Parse(format!(
            "expected PEM label {expected}, found {label}"
        )));
    }
    Ok(der)
}
