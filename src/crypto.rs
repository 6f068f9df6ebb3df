//! Credential and document hashing.
//!
//! Credential hashes are keccak256 over the canonical certificate string and
//! double as the key of the on-chain record. Document hashes are SHA-256 over
//! the raw certificate file.

use alloy::primitives::{B256, keccak256};
use sha2::{Digest, Sha256};

use crate::error::CertifiError;
use crate::types::certificate::CertificateData;

/// `title:recipientName:recipientId:issueDate`
pub fn credential_preimage(data: &CertificateData) -> String {
    format!(
        "{}:{}:{}:{}",
        data.certificate_title, data.recipient_name, data.recipient_id, data.issue_date
    )
}

pub fn credential_hash(data: &CertificateData) -> B256 {
    keccak256(credential_preimage(data).as_bytes())
}

/// SHA-256 of `bytes`, lowercase hex with a `0x` prefix.
pub fn document_hash(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha256::digest(bytes)))
}

pub fn keccak256_hex(bytes: &[u8]) -> String {
    to_hex(&keccak256(bytes))
}

pub fn to_hex(hash: &B256) -> String {
    format!("0x{}", hex::encode(hash.as_slice()))
}

/// Parse a 32-byte hash given with or without `0x`, in any case.
pub fn parse_hash(input: &str) -> Result<B256, CertifiError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits)
        .map_err(|e| CertifiError::BadRequest(format!("hash is not valid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(CertifiError::BadRequest(format!(
            "hash must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Malformed input never matches.
pub fn hashes_match(a: &str, b: &str) -> bool {
    match (parse_hash(a), parse_hash(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CertificateData {
        CertificateData {
            recipient_name: "Grace Hopper".into(),
            recipient_email: "grace@example.org".into(),
            recipient_id: "STU123456".into(),
            certificate_title: "MSc Computer Science".into(),
            certificate_course: "Compilers".into(),
            issue_date: "2024-05-01".into(),
        }
    }

    #[test]
    fn keccak_matches_known_vectors() {
        assert_eq!(
            keccak256_hex(b""),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            keccak256_hex(b"hello"),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn credential_hash_covers_title_name_id_and_date() {
        let data = sample();
        assert_eq!(
            credential_preimage(&data),
            "MSc Computer Science:Grace Hopper:STU123456:2024-05-01"
        );
        assert_eq!(
            credential_hash(&data),
            keccak256(b"MSc Computer Science:Grace Hopper:STU123456:2024-05-01")
        );

        // email and course are not part of the preimage
        let other = CertificateData {
            recipient_email: "other@example.org".into(),
            certificate_course: "Databases".into(),
            ..sample()
        };
        assert_eq!(credential_hash(&other), credential_hash(&data));
    }

    #[test]
    fn document_hash_is_prefixed_sha256() {
        assert_eq!(
            document_hash(b"hello"),
            "0x2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(document_hash(b"").len(), 66);
    }

    #[test]
    fn parse_hash_accepts_prefix_and_case() {
        let lower = "0x2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        let upper_no_prefix = lower[2..].to_uppercase();
        assert_eq!(parse_hash(lower).unwrap(), parse_hash(&upper_no_prefix).unwrap());
        assert!(hashes_match(lower, &upper_no_prefix));
    }

    #[test]
    fn parse_hash_rejects_bad_input() {
        assert!(matches!(parse_hash("0x1234"), Err(CertifiError::BadRequest(_))));
        assert!(matches!(parse_hash("zz"), Err(CertifiError::BadRequest(_))));
        assert!(!hashes_match("0x1234", "0x1234"));
    }
}
