use alloy::primitives::{Address, Bytes};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::chain::CredentialRegistry;
use crate::crypto::{document_hash, hashes_match, parse_hash, to_hex};
use crate::db::{CertifiStorage, DbCertificate};
use crate::error::CertifiError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub credential_hash: String,
    /// Anchored, not revoked and not expired.
    pub is_valid: bool,
    pub on_chain: bool,
    pub revoked: bool,
    pub expired: bool,
    pub issuer: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: Option<String>,
    /// Document hash stored with the on-chain record.
    pub anchored_document_hash: Option<String>,
    pub certificate: Option<DbCertificate>,
}

impl VerificationResult {
    /// A local record that was never anchored.
    fn unanchored(certificate: DbCertificate) -> Self {
        Self {
            credential_hash: String::new(),
            is_valid: false,
            on_chain: false,
            revoked: false,
            expired: false,
            issuer: None,
            issue_date: None,
            expiry_date: None,
            metadata_uri: certificate.metadata_uri.clone(),
            anchored_document_hash: None,
            certificate: Some(certificate),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVerification {
    pub document_hash: String,
    #[serde(flatten)]
    pub verification: VerificationResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerification {
    pub credential_hash: String,
    pub issuer: String,
    pub signature_valid: bool,
}

pub struct Verifier<'a> {
    pub storage: &'a CertifiStorage,
    pub registry: &'a dyn CredentialRegistry,
}

impl Verifier<'_> {
    /// Check a credential hash against the registry and join the local record.
    pub async fn verify_hash(&self, hash: &str) -> Result<VerificationResult, CertifiError> {
        let hash = parse_hash(hash)?;
        let hash_hex = to_hex(&hash);
        let certificate = self.storage.certificate_by_credential_hash(&hash_hex).await?;
        let onchain = self.registry.verify_credential(hash).await?;

        let on_chain = onchain.issuer != Address::ZERO;
        let record = if on_chain {
            self.registry.get_certificate(hash).await?
        } else {
            None
        };
        let revoked = record.as_ref().is_some_and(|r| !r.is_valid);
        let expired = on_chain && onchain.is_expired(Utc::now());
        debug!(credential = %hash_hex, on_chain, valid = onchain.is_valid, revoked, expired, "verified credential");
        Ok(VerificationResult {
            credential_hash: hash_hex,
            is_valid: on_chain && onchain.is_valid && !revoked && !expired,
            on_chain,
            revoked,
            expired,
            issuer: on_chain.then(|| onchain.issuer.to_string()),
            issue_date: on_chain.then_some(onchain.issue_date),
            expiry_date: onchain.expiry_date,
            metadata_uri: (!onchain.metadata_uri.is_empty()).then_some(onchain.metadata_uri),
            anchored_document_hash: record.and_then(|r| r.document_hash).map(|h| to_hex(&h)),
            certificate,
        })
    }

    /// Check an issuer's signature over a credential hash against the registry.
    pub async fn verify_signature(
        &self,
        hash: &str,
        signature: &str,
        issuer: &str,
    ) -> Result<SignatureVerification, CertifiError> {
        let hash = parse_hash(hash)?;
        let raw = signature.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let signature = hex::decode(raw)
            .map_err(|e| CertifiError::BadRequest(format!("signature is not hex: {e}")))?;
        let issuer: Address = issuer
            .trim()
            .parse()
            .map_err(|_| CertifiError::BadRequest(format!("invalid issuer address: {issuer}")))?;
        let signature_valid = self
            .registry
            .verify_signature(hash, Bytes::from(signature), issuer)
            .await?;
        debug!(credential = %hash, %issuer, signature_valid, "verified issuer signature");
        Ok(SignatureVerification {
            credential_hash: to_hex(&hash),
            issuer: issuer.to_string(),
            signature_valid,
        })
    }

    /// Hash the document and verify the certificates recorded for it.
    ///
    /// A row whose credential is valid on chain, and anchored with this very
    /// document when the chain stores one, wins over any other row. Without
    /// one, the oldest anchored row is reported, then the oldest row.
    pub async fn verify_document(&self, bytes: &[u8]) -> Result<DocumentVerification, CertifiError> {
        if bytes.is_empty() {
            return Err(CertifiError::BadRequest("document is empty".to_string()));
        }
        let doc_hash = document_hash(bytes);
        let certificates = self.storage.certificates_by_document_hash(&doc_hash).await?;
        if certificates.is_empty() {
            return Err(CertifiError::NotFound(
                "No certificate matches this document".to_string(),
            ));
        }

        let mut fallback: Option<VerificationResult> = None;
        for certificate in certificates {
            let mut verification = match certificate.credential_hash.as_deref() {
                Some(hash) if parse_hash(hash).is_ok() => self.verify_hash(hash).await?,
                _ => VerificationResult::unanchored(certificate),
            };
            let same_document = verification
                .anchored_document_hash
                .as_deref()
                .is_none_or(|anchored| hashes_match(anchored, &doc_hash));
            if !same_document {
                verification.is_valid = false;
            }
            if verification.is_valid {
                return Ok(DocumentVerification {
                    document_hash: doc_hash,
                    verification,
                });
            }
            let better = match &fallback {
                None => true,
                Some(current) => !current.on_chain && verification.on_chain,
            };
            if better {
                fallback = Some(verification);
            }
        }

        let verification = fallback.ok_or_else(|| {
            CertifiError::NotFound("No certificate matches this document".to_string())
        })?;
        debug!(document = %doc_hash, "no valid certificate for document");
        Ok(DocumentVerification {
            document_hash: doc_hash,
            verification,
        })
    }
}
