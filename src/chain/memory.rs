use alloy::primitives::{Address, B256, Bytes, PrimitiveSignature, keccak256};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    CredentialRegistry, IssueCredential, OnChainCredential, TxReceipt, expiry_from_unix, from_unix,
};
use crate::error::CertifiError;

#[derive(Debug, Clone)]
struct Record {
    issued_at: u64,
    expiry: u64,
    metadata_uri: String,
    document_hash: Option<B256>,
    revoked: bool,
}

#[derive(Default)]
struct Ledger {
    records: HashMap<B256, Record>,
    by_recipient: HashMap<Address, Vec<B256>>,
    nonce: u64,
}

impl Ledger {
    /// Pseudo transaction hash, unique per write.
    fn next_tx_hash(&mut self, credential: B256) -> B256 {
        self.nonce += 1;
        let mut buf = credential.to_vec();
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        keccak256(buf)
    }
}

/// Process-local registry with the contract's semantics.
///
/// Used when no RPC endpoint is configured and in tests. Nothing survives a
/// restart.
pub struct MemoryRegistry {
    issuer: Address,
    ledger: RwLock<Ledger>,
}

impl MemoryRegistry {
    pub fn new(issuer: Address) -> Self {
        Self {
            issuer,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    fn view(&self, record: &Record) -> OnChainCredential {
        OnChainCredential {
            is_valid: !record.revoked,
            issuer: self.issuer,
            issue_date: from_unix(record.issued_at),
            expiry_date: expiry_from_unix(record.expiry),
            metadata_uri: record.metadata_uri.clone(),
            document_hash: record.document_hash,
        }
    }
}

#[async_trait]
impl CredentialRegistry for MemoryRegistry {
    fn issuer(&self) -> Address {
        self.issuer
    }

    async fn issue_credential(&self, req: IssueCredential) -> Result<TxReceipt, CertifiError> {
        let mut ledger = self.ledger.write().await;
        if ledger.records.contains_key(&req.credential_hash) {
            return Err(CertifiError::Conflict(
                "Credential already issued".to_string(),
            ));
        }
        let tx_hash = ledger.next_tx_hash(req.credential_hash);
        ledger.records.insert(
            req.credential_hash,
            Record {
                issued_at: Utc::now().timestamp().max(0) as u64,
                expiry: req.expiry,
                metadata_uri: req.metadata_uri,
                document_hash: req.document_hash.filter(|h| *h != B256::ZERO),
                revoked: false,
            },
        );
        if let Some(recipient) = req.recipient {
            ledger
                .by_recipient
                .entry(recipient)
                .or_default()
                .push(req.credential_hash);
        }
        info!(credential = %req.credential_hash, tx = %tx_hash, "credential recorded in memory registry");
        Ok(TxReceipt {
            tx_hash,
            issuer: self.issuer,
        })
    }

    async fn verify_credential(&self, hash: B256) -> Result<OnChainCredential, CertifiError> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .records
            .get(&hash)
            .map(|r| {
                let mut view = self.view(r);
                view.document_hash = None;
                view
            })
            .unwrap_or_else(OnChainCredential::unknown))
    }

    async fn get_certificate(&self, hash: B256) -> Result<Option<OnChainCredential>, CertifiError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.records.get(&hash).map(|r| self.view(r)))
    }

    async fn get_student_certificates(&self, student: Address) -> Result<Vec<B256>, CertifiError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.by_recipient.get(&student).cloned().unwrap_or_default())
    }

    async fn verify_signature(
        &self,
        hash: B256,
        signature: Bytes,
        issuer: Address,
    ) -> Result<bool, CertifiError> {
        let ledger = self.ledger.read().await;
        let anchored =
            issuer == self.issuer && ledger.records.get(&hash).is_some_and(|r| !r.revoked);
        if !anchored {
            return Ok(false);
        }
        let recovered = PrimitiveSignature::from_raw(&signature)
            .ok()
            .and_then(|sig| sig.recover_address_from_msg(hash.as_slice()).ok());
        Ok(recovered == Some(issuer))
    }

    async fn revoke_credential(&self, hash: B256) -> Result<TxReceipt, CertifiError> {
        let mut ledger = self.ledger.write().await;
        match ledger.records.get_mut(&hash) {
            None => return Err(CertifiError::NotFound("Credential not found".to_string())),
            Some(r) if r.revoked => {
                return Err(CertifiError::Conflict(
                    "Credential already revoked".to_string(),
                ));
            }
            Some(r) => r.revoked = true,
        }
        let tx_hash = ledger.next_tx_hash(hash);
        Ok(TxReceipt {
            tx_hash,
            issuer: self.issuer,
        })
    }
}
