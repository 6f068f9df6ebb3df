//! On-chain credential registry.
//!
//! The Certifi contract keys every credential by its keccak256 hash. The
//! service talks to it through [`CredentialRegistry`] so the HTTP layer does
//! not care whether it is backed by a live contract ([`ContractRegistry`]) or
//! the process-local [`MemoryRegistry`] used in demo mode and tests.

pub mod contract;
pub mod memory;

use alloy::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CertifiError;

pub use contract::{ContractRegistry, connect};
pub use memory::MemoryRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCredential {
    pub credential_hash: B256,
    /// Unix seconds; 0 means the credential never expires.
    pub expiry: u64,
    pub metadata_uri: String,
    pub document_hash: Option<B256>,
    /// Student wallet, when known. Only the memory registry indexes by it.
    pub recipient: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub issuer: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainCredential {
    pub is_valid: bool,
    pub issuer: Address,
    pub issue_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub metadata_uri: String,
    pub document_hash: Option<B256>,
}

impl OnChainCredential {
    /// What the contract reports for a hash it has never seen.
    pub fn unknown() -> Self {
        Self {
            is_valid: false,
            issuer: Address::ZERO,
            issue_date: from_unix(0),
            expiry_date: None,
            metadata_uri: String::new(),
            document_hash: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|exp| exp <= now)
    }
}

#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    /// Address that signs issuance transactions.
    fn issuer(&self) -> Address;

    async fn issue_credential(&self, req: IssueCredential) -> Result<TxReceipt, CertifiError>;

    async fn verify_credential(&self, hash: B256) -> Result<OnChainCredential, CertifiError>;

    /// `None` when the hash was never issued.
    async fn get_certificate(&self, hash: B256) -> Result<Option<OnChainCredential>, CertifiError>;

    async fn get_student_certificates(&self, student: Address) -> Result<Vec<B256>, CertifiError>;

    /// Whether `issuer` anchored `hash` and signed it (EIP-191 over the raw
    /// 32 bytes) with `signature`.
    async fn verify_signature(
        &self,
        hash: B256,
        signature: Bytes,
        issuer: Address,
    ) -> Result<bool, CertifiError>;

    async fn revoke_credential(&self, hash: B256) -> Result<TxReceipt, CertifiError>;
}

/// Unix seconds to UTC; out-of-range values clamp to the epoch.
pub fn from_unix(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Contract convention: a zero timestamp means "no expiry".
pub fn expiry_from_unix(secs: u64) -> Option<DateTime<Utc>> {
    (secs > 0).then(|| from_unix(secs))
}
