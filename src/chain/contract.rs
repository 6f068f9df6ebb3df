use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::{
    CredentialRegistry, IssueCredential, OnChainCredential, TxReceipt, expiry_from_unix, from_unix,
};
use crate::error::CertifiError;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract Certifi {
        function issueCredential(bytes32 credentialHash, uint256 expiryDate, string metadataURI, bytes32 documentHash) external;
        function revokeCredential(bytes32 credentialHash) external;
        function verifyCredential(bytes32 credentialHash) external view returns (bool isValid, address issuer, uint256 issueDate, uint256 expiryDate, string metadataURI);
        function getCertificate(bytes32 credentialHash) external view returns (address issuer, uint256 issueDate, uint256 expiryDate, string metadataURI, bytes32 documentHash, bool revoked);
        function getStudentCertificates(address student) external view returns (bytes32[] memory);
        function verifyCredentialWithSignature(bytes32 credentialHash, bytes signature, address issuer) external view returns (bool);
    }
}

fn read_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Network failures, rate limits and 5xx replies. Reverts and JSON-RPC error
/// responses are final.
fn is_transport_error(e: &alloy::contract::Error) -> bool {
    match e {
        alloy::contract::Error::TransportError(RpcError::Transport(kind)) => match kind {
            TransportErrorKind::HttpError(http) => http.status == 429 || http.status >= 500,
            _ => true,
        },
        _ => false,
    }
}

fn chain_err(e: impl std::fmt::Display) -> CertifiError {
    CertifiError::Chain(e.to_string())
}

/// Registry backed by the deployed Certifi contract.
pub struct ContractRegistry<P> {
    contract: Certifi::CertifiInstance<Http<Client>, P>,
    issuer: Address,
}

/// HTTP provider with a local wallet; `signer` pays for and signs issuance.
pub fn connect(
    rpc_url: Url,
    contract_address: Address,
    signer: PrivateKeySigner,
) -> Arc<dyn CredentialRegistry> {
    let issuer = signer.address();
    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_http(rpc_url);
    let contract = Certifi::new(contract_address, provider);
    info!(%contract_address, %issuer, "connected credential registry contract");
    Arc::new(ContractRegistry { contract, issuer })
}

#[async_trait]
impl<P> CredentialRegistry for ContractRegistry<P>
where
    P: Provider<Http<Client>> + Clone + Send + Sync + 'static,
{
    fn issuer(&self) -> Address {
        self.issuer
    }

    async fn issue_credential(&self, req: IssueCredential) -> Result<TxReceipt, CertifiError> {
        let pending = self
            .contract
            .issueCredential(
                req.credential_hash,
                U256::from(req.expiry),
                req.metadata_uri,
                req.document_hash.unwrap_or(B256::ZERO),
            )
            .send()
            .await
            .map_err(chain_err)?;
        let tx_hash = pending.watch().await.map_err(chain_err)?;
        info!(credential = %req.credential_hash, tx = %tx_hash, "credential issued on chain");
        Ok(TxReceipt {
            tx_hash,
            issuer: self.issuer,
        })
    }

    async fn verify_credential(&self, hash: B256) -> Result<OnChainCredential, CertifiError> {
        let ret = (|| async { self.contract.verifyCredential(hash).call().await })
            .retry(read_retry_policy())
            .when(is_transport_error)
            .notify(|err, dur: Duration| {
                warn!("verifyCredential retrying after error {}, sleeping {:?}", err, dur);
            })
            .await
            .map_err(chain_err)?;
        Ok(OnChainCredential {
            is_valid: ret.isValid,
            issuer: ret.issuer,
            issue_date: from_unix(ret.issueDate.saturating_to::<u64>()),
            expiry_date: expiry_from_unix(ret.expiryDate.saturating_to::<u64>()),
            metadata_uri: ret.metadataURI,
            document_hash: None,
        })
    }

    async fn get_certificate(&self, hash: B256) -> Result<Option<OnChainCredential>, CertifiError> {
        let ret = (|| async { self.contract.getCertificate(hash).call().await })
            .retry(read_retry_policy())
            .when(is_transport_error)
            .await
            .map_err(chain_err)?;
        if ret.issuer == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(OnChainCredential {
            is_valid: !ret.revoked,
            issuer: ret.issuer,
            issue_date: from_unix(ret.issueDate.saturating_to::<u64>()),
            expiry_date: expiry_from_unix(ret.expiryDate.saturating_to::<u64>()),
            metadata_uri: ret.metadataURI,
            document_hash: (ret.documentHash != B256::ZERO).then_some(ret.documentHash),
        }))
    }

    async fn get_student_certificates(&self, student: Address) -> Result<Vec<B256>, CertifiError> {
        let ret = (|| async { self.contract.getStudentCertificates(student).call().await })
            .retry(read_retry_policy())
            .when(is_transport_error)
            .await
            .map_err(chain_err)?;
        Ok(ret._0)
    }

    async fn verify_signature(
        &self,
        hash: B256,
        signature: Bytes,
        issuer: Address,
    ) -> Result<bool, CertifiError> {
        let ret = (|| async {
            self.contract
                .verifyCredentialWithSignature(hash, signature.clone(), issuer)
                .call()
                .await
        })
        .retry(read_retry_policy())
        .when(is_transport_error)
        .await
        .map_err(chain_err)?;
        Ok(ret._0)
    }

    async fn revoke_credential(&self, hash: B256) -> Result<TxReceipt, CertifiError> {
        let pending = self
            .contract
            .revokeCredential(hash)
            .send()
            .await
            .map_err(chain_err)?;
        let tx_hash = pending.watch().await.map_err(chain_err)?;
        info!(credential = %hash, tx = %tx_hash, "credential revoked on chain");
        Ok(TxReceipt {
            tx_hash,
            issuer: self.issuer,
        })
    }
}
