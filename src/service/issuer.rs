use alloy::primitives::Address;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::auth::wallet::display_name;
use crate::auth::{SessionUser, UserRole};
use crate::chain::{CredentialRegistry, IssueCredential};
use crate::crypto::{credential_hash, document_hash, parse_hash, to_hex};
use crate::db::{CertifiStorage, DbCertificate, NewCertificate};
use crate::error::CertifiError;
use crate::ipfs::{IpfsClient, ipfs_uri};
use crate::types::certificate::{CertificateData, CertificateMetadata, InstitutionRef};

/// A certificate file attached to an issuance.
#[derive(Debug, Clone)]
pub struct CertificateFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub student_id: String,
    pub certificate_title: String,
    pub certificate_course: String,
    /// Defaults to today (UTC).
    pub issue_date: Option<String>,
    /// Defaults to the issue date.
    pub start_date: Option<String>,
    pub file: Option<CertificateFile>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueOutcome {
    pub transaction_hash: String,
    pub credential_hash: String,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub certificate: DbCertificate,
}

/// An institution allowed to write certificates.
#[derive(Debug, Clone)]
pub struct ActiveInstitution {
    /// Lowercase wallet address.
    pub wallet: String,
    pub name: String,
}

/// Everything issuance touches.
pub struct Issuer<'a> {
    pub storage: &'a CertifiStorage,
    pub registry: &'a dyn CredentialRegistry,
    pub ipfs: &'a IpfsClient,
}

impl Issuer<'_> {
    /// Institution role, approved, and not suspended. The name comes from the
    /// registered profile when there is one.
    pub async fn active_institution(
        &self,
        user: &SessionUser,
    ) -> Result<ActiveInstitution, CertifiError> {
        user.require_role(UserRole::Institution)?;
        if !user.approved {
            return Err(CertifiError::Forbidden(
                "Institution is not approved to issue certificates".to_string(),
            ));
        }
        let wallet = user.wallet()?.to_lowercase();
        let name = match self.storage.institution_by_address(&wallet).await? {
            Some(inst) if !inst.is_active() => {
                return Err(CertifiError::Forbidden(
                    "Institution is suspended".to_string(),
                ));
            }
            Some(inst) => inst.name,
            None => user.name.clone().unwrap_or_else(|| display_name(&wallet)),
        };
        Ok(ActiveInstitution { wallet, name })
    }

    /// Upload the file and metadata, anchor the credential hash, record the certificate.
    pub async fn issue_certificate(
        &self,
        user: &SessionUser,
        req: IssueRequest,
    ) -> Result<IssueOutcome, CertifiError> {
        let ActiveInstitution {
            wallet,
            name: institution_name,
        } = self.active_institution(user).await?;

        if req.certificate_title.trim().is_empty() {
            return Err(CertifiError::BadRequest(
                "certificateTitle is required".to_string(),
            ));
        }
        let student = self
            .storage
            .find_student_by_student_id(&req.student_id)
            .await?
            .ok_or_else(|| CertifiError::NotFound("Student not found".to_string()))?;

        let issue_date = req
            .issue_date
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
        let data = CertificateData {
            recipient_name: student.full_name.clone(),
            recipient_email: student.email.clone(),
            recipient_id: student.student_id.clone(),
            certificate_title: req.certificate_title,
            certificate_course: req.certificate_course,
            issue_date,
        };
        let hash = credential_hash(&data);
        let hash_hex = to_hex(&hash);
        if self
            .storage
            .certificate_by_credential_hash(&hash_hex)
            .await?
            .is_some()
        {
            return Err(CertifiError::Conflict(
                "Certificate already issued".to_string(),
            ));
        }

        let (doc_hash, certificate_uri) = match req.file {
            Some(file) => {
                let doc_hash = document_hash(&file.bytes);
                let cid = self
                    .ipfs
                    .upload_bytes(&file.name, file.mime.as_deref(), file.bytes)
                    .await?;
                (Some(doc_hash), Some(ipfs_uri(&cid)))
            }
            None => (None, None),
        };

        let metadata = CertificateMetadata::new(
            &data,
            InstitutionRef {
                name: institution_name.clone(),
                address: wallet.clone(),
            },
            certificate_uri,
        );
        let metadata_uri = ipfs_uri(&self.ipfs.upload_metadata(&metadata).await?);

        let recipient = student
            .wallet_address
            .as_deref()
            .and_then(|a| a.parse::<Address>().ok());
        let receipt = self
            .registry
            .issue_credential(IssueCredential {
                credential_hash: hash,
                expiry: 0,
                metadata_uri: metadata_uri.clone(),
                document_hash: doc_hash.as_deref().map(parse_hash).transpose()?,
                recipient,
            })
            .await?;
        let tx_hash = to_hex(&receipt.tx_hash);

        let certificate = self
            .storage
            .insert_certificate(NewCertificate {
                student_id: student.student_id.clone(),
                institution: institution_name,
                degree: data.certificate_title.clone(),
                field_of_study: data.certificate_course.clone(),
                start_date: req.start_date.unwrap_or_else(|| data.issue_date.clone()),
                issue_date: data.issue_date.clone(),
                document_hash: doc_hash,
                credential_hash: Some(hash_hex.clone()),
                metadata_uri: Some(metadata_uri.clone()),
                tx_hash: Some(tx_hash.clone()),
                issuer_address: Some(wallet),
            })
            .await
            .inspect_err(|e| {
                error!(
                    tx = %tx_hash,
                    credential = %hash_hex,
                    error = %e,
                    "credential anchored on chain but not recorded"
                );
            })?;

        info!(
            student = %certificate.student_id,
            credential = %hash_hex,
            tx = %tx_hash,
            "certificate issued"
        );
        Ok(IssueOutcome {
            transaction_hash: tx_hash,
            credential_hash: hash_hex,
            metadata_uri,
            certificate,
        })
    }

    /// Revoke a credential this institution issued.
    pub async fn revoke_certificate(
        &self,
        user: &SessionUser,
        credential_hash: &str,
    ) -> Result<String, CertifiError> {
        let ActiveInstitution { wallet, .. } = self.active_institution(user).await?;
        let hash = parse_hash(credential_hash)?;
        let certificate = self
            .storage
            .certificate_by_credential_hash(&to_hex(&hash))
            .await?
            .ok_or_else(|| CertifiError::NotFound("Certificate not found".to_string()))?;
        let issued_by_caller = certificate
            .issuer_address
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(&wallet));
        if !issued_by_caller {
            return Err(CertifiError::Forbidden(
                "Only the issuing institution can revoke this certificate".to_string(),
            ));
        }
        let receipt = self.registry.revoke_credential(hash).await?;
        let tx_hash = to_hex(&receipt.tx_hash);
        info!(credential = %to_hex(&hash), tx = %tx_hash, "certificate revoked");
        Ok(tx_hash)
    }
}
