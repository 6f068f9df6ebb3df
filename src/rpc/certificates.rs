use alloy::primitives::Address;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use super::{RpcContext, parse_input};
use crate::auth::UserRole;
use crate::crypto::{hashes_match, parse_hash, to_hex};
use crate::db::{DbCertificate, NewCertificate};
use crate::error::{CertifiError, ErrorCode};
use crate::service::{CertificateFile, IssueOutcome, IssueRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateInput {
    pub student_id: String,
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub document_hash: Option<String>,
    #[serde(default)]
    pub credential_hash: Option<String>,
    #[serde(default, rename = "metadataURI")]
    pub metadata_uri: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SavedCertificate {
    pub success: bool,
    pub certificate: DbCertificate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueInput {
    pub student_id: String,
    pub certificate_title: String,
    #[serde(default)]
    pub certificate_course: String,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Certificate file, base64 or a `data:` URL.
    #[serde(default)]
    pub file_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeInput {
    pub credential_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revoked {
    pub success: bool,
    pub transaction_hash: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OnChainInput {
    /// Recipient wallet; defaults to the caller's own wallet.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InstitutionInput {
    pub institution: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInput {
    pub student_id: String,
}

pub async fn create(ctx: &RpcContext<'_>, input: Value) -> Result<SavedCertificate, CertifiError> {
    let institution = ctx.state.issuer().active_institution(&ctx.user).await?;
    let mut input: CreateCertificateInput = parse_input(input)?;
    input.document_hash = input.document_hash.as_deref().map(normalize_hash).transpose()?;
    input.credential_hash = input.credential_hash.as_deref().map(normalize_hash).transpose()?;
    if input.student_id.trim().is_empty() || input.institution.trim().is_empty() {
        return Err(CertifiError::BadRequest(
            "studentId and institution are required".to_string(),
        ));
    }
    if let Some(doc_hash) = input.document_hash.as_deref() {
        let bound = ctx.state.storage.certificates_by_document_hash(doc_hash).await?;
        let taken = bound.iter().any(|existing| {
            match (existing.credential_hash.as_deref(), input.credential_hash.as_deref()) {
                (Some(existing), Some(new)) => !hashes_match(existing, new),
                _ => true,
            }
        });
        if taken {
            return Err(CertifiError::Conflict(
                "Document is already bound to another certificate".to_string(),
            ));
        }
    }
    let new = NewCertificate {
        student_id: input.student_id,
        institution: input.institution,
        degree: input.degree,
        field_of_study: input.field_of_study,
        start_date: input.start_date,
        issue_date: input
            .issue_date
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string()),
        document_hash: input.document_hash,
        credential_hash: input.credential_hash,
        metadata_uri: input.metadata_uri,
        tx_hash: input.transaction_hash,
        issuer_address: Some(institution.wallet),
    };
    let certificate = ctx
        .state
        .storage
        .insert_certificate(new)
        .await
        .map_err(|e| match e.code() {
            ErrorCode::NotFound | ErrorCode::Conflict => e,
            _ => {
                error!(error = %e, "saving certificate failed");
                CertifiError::Internal("Failed to save certificate data".to_string())
            }
        })?;
    Ok(SavedCertificate {
        success: true,
        certificate,
    })
}

pub async fn issue(ctx: &RpcContext<'_>, input: Value) -> Result<IssueOutcome, CertifiError> {
    ctx.user.require_role(UserRole::Institution)?;
    let input: IssueInput = parse_input(input)?;
    let file = input
        .file_base64
        .as_deref()
        .map(decode_file)
        .transpose()?
        .map(|(mime, bytes)| CertificateFile {
            name: input
                .file_name
                .clone()
                .unwrap_or_else(|| "certificate".to_string()),
            mime,
            bytes,
        });
    ctx.state
        .issuer()
        .issue_certificate(
            &ctx.user,
            IssueRequest {
                student_id: input.student_id,
                certificate_title: input.certificate_title,
                certificate_course: input.certificate_course,
                issue_date: input.issue_date,
                start_date: input.start_date,
                file,
            },
        )
        .await
}

pub async fn revoke(ctx: &RpcContext<'_>, input: Value) -> Result<Revoked, CertifiError> {
    let input: RevokeInput = parse_input(input)?;
    let transaction_hash = ctx
        .state
        .issuer()
        .revoke_certificate(&ctx.user, &input.credential_hash)
        .await?;
    Ok(Revoked {
        success: true,
        transaction_hash,
    })
}

pub async fn by_institution(
    ctx: &RpcContext<'_>,
    input: Value,
) -> Result<Vec<DbCertificate>, CertifiError> {
    let input: InstitutionInput = parse_input(input)?;
    ctx.state
        .storage
        .certificates_by_institution(&input.institution)
        .await
}

pub async fn by_student(
    ctx: &RpcContext<'_>,
    input: Value,
) -> Result<Vec<DbCertificate>, CertifiError> {
    let input: StudentInput = parse_input(input)?;
    ctx.state
        .storage
        .certificates_by_student(&input.student_id)
        .await
}

fn normalize_hash(hash: &str) -> Result<String, CertifiError> {
    Ok(to_hex(&parse_hash(hash)?))
}

/// Decode a base64 file, keeping the media type of a `data:` URL.
/// Credential hashes the registry holds for a recipient wallet.
pub async fn on_chain_by_student(
    ctx: &RpcContext<'_>,
    input: Value,
) -> Result<Vec<String>, CertifiError> {
    let input: OnChainInput = if input.is_null() {
        OnChainInput::default()
    } else {
        parse_input(input)?
    };
    let wallet = match input.address {
        Some(address) => address,
        None if ctx.user.role == UserRole::Student => super::students::session_student(ctx)
            .await?
            .wallet_address
            .ok_or_else(|| {
                CertifiError::BadRequest("No wallet linked to this student".to_string())
            })?,
        None => ctx.user.wallet()?.to_string(),
    };
    let recipient: Address = wallet
        .parse()
        .map_err(|_| CertifiError::BadRequest(format!("invalid wallet address: {wallet}")))?;
    let hashes = ctx.state.registry.get_student_certificates(recipient).await?;
    Ok(hashes.iter().map(to_hex).collect())
}

fn decode_file(encoded: &str) -> Result<(Option<String>, Vec<u8>), CertifiError> {
    let (mime, payload) = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => {
            let mime = prefix.trim_start_matches("data:");
            ((!mime.is_empty()).then(|| mime.to_string()), data)
        }
        _ => (None, encoded),
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| CertifiError::BadRequest(format!("fileBase64 is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(CertifiError::BadRequest("certificate file is empty".to_string()));
    }
    Ok((mime, bytes))
}
