use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Deserialize;

use crate::error::CertifiError;
use crate::router::CertifiState;
use crate::service::{DocumentVerification, SignatureVerification, VerificationResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub credential_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub credential_hash: String,
    pub signature: String,
    pub issuer: String,
}

/// GET /api/verify/{hash}
pub async fn verify_by_path(
    State(state): State<CertifiState>,
    Path(hash): Path<String>,
) -> Result<Json<VerificationResult>, CertifiError> {
    Ok(Json(state.verifier().verify_hash(&hash).await?))
}

/// POST /api/verify
pub async fn verify_by_body(
    State(state): State<CertifiState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerificationResult>, CertifiError> {
    Ok(Json(state.verifier().verify_hash(&req.credential_hash).await?))
}

/// POST /api/verify/document -> raw certificate file in the body.
pub async fn verify_document(
    State(state): State<CertifiState>,
    body: Bytes,
) -> Result<Json<DocumentVerification>, CertifiError> {
    Ok(Json(state.verifier().verify_document(&body).await?))
}

/// POST /api/verify/signature
pub async fn verify_signature(
    State(state): State<CertifiState>,
    Json(req): Json<SignatureRequest>,
) -> Result<Json<SignatureVerification>, CertifiError> {
    Ok(Json(
        state
            .verifier()
            .verify_signature(&req.credential_hash, &req.signature, &req.issuer)
            .await?,
    ))
}
