use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::auth::AuthSession;
use crate::error::CertifiError;
use crate::ipfs::ipfs_uri;
use crate::router::CertifiState;

/// Header carrying the original file name of a raw upload.
pub const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pinned {
    pub cid: String,
    pub uri: String,
    pub gateway_url: String,
}

impl Pinned {
    fn new(state: &CertifiState, cid: String) -> Result<Self, CertifiError> {
        Ok(Self {
            uri: ipfs_uri(&cid),
            gateway_url: state.ipfs.gateway_url(&cid)?.to_string(),
            cid,
        })
    }
}

/// POST /api/ipfs/upload -> pins the raw request body.
pub async fn upload_file(
    State(state): State<CertifiState>,
    AuthSession(user): AuthSession,
    content_type: Option<TypedHeader<ContentType>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Pinned>, CertifiError> {
    if body.is_empty() {
        return Err(CertifiError::BadRequest("No file provided".to_string()));
    }
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("upload")
        .to_string();
    let mime = content_type
        .map(|TypedHeader(ct)| ct.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let cid = state
        .ipfs
        .upload_bytes(&file_name, Some(&mime), body.to_vec())
        .await?;
    info!(user = %user.id, cid = %cid, file = %file_name, mime = %mime, "file uploaded");
    Ok(Json(Pinned::new(&state, cid)?))
}

/// POST /api/ipfs/metadata -> pins a JSON document.
pub async fn upload_metadata(
    State(state): State<CertifiState>,
    AuthSession(user): AuthSession,
    Json(metadata): Json<Value>,
) -> Result<Json<Pinned>, CertifiError> {
    if !metadata.is_object() {
        return Err(CertifiError::BadRequest(
            "metadata must be a JSON object".to_string(),
        ));
    }
    let cid = state.ipfs.upload_metadata(&metadata).await?;
    info!(user = %user.id, cid = %cid, "metadata uploaded");
    Ok(Json(Pinned::new(&state, cid)?))
}

/// GET /api/ipfs/{cid} -> JSON document from the gateway. Only CIDs are
/// accepted; anything that would leave the gateway is a `BAD_REQUEST`.
pub async fn get_json(
    State(state): State<CertifiState>,
    Path(cid): Path<String>,
) -> Result<Json<Value>, CertifiError> {
    Ok(Json(state.ipfs.fetch_json(&cid).await?))
}
