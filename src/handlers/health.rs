use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::router::CertifiState;

/// GET /health
pub async fn health(State(state): State<CertifiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "issuer": state.registry.issuer().to_string(),
        "ipfs": state.ipfs.is_configured(),
    }))
}
