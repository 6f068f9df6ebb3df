use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use axum_extra::extract::cookie::Key;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::chain::CredentialRegistry;
use crate::config::{BODY_LIMIT, Config};
use crate::db::CertifiStorage;
use crate::handlers::{auth, health, ipfs, verify};
use crate::ipfs::IpfsClient;
use crate::rpc;
use crate::service::{Issuer, Verifier};

/// Shared state for every handler.
#[derive(Clone)]
pub struct CertifiState {
    pub config: Arc<Config>,
    pub storage: CertifiStorage,
    pub registry: Arc<dyn CredentialRegistry>,
    pub ipfs: IpfsClient,
    pub client: reqwest::Client,
    key: Key,
}

impl CertifiState {
    pub fn new(
        config: Arc<Config>,
        storage: CertifiStorage,
        registry: Arc<dyn CredentialRegistry>,
        ipfs: IpfsClient,
        client: reqwest::Client,
        key: Key,
    ) -> Self {
        Self {
            config,
            storage,
            registry,
            ipfs,
            client,
            key,
        }
    }

    pub fn secure_cookies(&self) -> bool {
        !self.config.insecure_cookie
    }

    pub fn issuer(&self) -> Issuer<'_> {
        Issuer {
            storage: &self.storage,
            registry: self.registry.as_ref(),
            ipfs: &self.ipfs,
        }
    }

    pub fn verifier(&self) -> Verifier<'_> {
        Verifier {
            storage: &self.storage,
            registry: self.registry.as_ref(),
        }
    }
}

impl FromRef<CertifiState> for Key {
    fn from_ref(state: &CertifiState) -> Self {
        state.key.clone()
    }
}

pub fn certifi_router(state: CertifiState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/google", get(auth::google_oauth_entry))
        .route("/api/auth/callback/google", get(auth::google_oauth_callback))
        .route("/api/auth/wallet", post(auth::wallet_sign_in))
        .route("/api/auth/session", get(auth::current_session))
        .route("/api/auth/signout", post(auth::sign_out))
        .route(
            "/api/trpc/{path}",
            get(rpc::trpc_query).post(rpc::trpc_mutation),
        )
        .route("/api/ipfs/upload", post(ipfs::upload_file))
        .route("/api/ipfs/metadata", post(ipfs::upload_metadata))
        .route("/api/ipfs/{cid}", get(ipfs::get_json))
        .route("/api/verify", post(verify::verify_by_body))
        .route("/api/verify/document", post(verify::verify_document))
        .route("/api/verify/signature", post(verify::verify_signature))
        .route("/api/verify/{hash}", get(verify::verify_by_path))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(origin = %o, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-file-name"),
        ])
        .allow_credentials(true)
}
