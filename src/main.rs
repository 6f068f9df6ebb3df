use std::sync::Arc;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use axum_extra::extract::cookie::Key;
use certifi::chain::{self, CredentialRegistry, MemoryRegistry};
use certifi::config::{CONFIG, Config};
use certifi::db::CertifiStorage;
use certifi::ipfs::IpfsClient;
use certifi::router::{CertifiState, certifi_router};
use mimalloc::MiMalloc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        public_url = %cfg.public_url,
        rpc_url = %cfg.rpc_url.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        google = cfg.google_enabled(),
        loglevel = %cfg.loglevel,
    );

    let storage = CertifiStorage::connect(&cfg.database_url).await?;
    storage.init_schema().await?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("certifi/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .build()?;

    let registry = build_registry(cfg)?;
    let ipfs = IpfsClient::new(cfg, client.clone());
    let key = cookie_key(cfg);

    let state = CertifiState::new(
        Arc::new(cfg.clone()),
        storage.clone(),
        registry,
        ipfs,
        client,
        key,
    );
    let app = certifi_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    storage.pool().close().await;
    info!("HTTP server stopped");
    Ok(())
}

/// Contract-backed registry when fully configured, in-memory otherwise.
fn build_registry(cfg: &Config) -> Result<Arc<dyn CredentialRegistry>, Box<dyn std::error::Error>> {
    match (&cfg.rpc_url, &cfg.contract_address, &cfg.issuer_private_key) {
        (Some(rpc_url), Some(contract), Some(key)) => {
            let contract: Address = contract.parse()?;
            let signer: PrivateKeySigner = key.parse()?;
            Ok(chain::connect(rpc_url.clone(), contract, signer))
        }
        _ => {
            let issuer = match &cfg.issuer_private_key {
                Some(key) => key.parse::<PrivateKeySigner>()?.address(),
                None => PrivateKeySigner::random().address(),
            };
            warn!(%issuer, "no contract configured, credentials are kept in memory only");
            Ok(Arc::new(MemoryRegistry::new(issuer)))
        }
    }
}

fn cookie_key(cfg: &Config) -> Key {
    match cfg.session_secret.as_deref().map(|s| Key::try_from(s.as_bytes())) {
        Some(Ok(key)) => key,
        Some(Err(_)) => {
            warn!("CERTIFI_SESSION_SECRET is shorter than 64 bytes, using a random key");
            Key::generate()
        }
        None => {
            warn!("CERTIFI_SESSION_SECRET not set, sessions will not survive a restart");
            Key::generate()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!("failed to install SIGTERM handler: {}", err),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
