#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use axum::body::{Body, Bytes, to_bytes};
use axum::extract::Path;
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use backon::ExponentialBuilder;
use certifi::auth::session::issue_session;
use certifi::auth::{SessionUser, UserRole};
use certifi::chain::MemoryRegistry;
use certifi::config::Config;
use certifi::db::CertifiStorage;
use certifi::ipfs::IpfsClient;
use certifi::router::{CertifiState, certifi_router};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

/// Key the in-memory registry issues with.
pub fn issuer_signer() -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&B256::repeat_byte(0x42)).expect("issuer key")
}

pub fn issuer() -> Address {
    issuer_signer().address()
}
pub const ADMIN: &str = "0xad00000000000000000000000000000000000001";

pub struct TestApp {
    pub router: Router,
    pub state: CertifiState,
    pub key: Key,
    db_path: std::path::PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

/// Minimal Kubo `add` + gateway stand-in. Every pin gets a CID derived from its size.
pub async fn spawn_ipfs_node() -> Url {
    async fn add(body: Bytes) -> impl IntoResponse {
        let cid = format!("bafy{}", body.len());
        axum::Json(json!({ "Name": "file", "Hash": cid, "Size": body.len().to_string() }))
    }
    async fn gateway(Path(cid): Path<String>) -> impl IntoResponse {
        axum::Json(json!({ "cid": cid }))
    }
    let app = Router::new()
        .route("/api/v0/add", post(add))
        .route("/ipfs/{cid}", get(gateway));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock ipfs node");
    let addr = listener.local_addr().expect("mock ipfs addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock ipfs node");
    });
    Url::parse(&format!("http://{addr}")).expect("mock ipfs url")
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Like [`spawn_app`], with a hook to adjust the configuration first.
pub async fn spawn_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    let mut db_path = std::env::temp_dir();
    db_path.push(format!("certifi-test-{}-{}.sqlite", std::process::id(), nanos));
    let database_url = format!("sqlite:{}", db_path.display());

    let storage = CertifiStorage::connect(&database_url)
        .await
        .expect("open test database");
    storage.init_schema().await.expect("init schema");

    let node = spawn_ipfs_node().await;
    let mut cfg = Config {
        database_url,
        insecure_cookie: true,
        ipfs_api_url: node.clone(),
        ipfs_gateway_url: node.join("/ipfs/").expect("gateway url"),
        ipfs_project_id: Some("project".into()),
        ipfs_project_secret: Some("secret".into()),
        admin_addresses: vec![ADMIN.to_string()],
        ..Config::default()
    };
    configure(&mut cfg);
    let client = reqwest::Client::new();
    let ipfs = IpfsClient::new(&cfg, client.clone())
        .with_retry_policy(ExponentialBuilder::default().with_max_times(0));
    let key = Key::generate();
    let state = CertifiState::new(
        Arc::new(cfg),
        storage,
        Arc::new(MemoryRegistry::new(issuer())),
        ipfs,
        client,
        key.clone(),
    );
    TestApp {
        router: certifi_router(state.clone()),
        state,
        key,
        db_path,
    }
}

pub fn student_user(email: &str) -> SessionUser {
    SessionUser {
        id: format!("google-{email}"),
        role: UserRole::Student,
        address: None,
        email: Some(email.to_string()),
        name: Some("Ada Lovelace".to_string()),
        image: Some("https://example.org/ada.png".to_string()),
        approved: true,
    }
}

pub fn institution_user(address: &str) -> SessionUser {
    SessionUser {
        id: address.to_string(),
        role: UserRole::Institution,
        address: Some(address.to_string()),
        email: None,
        name: Some("Institution 0xabcd...0001".to_string()),
        image: None,
        approved: true,
    }
}

/// First `name=value` pair of every `set-cookie` header, joined for a `cookie` header.
pub fn cookie_header(headers: &HeaderMap) -> String {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TestApp {
    /// Encrypted session cookie for `user`, as the browser would send it.
    pub fn session_cookie(&self, user: &SessionUser) -> String {
        let jar = PrivateCookieJar::new(self.key.clone());
        let jar = issue_session(jar, user, 3600, false).expect("issue session");
        let resp = (jar, ()).into_response();
        cookie_header(resp.headers())
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("request failed");
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&body).into_owned())
            })
        };
        (status, headers, json)
    }

    pub async fn query(&self, cookie: Option<&str>, path: &str, input: Value) -> (StatusCode, Value) {
        let encoded: String =
            url::form_urlencoded::byte_serialize(input.to_string().as_bytes()).collect();
        let mut req = Request::builder()
            .method("GET")
            .uri(format!("/api/trpc/{path}?input={encoded}"));
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let (status, _, body) = self.send(req.body(Body::empty()).expect("request")).await;
        (status, body)
    }

    pub async fn mutate(&self, cookie: Option<&str>, path: &str, input: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(format!("/api/trpc/{path}"))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let (status, _, body) = self
            .send(req.body(Body::from(input.to_string())).expect("request"))
            .await;
        (status, body)
    }
}
