use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URI: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const GOOGLE_SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Name of the private cookie carrying the signed-in user.
pub const SESSION_COOKIE: &str = "certifi_session";

/// Upper bound for request bodies (certificate files travel through the API).
pub const BODY_LIMIT: usize = 20 * 1024 * 1024;

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid CERTIFI_* configuration"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,

    /// Externally visible base URL of this service, used for OAuth redirects.
    pub public_url: Url,
    /// Frontend base URL; Google sign-in lands here after the callback.
    pub frontend_url: Url,

    /// Cookie key material, at least 64 bytes. A random key is generated when unset.
    pub session_secret: Option<String>,
    pub session_max_age_secs: i64,
    pub insecure_cookie: bool,

    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_token_url: Url,
    pub google_userinfo_url: Url,

    pub rpc_url: Option<Url>,
    pub contract_address: Option<String>,
    pub issuer_private_key: Option<String>,

    pub ipfs_api_url: Url,
    pub ipfs_project_id: Option<String>,
    pub ipfs_project_secret: Option<String>,
    pub ipfs_gateway_url: Url,
    pub ipfs_uploads_per_minute: u32,

    pub cors_origins: Vec<String>,
    /// Wallets allowed to approve or suspend institutions.
    pub admin_addresses: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".to_string(),
            database_url: "sqlite://certifi.db".to_string(),
            loglevel: "info".to_string(),
            public_url: Url::parse("http://localhost:4000").expect("static url"),
            frontend_url: Url::parse("http://localhost:3000").expect("static url"),
            session_secret: None,
            session_max_age_secs: 3 * 24 * 60 * 60,
            insecure_cookie: false,
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_token_url: Url::parse(GOOGLE_TOKEN_URI).expect("static url"),
            google_userinfo_url: Url::parse(GOOGLE_USERINFO_URI).expect("static url"),
            rpc_url: None,
            contract_address: None,
            issuer_private_key: None,
            ipfs_api_url: Url::parse("https://ipfs.infura.io:5001").expect("static url"),
            ipfs_project_id: None,
            ipfs_project_secret: None,
            ipfs_gateway_url: Url::parse("https://ipfs.io/ipfs/").expect("static url"),
            ipfs_uploads_per_minute: 60,
            cors_origins: vec!["http://localhost:3000".to_string()],
            admin_addresses: Vec::new(),
        }
    }
}

impl Config {
    /// Defaults, overridden by `CERTIFI_*` environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("CERTIFI_"))
            .extract()
    }

    pub fn google_redirect_url(&self) -> Result<Url, url::ParseError> {
        self.public_url.join("/api/auth/callback/google")
    }

    pub fn google_enabled(&self) -> bool {
        !self.google_client_id.is_empty() && !self.google_client_secret.is_empty()
    }

    pub fn is_admin(&self, address: &str) -> bool {
        self.admin_addresses
            .iter()
            .any(|a| a.eq_ignore_ascii_case(address))
    }
}
