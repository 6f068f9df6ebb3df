use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{CertifiError, IsRetryable};

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Reply of the Kubo `add` RPC.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

/// Client for a Kubo-compatible pinning API plus a public gateway.
#[derive(Clone)]
pub struct IpfsClient {
    http: reqwest::Client,
    api_url: Url,
    gateway_url: Url,
    credentials: Option<(String, String)>,
    limiter: Arc<DefaultDirectRateLimiter>,
    retry_policy: ExponentialBuilder,
}

impl IpfsClient {
    pub fn new(cfg: &Config, http: reqwest::Client) -> Self {
        let credentials = match (&cfg.ipfs_project_id, &cfg.ipfs_project_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.clone(), secret.clone()))
            }
            _ => None,
        };
        if credentials.is_none() {
            warn!("IPFS project credentials missing, uploads are disabled");
        }
        let per_minute = NonZeroU32::new(cfg.ipfs_uploads_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            http,
            api_url: with_trailing_slash(cfg.ipfs_api_url.clone()),
            gateway_url: with_trailing_slash(cfg.ipfs_gateway_url.clone()),
            credentials,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
            retry_policy: default_retry_policy(),
        }
    }

    pub fn with_retry_policy(mut self, policy: ExponentialBuilder) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Pin `bytes` and return the CID.
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<String, CertifiError> {
        let (user, pass) = self
            .credentials
            .as_ref()
            .ok_or(CertifiError::IpfsNotConfigured)?;
        let url = self.add_url()?;

        self.limiter.until_ready().await;
        let size = bytes.len();
        let added = (|| async {
            let mut part = Part::bytes(bytes.clone()).file_name(file_name.to_string());
            if let Some(mime) = mime {
                part = part
                    .mime_str(mime)
                    .map_err(|e| CertifiError::BadRequest(format!("invalid content type: {e}")))?;
            }
            let resp = self
                .http
                .post(url.clone())
                .basic_auth(user, Some(pass))
                .multipart(Form::new().part("file", part))
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CertifiError::UpstreamStatus(status));
            }
            Ok(resp.json::<AddResponse>().await?)
        })
        .retry(self.retry_policy)
        .when(|e: &CertifiError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!("IPFS add retrying after error {}, sleeping {:?}", err, dur);
        })
        .await
        .map_err(|e| match e {
            CertifiError::UpstreamStatus(status) => {
                CertifiError::Ipfs(format!("upload rejected with status {status}"))
            }
            other => other,
        })?;

        info!(cid = %added.hash, file = file_name, size, "pinned file to IPFS");
        Ok(added.hash)
    }

    /// Kubo `add` endpoint under the configured API base, pinning on upload.
    fn add_url(&self) -> Result<Url, CertifiError> {
        let mut url = self.api_url.join("api/v0/add")?;
        url.query_pairs_mut().append_pair("pin", "true");
        Ok(url)
    }

    /// Pin the JSON encoding of `value`.
    pub async fn upload_metadata<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<String, CertifiError> {
        let bytes = serde_json::to_vec(value)?;
        self.upload_bytes("metadata.json", Some("application/json"), bytes)
            .await
    }

    /// Fetch a JSON document by `ipfs://` URI or bare CID, always through the gateway.
    pub async fn fetch_json(&self, uri: &str) -> Result<Value, CertifiError> {
        let url = self.gateway_url(uri)?;
        (|| async {
            let resp = self
                .http
                .get(url.clone())
                .header("Accept", "application/json")
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CertifiError::UpstreamStatus(status));
            }
            Ok(resp.json::<Value>().await?)
        })
        .retry(self.retry_policy)
        .when(|e: &CertifiError| e.is_retryable())
        .await
        .map_err(|e| match e {
            CertifiError::UpstreamStatus(status) => {
                CertifiError::Ipfs(format!("fetch of {uri} failed with status {status}"))
            }
            other => other,
        })
    }

    /// Gateway URL for `cid`, accepting an `ipfs://` prefix.
    ///
    /// The result always stays under the configured gateway: schemes, hosts,
    /// absolute paths and dot segments are rejected.
    pub fn gateway_url(&self, cid: &str) -> Result<Url, CertifiError> {
        let cid = strip_ipfs_scheme(cid);
        let invalid = cid.is_empty()
            || cid.starts_with('/')
            || cid.contains([':', '\\', '?', '#', '%'])
            || cid.split('/').any(|seg| seg == ".." || seg == ".");
        if invalid {
            return Err(CertifiError::BadRequest(format!("invalid CID: {cid:?}")));
        }
        let url = self.gateway_url.join(cid)?;
        if !url.as_str().starts_with(self.gateway_url.as_str()) {
            return Err(CertifiError::BadRequest(format!("invalid CID: {cid:?}")));
        }
        Ok(url)
    }
}

pub fn ipfs_uri(cid: &str) -> String {
    format!("ipfs://{}", strip_ipfs_scheme(cid))
}

fn strip_ipfs_scheme(cid: &str) -> &str {
    let cid = cid.trim();
    let cid = cid.strip_prefix("ipfs://").unwrap_or(cid);
    cid.strip_prefix("ipfs/").unwrap_or(cid)
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
