use crate::config::{Config, GOOGLE_AUTH_URL, GOOGLE_SCOPES};
use crate::error::CertifiError;

use oauth2::{
    AuthUrl, AuthorizationCode, Client as OAuth2Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use serde::Deserialize;
use tracing::info;
use url::Url;

/// Subset of the OpenID Connect userinfo document.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Stateless Google OAuth Endpoints.
pub struct GoogleOauthEndpoints;

impl GoogleOauthEndpoints {
    /// Consent URL with PKCE, CSRF state and offline access.
    pub fn build_authorize_url(
        cfg: &Config,
        challenge: PkceCodeChallenge,
    ) -> Result<(Url, CsrfToken), CertifiError> {
        let client = build_oauth2_client(cfg)?;
        let (url, csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(GOOGLE_SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(challenge)
            .url();
        Ok((url, csrf))
    }

    /// Exchange the callback code; returns the access token.
    pub async fn exchange_authorization_code(
        cfg: &Config,
        code: AuthorizationCode,
        verifier: PkceCodeVerifier,
        http_client: reqwest::Client,
    ) -> Result<String, CertifiError> {
        let client = build_oauth2_client(cfg)?;
        let token: BasicTokenResponse = client
            .exchange_code(code)
            .set_pkce_verifier(verifier)
            .request_async(&http_client)
            .await?;
        info!("Google authorization code exchanged");
        Ok(token.access_token().secret().to_string())
    }

    pub async fn fetch_userinfo(
        cfg: &Config,
        access_token: &str,
        http_client: reqwest::Client,
    ) -> Result<GoogleUserInfo, CertifiError> {
        let info: GoogleUserInfo = http_client
            .get(cfg.google_userinfo_url.clone())
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(sub = %info.sub, "Fetch UserInfo successfully");
        Ok(info)
    }
}

fn build_oauth2_client(cfg: &Config) -> Result<GoogleOauth2Client, CertifiError> {
    if !cfg.google_enabled() {
        return Err(CertifiError::BadRequest(
            "Google sign-in is not configured".to_string(),
        ));
    }
    let client = OAuth2Client::new(ClientId::new(cfg.google_client_id.clone()))
        .set_client_secret(ClientSecret::new(cfg.google_client_secret.clone()))
        .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string())?)
        .set_token_uri(TokenUrl::from_url(cfg.google_token_url.clone()))
        .set_redirect_uri(RedirectUrl::from_url(cfg.google_redirect_url()?));
    Ok(client)
}

type GoogleOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;
