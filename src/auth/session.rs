use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SESSION_COOKIE;
use crate::error::CertifiError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Institution,
    Verifier,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Institution => "institution",
            UserRole::Verifier => "verifier",
        }
    }
}

/// The signed-in principal carried in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub approved: bool,
}

impl SessionUser {
    pub fn require_role(&self, role: UserRole) -> Result<(), CertifiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(CertifiError::Forbidden(format!(
                "This action requires the {} role",
                role.as_str()
            )))
        }
    }

    pub fn email(&self) -> Result<&str, CertifiError> {
        self.email
            .as_deref()
            .ok_or_else(|| CertifiError::Forbidden("Session has no email address".to_string()))
    }

    pub fn wallet(&self) -> Result<&str, CertifiError> {
        self.address
            .as_deref()
            .ok_or_else(|| CertifiError::Forbidden("Session has no wallet address".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionEnvelope {
    user: SessionUser,
    expires_at: DateTime<Utc>,
}

/// Store `user` in the encrypted session cookie for `max_age_secs`.
pub fn issue_session(
    jar: PrivateCookieJar,
    user: &SessionUser,
    max_age_secs: i64,
    secure: bool,
) -> Result<PrivateCookieJar, CertifiError> {
    let envelope = SessionEnvelope {
        user: user.clone(),
        expires_at: Utc::now() + Duration::seconds(max_age_secs),
    };
    let value = serde_json::to_string(&envelope)?;
    let cookie = Cookie::build(Cookie::new(SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build();
    Ok(jar.add(cookie))
}

/// The session in `jar`, unless missing, tampered with, or expired.
pub fn read_session(jar: &PrivateCookieJar) -> Option<SessionUser> {
    let cookie = jar.get(SESSION_COOKIE)?;
    let envelope: SessionEnvelope = match serde_json::from_str(cookie.value()) {
        Ok(env) => env,
        Err(e) => {
            debug!(error = %e, "discarding undecodable session cookie");
            return None;
        }
    };
    if envelope.expires_at <= Utc::now() {
        debug!(user = %envelope.user.id, "session expired");
        return None;
    }
    Some(envelope.user)
}

pub fn clear_session(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(Cookie::build(Cookie::new(SESSION_COOKIE, "")).path("/").build())
}

/// Extractor for routes that require a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionUser);

impl<S> FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = CertifiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(MaybeSession(user)) = MaybeSession::from_request_parts(parts, state).await;
        user.map(AuthSession).ok_or_else(|| {
            CertifiError::Unauthorized("You must be logged in to access this resource".to_string())
        })
    }
}

/// Extractor for routes where a session is optional.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionUser>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::<Key>::from_request_parts(parts, state).await?;
        Ok(MaybeSession(read_session(&jar)))
    }
}
