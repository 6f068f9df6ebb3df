use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use time::Duration;
use tracing::{info, warn};

use crate::auth::google::GoogleOauthEndpoints;
use crate::auth::session::{clear_session, issue_session};
use crate::auth::wallet::{self, WalletCredentials};
use crate::auth::{MaybeSession, SessionUser, UserRole};
use crate::error::CertifiError;
use crate::router::CertifiState;

#[derive(Debug, Deserialize)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

const CSRF_COOKIE: &str = "oauth_csrf_token";
const PKCE_COOKIE: &str = "oauth_pkce_verifier";

/// GET /api/auth/google -> redirects to Google's consent page.
pub async fn google_oauth_entry(
    State(state): State<CertifiState>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, CertifiError> {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let pkce_verifier = verifier.secret().to_string();

    let (auth_url, csrf_token) = GoogleOauthEndpoints::build_authorize_url(&state.config, challenge)?;

    let jar = store_oauth_cookies(jar, &csrf_token, &pkce_verifier, state.secure_cookies());

    info!("Dispatching OAuth redirect");
    Ok((jar, Redirect::temporary(auth_url.as_ref())))
}

/// GET /api/auth/callback/google -> exchanges the code and signs the student in.
pub async fn google_oauth_callback(
    State(state): State<CertifiState>,
    Query(query): Query<AuthCallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let (pkce_verifier, csrf_cookie, jar) = match load_oauth_session(jar, state.secure_cookies()) {
        Ok(data) => data,
        Err((jar, err)) => return respond_with_error(jar, err),
    };

    if let Some(error) = query.error.as_deref() {
        return respond_with_error(
            jar,
            CertifiError::OauthFlowError(format!("consent denied: {error}")),
        );
    }

    let Some(state_param) = query.state.as_deref() else {
        return respond_with_error(
            jar,
            CertifiError::OauthFlowError("missing `state` in callback".to_string()),
        );
    };

    if !bool::from(state_param.as_bytes().ct_eq(csrf_cookie.as_bytes())) {
        return respond_with_error(
            jar,
            CertifiError::OauthFlowError("CSRF token mismatch".to_string()),
        );
    }

    let Some(code) = query.code.as_deref() else {
        return respond_with_error(
            jar,
            CertifiError::OauthFlowError("missing `code` in callback".to_string()),
        );
    };

    let access_token = match GoogleOauthEndpoints::exchange_authorization_code(
        &state.config,
        AuthorizationCode::new(code.to_owned()),
        PkceCodeVerifier::new(pkce_verifier),
        state.client.clone(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => return respond_with_error(jar, err),
    };

    let userinfo = match GoogleOauthEndpoints::fetch_userinfo(
        &state.config,
        &access_token,
        state.client.clone(),
    )
    .await
    {
        Ok(info) => info,
        Err(err) => return respond_with_error(jar, err),
    };
    let Some(email) = userinfo.email.clone() else {
        return respond_with_error(jar, CertifiError::MissingEmailInUserinfo);
    };

    let registered = match state.storage.find_student_by_email(&email).await {
        Ok(student) => student.is_some(),
        Err(err) => return respond_with_error(jar, err),
    };

    let user = SessionUser {
        id: userinfo.sub,
        role: UserRole::Student,
        address: None,
        email: Some(email),
        name: userinfo.name,
        image: userinfo.picture,
        approved: true,
    };
    let jar = match issue_session(
        jar.clone(),
        &user,
        state.config.session_max_age_secs,
        state.secure_cookies(),
    ) {
        Ok(jar) => jar,
        Err(err) => return respond_with_error(jar, err),
    };

    let landing = if registered {
        "/student/dashboard"
    } else {
        "/student/onboarding"
    };
    let target = match state.config.frontend_url.join(landing) {
        Ok(url) => url,
        Err(err) => return respond_with_error(jar, err.into()),
    };
    info!(user = %user.id, registered, "Google sign-in completed");
    (jar, Redirect::to(target.as_str())).into_response()
}

/// POST /api/auth/wallet -> verifies a personal-sign signature and opens a session.
pub async fn wallet_sign_in(
    State(state): State<CertifiState>,
    jar: PrivateCookieJar,
    Json(creds): Json<WalletCredentials>,
) -> Result<impl IntoResponse, CertifiError> {
    let user = wallet::authorize(creds).inspect_err(|e| {
        warn!(error = %e, "wallet sign-in rejected");
    })?;
    let jar = issue_session(
        jar,
        &user,
        state.config.session_max_age_secs,
        state.secure_cookies(),
    )?;
    info!(address = %user.id, role = user.role.as_str(), "wallet sign-in completed");
    Ok((jar, Json(user)))
}

/// GET /api/auth/session -> the signed-in user or `null`.
pub async fn current_session(MaybeSession(user): MaybeSession) -> Json<Option<SessionUser>> {
    Json(user)
}

/// POST /api/auth/signout
pub async fn sign_out(jar: PrivateCookieJar) -> impl IntoResponse {
    (clear_session(jar), Json(json!({ "success": true })))
}

fn store_oauth_cookies(
    jar: PrivateCookieJar,
    csrf: &CsrfToken,
    pkce_verifier: &str,
    secure: bool,
) -> PrivateCookieJar {
    jar.add(build_cookie(CSRF_COOKIE, csrf.secret().to_string(), secure))
        .add(build_cookie(PKCE_COOKIE, pkce_verifier.to_string(), secure))
}

/// Read and clear the CSRF and PKCE cookies set by the entry route.
fn load_oauth_session(
    jar: PrivateCookieJar,
    secure: bool,
) -> Result<(String, String, PrivateCookieJar), (PrivateCookieJar, CertifiError)> {
    let Some(csrf_cookie) = jar.get(CSRF_COOKIE).map(|c| c.value().to_owned()) else {
        let jar = clear_oauth_cookies(jar, secure);
        return Err((
            jar,
            CertifiError::OauthFlowError("Missing CSRF token in cookie".to_string()),
        ));
    };

    let Some(pkce_cookie) = jar.get(PKCE_COOKIE).map(|c| c.value().to_owned()) else {
        let jar = clear_oauth_cookies(jar, secure);
        return Err((
            jar,
            CertifiError::OauthFlowError("Missing PKCE verifier in cookie".to_string()),
        ));
    };

    Ok((pkce_cookie, csrf_cookie, clear_oauth_cookies(jar, secure)))
}

fn clear_oauth_cookies(jar: PrivateCookieJar, secure: bool) -> PrivateCookieJar {
    jar.remove(clear_cookie(CSRF_COOKIE, secure))
        .remove(clear_cookie(PKCE_COOKIE, secure))
}

fn build_cookie(name: &str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}

fn clear_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn respond_with_error(jar: PrivateCookieJar, err: CertifiError) -> Response {
    (jar, err.into_response()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_cookies_match_the_secure_flag_they_replace() {
        for secure in [true, false] {
            let set = build_cookie(CSRF_COOKIE, "token".into(), secure);
            let cleared = clear_cookie(CSRF_COOKIE, secure);
            assert_eq!(cleared.secure(), set.secure());
            assert_eq!(cleared.path(), set.path());
            assert_eq!(cleared.same_site(), set.same_site());
            assert_eq!(cleared.value(), "");
        }
    }
}
