use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum CertifiError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("missing email in userinfo response")]
    MissingEmailInUserinfo,

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("OAuth flow error: {0}")]
    OauthFlowError(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("IPFS error: {0}")]
    Ipfs(String),

    #[error("IPFS credentials are not configured")]
    IpfsNotConfigured,

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    MethodNotSupported(String),

    #[error("{0}")]
    Internal(String),
}

/// Error taxonomy shared by the REST handlers and the RPC envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotSupported,
    Conflict,
    BadGateway,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::BadGateway => "BAD_GATEWAY",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON-RPC error number used by tRPC clients.
    pub fn json_rpc_code(self) -> i32 {
        match self {
            ErrorCode::BadRequest => -32600,
            ErrorCode::Unauthorized => -32001,
            ErrorCode::Forbidden => -32003,
            ErrorCode::NotFound => -32004,
            ErrorCode::MethodNotSupported => -32005,
            ErrorCode::Conflict => -32009,
            ErrorCode::BadGateway | ErrorCode::InternalServerError => -32603,
        }
    }
}

impl CertifiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CertifiError::DatabaseError(SqlxError::Database(db)) if db.is_unique_violation() => {
                ErrorCode::Conflict
            }
            CertifiError::DatabaseError(SqlxError::Database(db))
                if db.is_foreign_key_violation() =>
            {
                ErrorCode::BadRequest
            }
            CertifiError::DatabaseError(SqlxError::RowNotFound) => ErrorCode::NotFound,
            CertifiError::DatabaseError(_) | CertifiError::Internal(_) => {
                ErrorCode::InternalServerError
            }
            CertifiError::JsonError(_) | CertifiError::BadRequest(_) => ErrorCode::BadRequest,
            CertifiError::MissingEmailInUserinfo
            | CertifiError::Oauth2Token(_)
            | CertifiError::Oauth2Server { .. }
            | CertifiError::OauthFlowError(_)
            | CertifiError::InvalidSignature(_)
            | CertifiError::Unauthorized(_) => ErrorCode::Unauthorized,
            CertifiError::Forbidden(_) => ErrorCode::Forbidden,
            CertifiError::NotFound(_) => ErrorCode::NotFound,
            CertifiError::Conflict(_) => ErrorCode::Conflict,
            CertifiError::MethodNotSupported(_) => ErrorCode::MethodNotSupported,
            CertifiError::Reqwest(_)
            | CertifiError::UrlParse(_)
            | CertifiError::Ipfs(_)
            | CertifiError::IpfsNotConfigured
            | CertifiError::UpstreamStatus(_)
            | CertifiError::Chain(_) => ErrorCode::BadGateway,
        }
    }

    /// Message safe to hand back to callers.
    pub fn public_message(&self) -> String {
        match self.code() {
            ErrorCode::InternalServerError => match self {
                CertifiError::Internal(msg) => msg.clone(),
                _ => "An internal server error occurred.".to_string(),
            },
            ErrorCode::Conflict if matches!(self, CertifiError::DatabaseError(_)) => {
                "Record already exists.".to_string()
            }
            ErrorCode::BadRequest if matches!(self, CertifiError::DatabaseError(_)) => {
                "Referenced record does not exist.".to_string()
            }
            ErrorCode::NotFound if matches!(self, CertifiError::DatabaseError(_)) => {
                "Record not found.".to_string()
            }
            ErrorCode::BadGateway => match self {
                CertifiError::IpfsNotConfigured | CertifiError::Chain(_) | CertifiError::Ipfs(_) => {
                    self.to_string()
                }
                _ => "Upstream service is unavailable.".to_string(),
            },
            _ => self.to_string(),
        }
    }
}

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for CertifiError {
    fn is_retryable(&self) -> bool {
        match self {
            CertifiError::Reqwest(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            CertifiError::UpstreamStatus(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for CertifiError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => CertifiError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                CertifiError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => {
                CertifiError::JsonError(parse_err.into_inner())
            }
            RequestTokenError::Other(s) => CertifiError::Oauth2Token(s),
        }
    }
}

impl IntoResponse for CertifiError {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        if code == ErrorCode::InternalServerError {
            tracing::error!(error = %self, "request failed");
        }
        let body = ApiErrorBody {
            code: code.as_str().to_string(),
            message: self.public_message(),
        };
        (code.http_status(), Json(ApiErrorResponse { error: body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
