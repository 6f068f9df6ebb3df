//! Typed procedures behind `/api/trpc/{path}`.
//!
//! Wire format follows tRPC: queries are `GET` with a URL-encoded JSON
//! `input` parameter, mutations are `POST` with a JSON body. Success bodies
//! are `{"result":{"data":..}}`; failures carry the JSON-RPC style error
//! shape with the error code and HTTP status under `data`.

pub mod certificates;
pub mod institutions;
pub mod students;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, error};

use crate::auth::{MaybeSession, SessionUser};
use crate::error::{CertifiError, ErrorCode};
use crate::router::CertifiState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

/// Every procedure the router serves.
pub const PROCEDURES: &[(&str, ProcedureKind)] = &[
    ("students.checkUser", ProcedureKind::Query),
    ("students.createOrUpdate", ProcedureKind::Mutation),
    ("students.getProfile", ProcedureKind::Query),
    ("students.getByStudentId", ProcedureKind::Query),
    ("students.addEducation", ProcedureKind::Mutation),
    ("students.getEducation", ProcedureKind::Query),
    ("students.addDocument", ProcedureKind::Mutation),
    ("students.getDocuments", ProcedureKind::Query),
    ("certificates.create", ProcedureKind::Mutation),
    ("certificates.issue", ProcedureKind::Mutation),
    ("certificates.revoke", ProcedureKind::Mutation),
    ("certificates.getCertificatesByInstitution", ProcedureKind::Query),
    ("certificates.getCertificatesByStudent", ProcedureKind::Query),
    ("certificates.getOnChainByStudent", ProcedureKind::Query),
    ("institutions.getInstitutionStats", ProcedureKind::Query),
    ("institutions.getStudents", ProcedureKind::Query),
    ("institutions.register", ProcedureKind::Mutation),
    ("institutions.getProfile", ProcedureKind::Query),
    ("institutions.approve", ProcedureKind::Mutation),
    ("institutions.suspend", ProcedureKind::Mutation),
    ("institutions.verifyDocument", ProcedureKind::Mutation),
];

pub fn procedure_kind(path: &str) -> Option<ProcedureKind> {
    PROCEDURES
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, kind)| *kind)
}

/// Per-call context handed to procedures. Built only for signed-in callers.
pub struct RpcContext<'a> {
    pub state: &'a CertifiState,
    pub user: SessionUser,
}

/// Decode procedure input, reporting schema mismatches as `BAD_REQUEST`.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, CertifiError> {
    serde_json::from_value(input).map_err(|e| CertifiError::BadRequest(format!("Invalid input: {e}")))
}

fn to_data<T: Serialize>(value: T) -> Result<Value, CertifiError> {
    Ok(serde_json::to_value(value)?)
}

/// GET /api/trpc/{path}?input=...
pub async fn trpc_query(
    State(state): State<CertifiState>,
    MaybeSession(user): MaybeSession,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let raw = params.get("input").map(|s| s.as_bytes());
    dispatch(&state, user, &path, ProcedureKind::Query, raw).await
}

/// POST /api/trpc/{path}
pub async fn trpc_mutation(
    State(state): State<CertifiState>,
    MaybeSession(user): MaybeSession,
    Path(path): Path<String>,
    body: Bytes,
) -> Response {
    dispatch(&state, user, &path, ProcedureKind::Mutation, Some(&body[..])).await
}

async fn dispatch(
    state: &CertifiState,
    user: Option<SessionUser>,
    path: &str,
    requested: ProcedureKind,
    raw_input: Option<&[u8]>,
) -> Response {
    match resolve(state, user, path, requested, raw_input).await {
        Ok(data) => Json(serde_json::json!({ "result": { "data": data } })).into_response(),
        Err(err) => TrpcError::new(err, path).into_response(),
    }
}

async fn resolve(
    state: &CertifiState,
    user: Option<SessionUser>,
    path: &str,
    requested: ProcedureKind,
    raw_input: Option<&[u8]>,
) -> Result<Value, CertifiError> {
    let kind = procedure_kind(path)
        .ok_or_else(|| CertifiError::NotFound(format!("No procedure found on path \"{path}\"")))?;
    if kind != requested {
        return Err(CertifiError::MethodNotSupported(format!(
            "Unsupported {} for procedure \"{path}\"",
            if requested == ProcedureKind::Query { "GET" } else { "POST" },
        )));
    }
    let user = user.ok_or_else(|| {
        CertifiError::Unauthorized("You must be logged in to access this resource".to_string())
    })?;
    let input = match raw_input.filter(|raw| !raw.iter().all(u8::is_ascii_whitespace)) {
        Some(raw) => serde_json::from_slice(raw)
            .map_err(|e| CertifiError::BadRequest(format!("Input is not valid JSON: {e}")))?,
        None => Value::Null,
    };
    debug!(procedure = path, user = %user.id, "rpc call");

    let ctx = RpcContext { state, user };
    match path {
        "students.checkUser" => to_data(students::check_user(&ctx).await?),
        "students.createOrUpdate" => to_data(students::create_or_update(&ctx, input).await?),
        "students.getProfile" => to_data(students::get_profile(&ctx).await?),
        "students.getByStudentId" => to_data(students::get_by_student_id(&ctx, input).await?),
        "students.addEducation" => to_data(students::add_education(&ctx, input).await?),
        "students.getEducation" => to_data(students::get_education(&ctx).await?),
        "students.addDocument" => to_data(students::add_document(&ctx, input).await?),
        "students.getDocuments" => to_data(students::get_documents(&ctx).await?),
        "certificates.create" => to_data(certificates::create(&ctx, input).await?),
        "certificates.issue" => to_data(certificates::issue(&ctx, input).await?),
        "certificates.revoke" => to_data(certificates::revoke(&ctx, input).await?),
        "certificates.getCertificatesByInstitution" => {
            to_data(certificates::by_institution(&ctx, input).await?)
        }
        "certificates.getCertificatesByStudent" => {
            to_data(certificates::by_student(&ctx, input).await?)
        }
        "certificates.getOnChainByStudent" => {
            to_data(certificates::on_chain_by_student(&ctx, input).await?)
        }
        "institutions.getInstitutionStats" => to_data(institutions::stats(&ctx, input).await?),
        "institutions.getStudents" => to_data(institutions::students(&ctx, input).await?),
        "institutions.register" => to_data(institutions::register(&ctx, input).await?),
        "institutions.getProfile" => to_data(institutions::profile(&ctx).await?),
        "institutions.approve" => to_data(institutions::approve(&ctx, input).await?),
        "institutions.suspend" => to_data(institutions::suspend(&ctx, input).await?),
        "institutions.verifyDocument" => institutions::verify_document(&ctx, input).await,
        _ => Err(CertifiError::NotFound(format!(
            "No procedure found on path \"{path}\""
        ))),
    }
}

/// tRPC error envelope.
pub struct TrpcError {
    err: CertifiError,
    path: String,
}

impl TrpcError {
    pub fn new(err: CertifiError, path: &str) -> Self {
        Self {
            err,
            path: path.to_string(),
        }
    }
}

#[derive(Serialize)]
struct TrpcErrorBody {
    error: TrpcErrorShape,
}

#[derive(Serialize)]
struct TrpcErrorShape {
    message: String,
    code: i32,
    data: TrpcErrorData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrpcErrorData {
    code: &'static str,
    http_status: u16,
    path: String,
}

impl IntoResponse for TrpcError {
    fn into_response(self) -> Response {
        let code = self.err.code();
        if matches!(code, ErrorCode::InternalServerError | ErrorCode::BadGateway) {
            error!(procedure = %self.path, error = %self.err, "rpc call failed");
        }
        let status = code.http_status();
        let body = TrpcErrorBody {
            error: TrpcErrorShape {
                message: self.err.public_message(),
                code: code.json_rpc_code(),
                data: TrpcErrorData {
                    code: code.as_str(),
                    http_status: status.as_u16(),
                    path: self.path,
                },
            },
        };
        (status, Json(body)).into_response()
    }
}
