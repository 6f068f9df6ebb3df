use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::{RpcContext, parse_input};
use crate::db::{DbDocument, DbEducation, DbStudent, NewDocument, NewEducation, NewStudent};
use crate::error::{CertifiError, ErrorCode};

/// Length of an institution-assigned student id.
pub const STUDENT_ID_LEN: usize = 9;

#[derive(Debug, Serialize)]
pub struct CheckUser {
    pub exists: bool,
    pub user: Option<DbStudent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrUpdateInput {
    pub student_id: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SavedStudent {
    pub success: bool,
    pub user: DbStudent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdInput {
    pub student_id: String,
}

pub(super) async fn session_student(ctx: &RpcContext<'_>) -> Result<DbStudent, CertifiError> {
    let email = ctx.user.email()?;
    ctx.state
        .storage
        .find_student_by_email(email)
        .await?
        .ok_or_else(|| CertifiError::NotFound("Student profile not found".to_string()))
}

pub async fn check_user(ctx: &RpcContext<'_>) -> Result<CheckUser, CertifiError> {
    let Some(email) = ctx.user.email.as_deref() else {
        return Ok(CheckUser {
            exists: false,
            user: None,
        });
    };
    let user = ctx.state.storage.find_student_by_email(email).await?;
    Ok(CheckUser {
        exists: user.is_some(),
        user,
    })
}

pub async fn create_or_update(
    ctx: &RpcContext<'_>,
    input: Value,
) -> Result<SavedStudent, CertifiError> {
    let input: CreateOrUpdateInput = parse_input(input)?;
    let student_id = input.student_id.trim().to_string();
    if student_id.is_empty() {
        return Err(CertifiError::BadRequest("studentId is required".to_string()));
    }
    let email = ctx.user.email()?;
    let full_name = ctx.user.name.as_deref().unwrap_or(email);

    let user = ctx
        .state
        .storage
        .upsert_student_by_email(
            email,
            full_name,
            ctx.user.image.as_deref(),
            NewStudent {
                student_id,
                phone_number: input.phone_number,
                wallet_address: input.wallet_address,
                date_of_birth: input.date_of_birth,
                nationality: input.nationality,
            },
        )
        .await
        .map_err(|e| match e.code() {
            ErrorCode::Conflict => CertifiError::Conflict("Student ID is already taken".to_string()),
            _ => {
                error!(email, error = %e, "saving student failed");
                CertifiError::Internal("Failed to save student data".to_string())
            }
        })?;
    info!(student = %user.student_id, "student profile saved");
    Ok(SavedStudent {
        success: true,
        user,
    })
}

pub async fn get_profile(ctx: &RpcContext<'_>) -> Result<DbStudent, CertifiError> {
    session_student(ctx).await
}

pub async fn get_by_student_id(
    ctx: &RpcContext<'_>,
    input: Value,
) -> Result<Option<DbStudent>, CertifiError> {
    let input: StudentIdInput = parse_input(input)?;
    if input.student_id.chars().count() != STUDENT_ID_LEN {
        return Err(CertifiError::BadRequest(format!(
            "studentId must be exactly {STUDENT_ID_LEN} characters"
        )));
    }
    ctx.state
        .storage
        .find_student_by_student_id(&input.student_id)
        .await
}

pub async fn add_education(
    ctx: &RpcContext<'_>,
    input: Value,
) -> Result<DbEducation, CertifiError> {
    let edu: NewEducation = parse_input(input)?;
    if edu.institution.trim().is_empty() || edu.degree.trim().is_empty() {
        return Err(CertifiError::BadRequest(
            "institution and degree are required".to_string(),
        ));
    }
    let student = session_student(ctx).await?;
    ctx.state.storage.add_education(student.id, edu).await
}

pub async fn get_education(ctx: &RpcContext<'_>) -> Result<Vec<DbEducation>, CertifiError> {
    let student = session_student(ctx).await?;
    ctx.state.storage.education_of_student(student.id).await
}

pub async fn add_document(ctx: &RpcContext<'_>, input: Value) -> Result<DbDocument, CertifiError> {
    let doc: NewDocument = parse_input(input)?;
    if doc.document_type.trim().is_empty() || doc.document_url.trim().is_empty() {
        return Err(CertifiError::BadRequest(
            "documentType and documentUrl are required".to_string(),
        ));
    }
    let student = session_student(ctx).await?;
    ctx.state.storage.add_document(student.id, doc).await
}

pub async fn get_documents(ctx: &RpcContext<'_>) -> Result<Vec<DbDocument>, CertifiError> {
    let student = session_student(ctx).await?;
    ctx.state.storage.documents_of_student(student.id).await
}
