use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::certificates::InstitutionInput;
use super::{RpcContext, parse_input};
use crate::auth::UserRole;
use crate::db::{DbInstitution, DbStudent, InstitutionStats, InstitutionStatus, NewInstitution};
use crate::error::CertifiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeInput {
    pub address: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyDocumentInput {
    pub document_id: i64,
    #[serde(default = "default_true")]
    pub verified: bool,
}

fn default_true() -> bool {
    true
}

pub async fn stats(ctx: &RpcContext<'_>, input: Value) -> Result<InstitutionStats, CertifiError> {
    let input: InstitutionInput = parse_input(input)?;
    ctx.state
        .storage
        .institution_stats(&input.institution, Utc::now())
        .await
}

pub async fn students(ctx: &RpcContext<'_>, input: Value) -> Result<Vec<DbStudent>, CertifiError> {
    let input: InstitutionInput = parse_input(input)?;
    ctx.state
        .storage
        .students_of_institution(&input.institution)
        .await
}

pub async fn register(ctx: &RpcContext<'_>, input: Value) -> Result<DbInstitution, CertifiError> {
    ctx.user.require_role(UserRole::Institution)?;
    let input: RegisterInput = parse_input(input)?;
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CertifiError::BadRequest("name is required".to_string()));
    }
    let inst = ctx
        .state
        .storage
        .upsert_institution(NewInstitution {
            wallet_address: ctx.user.wallet()?.to_string(),
            name: name.to_string(),
            contact_email: input.contact_email,
            website: input.website,
        })
        .await?;
    info!(address = %inst.wallet_address, name = %inst.name, "institution registered");
    Ok(inst)
}

pub async fn profile(ctx: &RpcContext<'_>) -> Result<DbInstitution, CertifiError> {
    ctx.user.require_role(UserRole::Institution)?;
    ctx.state
        .storage
        .institution_by_address(ctx.user.wallet()?)
        .await?
        .ok_or_else(|| CertifiError::NotFound("Institution profile not found".to_string()))
}

fn require_admin(ctx: &RpcContext<'_>) -> Result<(), CertifiError> {
    let wallet = ctx.user.wallet()?;
    if ctx.state.config.is_admin(wallet) {
        Ok(())
    } else {
        Err(CertifiError::Forbidden(
            "Only administrators can change institution status".to_string(),
        ))
    }
}

pub async fn approve(ctx: &RpcContext<'_>, input: Value) -> Result<DbInstitution, CertifiError> {
    require_admin(ctx)?;
    let input: StatusChangeInput = parse_input(input)?;
    let inst = ctx
        .state
        .storage
        .set_institution_status(&input.address, InstitutionStatus::Active, None)
        .await?;
    info!(address = %inst.wallet_address, admin = %ctx.user.id, "institution approved");
    Ok(inst)
}

pub async fn suspend(ctx: &RpcContext<'_>, input: Value) -> Result<DbInstitution, CertifiError> {
    require_admin(ctx)?;
    let input: StatusChangeInput = parse_input(input)?;
    let inst = ctx
        .state
        .storage
        .set_institution_status(&input.address, InstitutionStatus::Suspended, input.reason)
        .await?;
    info!(address = %inst.wallet_address, admin = %ctx.user.id, "institution suspended");
    Ok(inst)
}

/// Mark a student document as checked by the institution.
pub async fn verify_document(ctx: &RpcContext<'_>, input: Value) -> Result<Value, CertifiError> {
    ctx.user.require_role(UserRole::Institution)?;
    let input: VerifyDocumentInput = parse_input(input)?;
    ctx.state
        .storage
        .mark_document_verified(input.document_id, input.verified)
        .await?;
    Ok(serde_json::json!({ "success": true }))
}
