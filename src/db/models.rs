use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DbStudent {
    pub id: i64,
    pub student_id: String,
    pub wallet_address: Option<String>,
    pub email: String,
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
    pub phone_number: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields a student supplies; name, email and image come from the session.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub student_id: String,
    pub phone_number: Option<String>,
    pub wallet_address: Option<String>,
    pub date_of_birth: Option<String>,
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DbCertificate {
    pub id: i64,
    pub student_id: String,
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    pub issue_date: String,
    pub document_hash: Option<String>,
    pub credential_hash: Option<String>,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: Option<String>,
    pub tx_hash: Option<String>,
    pub issuer_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCertificate {
    pub student_id: String,
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    pub issue_date: String,
    pub document_hash: Option<String>,
    pub credential_hash: Option<String>,
    pub metadata_uri: Option<String>,
    pub tx_hash: Option<String>,
    pub issuer_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DbEducation {
    pub id: i64,
    pub student_id: i64,
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    pub end_date: Option<String>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEducation {
    pub institution: String,
    pub degree: String,
    pub field_of_study: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub is_current: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DbDocument {
    pub id: i64,
    pub student_id: i64,
    pub document_type: String,
    pub document_number: Option<String>,
    pub document_url: String,
    pub ipfs_hash: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub document_type: String,
    #[serde(default)]
    pub document_number: Option<String>,
    pub document_url: String,
    #[serde(default)]
    pub ipfs_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstitutionStatus {
    Active,
    Suspended,
}

impl InstitutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InstitutionStatus::Active => "active",
            InstitutionStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(InstitutionStatus::Active),
            "suspended" => Some(InstitutionStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DbInstitution {
    pub id: i64,
    pub wallet_address: String,
    pub name: String,
    pub contact_email: Option<String>,
    pub website: Option<String>,
    pub status: InstitutionStatus,
    pub suspension_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbInstitution {
    pub fn is_active(&self) -> bool {
        self.status == InstitutionStatus::Active
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewInstitution {
    pub wallet_address: String,
    pub name: String,
    pub contact_email: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionStats {
    pub total_certificates: i64,
    pub total_students: i64,
    pub issued_last30_days: i64,
    pub latest_issue_date: Option<String>,
}
