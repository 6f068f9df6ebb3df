use serde::{Deserialize, Serialize};

/// Fields that identify a certificate; their canonical string is what gets hashed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateData {
    pub recipient_name: String,
    pub recipient_email: String,
    pub recipient_id: String,
    pub certificate_title: String,
    pub certificate_course: String,
    /// `YYYY-MM-DD`
    pub issue_date: String,
}

/// JSON document pinned to IPFS alongside every issued credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMetadata {
    pub title: String,
    pub description: String,
    pub issue_date: String,
    pub institution: InstitutionRef,
    pub recipient: RecipientRef,
    #[serde(rename = "certificateURI", skip_serializing_if = "Option::is_none")]
    pub certificate_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstitutionRef {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecipientRef {
    pub name: String,
    pub email: String,
    pub id: String,
}

impl CertificateMetadata {
    pub fn new(
        data: &CertificateData,
        institution: InstitutionRef,
        certificate_uri: Option<String>,
    ) -> Self {
        Self {
            title: data.certificate_title.clone(),
            description: data.certificate_course.clone(),
            issue_date: data.issue_date.clone(),
            institution,
            recipient: RecipientRef {
                name: data.recipient_name.clone(),
                email: data.recipient_email.clone(),
                id: data.recipient_id.clone(),
            },
            certificate_uri,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_omits_missing_certificate_uri() {
        let data = CertificateData {
            recipient_name: "Ada Lovelace".into(),
            recipient_email: "ada@example.org".into(),
            recipient_id: "STU000001".into(),
            certificate_title: "BSc Mathematics".into(),
            certificate_course: "Mathematics".into(),
            issue_date: "2024-06-30".into(),
        };
        let meta = CertificateMetadata::new(
            &data,
            InstitutionRef {
                name: "Analytical University".into(),
                address: "0x0000000000000000000000000000000000000001".into(),
            },
            None,
        );
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["issueDate"], "2024-06-30");
        assert_eq!(json["recipient"]["id"], "STU000001");
        assert!(json.get("certificateURI").is_none());

        let with_file = CertificateMetadata {
            certificate_uri: Some("ipfs://bafyfile".into()),
            ..meta
        };
        let json = serde_json::to_value(&with_file).unwrap();
        assert_eq!(json["certificateURI"], "ipfs://bafyfile");
    }
}
