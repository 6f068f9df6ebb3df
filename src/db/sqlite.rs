use crate::db::models::{
    DbCertificate, DbDocument, DbEducation, DbInstitution, DbStudent, InstitutionStats,
    InstitutionStatus, NewCertificate, NewDocument, NewEducation, NewInstitution, NewStudent,
};
use crate::db::schema::SQLITE_INIT;
use crate::error::CertifiError;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct CertifiStorage {
    pool: SqlitePool,
}

impl CertifiStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` with foreign keys enforced.
    pub async fn connect(database_url: &str) -> Result<Self, CertifiError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), CertifiError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ---- students ----

    pub async fn find_student_by_email(
        &self,
        email: &str,
    ) -> Result<Option<DbStudent>, CertifiError> {
        let row = sqlx::query_as::<_, DbStudent>("SELECT * FROM students WHERE email = ? LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_student_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Option<DbStudent>, CertifiError> {
        let row =
            sqlx::query_as::<_, DbStudent>("SELECT * FROM students WHERE student_id = ? LIMIT 1")
                .bind(student_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Insert a student for `email`, or update the existing row's profile fields.
    pub async fn upsert_student_by_email(
        &self,
        email: &str,
        full_name: &str,
        profile_image: Option<&str>,
        student: NewStudent,
    ) -> Result<DbStudent, CertifiError> {
        let now = Utc::now();
        let wallet = student.wallet_address.map(|w| w.to_lowercase());
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM students WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;

        let row = if existing.is_some() {
            sqlx::query_as::<_, DbStudent>(
                r#"UPDATE students SET
                    student_id = ?,
                    phone_number = ?,
                    wallet_address = COALESCE(?, wallet_address),
                    date_of_birth = COALESCE(?, date_of_birth),
                    nationality = COALESCE(?, nationality),
                    updated_at = ?
                  WHERE email = ?
                  RETURNING *"#,
            )
            .bind(student.student_id)
            .bind(student.phone_number)
            .bind(wallet)
            .bind(student.date_of_birth)
            .bind(student.nationality)
            .bind(now)
            .bind(email)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query_as::<_, DbStudent>(
                r#"INSERT INTO students (
                    student_id, wallet_address, email, full_name, date_of_birth,
                    nationality, phone_number, profile_image, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING *"#,
            )
            .bind(student.student_id)
            .bind(wallet)
            .bind(email)
            .bind(full_name)
            .bind(student.date_of_birth)
            .bind(student.nationality)
            .bind(student.phone_number)
            .bind(profile_image)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;
        Ok(row)
    }

    /// Students holding at least one certificate from `institution`.
    pub async fn students_of_institution(
        &self,
        institution: &str,
    ) -> Result<Vec<DbStudent>, CertifiError> {
        let rows = sqlx::query_as::<_, DbStudent>(
            r#"SELECT * FROM students
               WHERE student_id IN (
                   SELECT student_id FROM student_certificate WHERE institution = ?
               )
               ORDER BY full_name, id"#,
        )
        .bind(institution)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ---- certificates ----

    pub async fn insert_certificate(
        &self,
        cert: NewCertificate,
    ) -> Result<DbCertificate, CertifiError> {
        if self.find_student_by_student_id(&cert.student_id).await?.is_none() {
            return Err(CertifiError::NotFound(format!(
                "Student {} not found",
                cert.student_id
            )));
        }
        let now = Utc::now();
        let row = sqlx::query_as::<_, DbCertificate>(
            r#"INSERT INTO student_certificate (
                student_id, institution, degree, field_of_study, start_date, issue_date,
                document_hash, credential_hash, metadata_uri, tx_hash, issuer_address,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *"#,
        )
        .bind(cert.student_id)
        .bind(cert.institution)
        .bind(cert.degree)
        .bind(cert.field_of_study)
        .bind(cert.start_date)
        .bind(cert.issue_date)
        .bind(cert.document_hash.map(|h| h.to_lowercase()))
        .bind(cert.credential_hash.map(|h| h.to_lowercase()))
        .bind(cert.metadata_uri)
        .bind(cert.tx_hash)
        .bind(cert.issuer_address.map(|a| a.to_lowercase()))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn certificates_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<DbCertificate>, CertifiError> {
        let rows = sqlx::query_as::<_, DbCertificate>(
            "SELECT * FROM student_certificate WHERE student_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn certificates_by_institution(
        &self,
        institution: &str,
    ) -> Result<Vec<DbCertificate>, CertifiError> {
        let rows = sqlx::query_as::<_, DbCertificate>(
            "SELECT * FROM student_certificate WHERE institution = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(institution)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn certificate_by_credential_hash(
        &self,
        hash: &str,
    ) -> Result<Option<DbCertificate>, CertifiError> {
        let row = sqlx::query_as::<_, DbCertificate>(
            "SELECT * FROM student_certificate WHERE credential_hash = ? LIMIT 1",
        )
        .bind(hash.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Certificates recorded for a document with this SHA-256 hash, oldest first.
    pub async fn certificates_by_document_hash(
        &self,
        hash: &str,
    ) -> Result<Vec<DbCertificate>, CertifiError> {
        let rows = sqlx::query_as::<_, DbCertificate>(
            "SELECT * FROM student_certificate WHERE document_hash = ? ORDER BY id ASC",
        )
        .bind(hash.to_lowercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn institution_stats(
        &self,
        institution: &str,
        now: DateTime<Utc>,
    ) -> Result<InstitutionStats, CertifiError> {
        let (total_certificates, total_students, latest_issue_date): (i64, i64, Option<String>) =
            sqlx::query_as(
                r#"SELECT COUNT(*), COUNT(DISTINCT student_id), MAX(issue_date)
                   FROM student_certificate WHERE institution = ?"#,
            )
            .bind(institution)
            .fetch_one(&self.pool)
            .await?;

        let since = now - Duration::days(30);
        let (issued_last30_days,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM student_certificate WHERE institution = ? AND created_at >= ?",
        )
        .bind(institution)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(InstitutionStats {
            total_certificates,
            total_students,
            issued_last30_days,
            latest_issue_date,
        })
    }

    // ---- education & documents ----

    pub async fn add_education(
        &self,
        student_pk: i64,
        edu: NewEducation,
    ) -> Result<DbEducation, CertifiError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, DbEducation>(
            r#"INSERT INTO student_education (
                student_id, institution, degree, field_of_study, start_date,
                end_date, is_current, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *"#,
        )
        .bind(student_pk)
        .bind(edu.institution)
        .bind(edu.degree)
        .bind(edu.field_of_study)
        .bind(edu.start_date)
        .bind(edu.end_date)
        .bind(edu.is_current)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn education_of_student(
        &self,
        student_pk: i64,
    ) -> Result<Vec<DbEducation>, CertifiError> {
        let rows = sqlx::query_as::<_, DbEducation>(
            "SELECT * FROM student_education WHERE student_id = ? ORDER BY start_date DESC, id DESC",
        )
        .bind(student_pk)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_document(
        &self,
        student_pk: i64,
        doc: NewDocument,
    ) -> Result<DbDocument, CertifiError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, DbDocument>(
            r#"INSERT INTO student_documents (
                student_id, document_type, document_number, document_url, ipfs_hash,
                verified, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            RETURNING *"#,
        )
        .bind(student_pk)
        .bind(doc.document_type)
        .bind(doc.document_number)
        .bind(doc.document_url)
        .bind(doc.ipfs_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn documents_of_student(
        &self,
        student_pk: i64,
    ) -> Result<Vec<DbDocument>, CertifiError> {
        let rows = sqlx::query_as::<_, DbDocument>(
            "SELECT * FROM student_documents WHERE student_id = ? ORDER BY id",
        )
        .bind(student_pk)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_document_verified(
        &self,
        document_id: i64,
        verified: bool,
    ) -> Result<(), CertifiError> {
        let verified_i = if verified { 1 } else { 0 };
        let res = sqlx::query("UPDATE student_documents SET verified = ?, updated_at = ? WHERE id = ?")
            .bind(verified_i)
            .bind(Utc::now())
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(CertifiError::NotFound(format!(
                "Document {document_id} not found"
            )));
        }
        Ok(())
    }

    // ---- institutions ----

    /// Upsert by unique wallet address. New rows start active.
    pub async fn upsert_institution(
        &self,
        inst: NewInstitution,
    ) -> Result<DbInstitution, CertifiError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"INSERT INTO institutions (
                wallet_address, name, contact_email, website, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 'active', ?, ?)
            ON CONFLICT(wallet_address) DO UPDATE SET
                name = excluded.name,
                contact_email = excluded.contact_email,
                website = excluded.website,
                updated_at = excluded.updated_at
            RETURNING *"#,
        )
        .bind(inst.wallet_address.to_lowercase())
        .bind(inst.name)
        .bind(inst.contact_email)
        .bind(inst.website)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_institution(row)
    }

    pub async fn institution_by_address(
        &self,
        address: &str,
    ) -> Result<Option<DbInstitution>, CertifiError> {
        let row = sqlx::query("SELECT * FROM institutions WHERE wallet_address = ?")
            .bind(address.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_institution).transpose()
    }

    pub async fn set_institution_status(
        &self,
        address: &str,
        status: InstitutionStatus,
        reason: Option<String>,
    ) -> Result<DbInstitution, CertifiError> {
        let row = sqlx::query(
            r#"UPDATE institutions SET status = ?, suspension_reason = ?, updated_at = ?
               WHERE wallet_address = ?
               RETURNING *"#,
        )
        .bind(status.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(address.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Self::row_to_institution(row),
            None => Err(CertifiError::NotFound(format!(
                "Institution {address} not found"
            ))),
        }
    }

    fn row_to_institution(row: SqliteRow) -> Result<DbInstitution, CertifiError> {
        let status_s: String = row.try_get("status")?;
        let status = InstitutionStatus::parse(&status_s).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown institution status {status_s}").into())
        })?;

        Ok(DbInstitution {
            id: row.try_get("id")?,
            wallet_address: row.try_get("wallet_address")?,
            name: row.try_get("name")?,
            contact_email: row.try_get("contact_email")?,
            website: row.try_get("website")?,
            status,
            suspension_reason: row.try_get("suspension_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
