//! SQL DDL for initializing the Certifi database.
//! SQLite-first design; timestamps are RFC3339 text.

/// Tables:
/// - `students`: one row per registered student, unique on `student_id`, `email`, `wallet_address`
/// - `student_certificate`: issued certificates, keyed to `students.student_id`
/// - `student_education` / `student_documents`: profile detail keyed to `students.id`
/// - `institutions`: wallet-authenticated issuers and their approval status
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id TEXT NOT NULL UNIQUE,
    wallet_address TEXT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    date_of_birth TEXT NULL,
    nationality TEXT NULL,
    phone_number TEXT NULL,
    profile_image TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS student_certificate (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id TEXT NOT NULL REFERENCES students(student_id),
    institution TEXT NOT NULL,
    degree TEXT NOT NULL,
    field_of_study TEXT NOT NULL,
    start_date TEXT NOT NULL,
    issue_date TEXT NOT NULL,
    document_hash TEXT NULL,
    credential_hash TEXT NULL UNIQUE,
    metadata_uri TEXT NULL,
    tx_hash TEXT NULL,
    issuer_address TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_certificate_student ON student_certificate(student_id);
CREATE INDEX IF NOT EXISTS idx_certificate_institution ON student_certificate(institution);
CREATE INDEX IF NOT EXISTS idx_certificate_document_hash ON student_certificate(document_hash);

CREATE TABLE IF NOT EXISTS student_education (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students(id),
    institution TEXT NOT NULL,
    degree TEXT NOT NULL,
    field_of_study TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NULL,
    is_current INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS student_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students(id),
    document_type TEXT NOT NULL, -- e.g. ID_CARD, PASSPORT, DEGREE_CERTIFICATE
    document_number TEXT NULL,
    document_url TEXT NOT NULL,
    ipfs_hash TEXT NULL,
    verified INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS institutions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wallet_address TEXT NOT NULL UNIQUE, -- lowercase
    name TEXT NOT NULL,
    contact_email TEXT NULL,
    website TEXT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    suspension_reason TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
