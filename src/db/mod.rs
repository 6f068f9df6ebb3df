//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows, plus insert payloads
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: `CertifiStorage`, the query layer over a sqlx pool

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{
    DbCertificate, DbDocument, DbEducation, DbInstitution, DbStudent, InstitutionStats,
    InstitutionStatus, NewCertificate, NewDocument, NewEducation, NewInstitution, NewStudent,
};
pub use schema::SQLITE_INIT;
pub use sqlite::{CertifiStorage, SqlitePool};
