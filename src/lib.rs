pub mod auth;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ipfs;
pub mod router;
pub mod rpc;
pub mod service;
pub mod types;

pub use error::CertifiError;
pub use router::{CertifiState, certifi_router};
