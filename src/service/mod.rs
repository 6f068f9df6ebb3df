pub mod issuer;
pub mod verifier;

pub use issuer::{ActiveInstitution, CertificateFile, IssueOutcome, IssueRequest, Issuer};
pub use verifier::{DocumentVerification, SignatureVerification, VerificationResult, Verifier};
