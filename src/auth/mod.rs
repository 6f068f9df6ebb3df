//! Sign-in and sessions.
//!
//! Students sign in through Google OAuth, institutions with a wallet
//! signature. Either way the outcome is a [`SessionUser`] stored in an
//! encrypted cookie and read back by the [`AuthSession`] extractor.

pub mod google;
pub mod session;
pub mod wallet;

pub use session::{AuthSession, MaybeSession, SessionUser, UserRole};
