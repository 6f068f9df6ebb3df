pub mod auth;
pub mod health;
pub mod ipfs;
pub mod verify;
