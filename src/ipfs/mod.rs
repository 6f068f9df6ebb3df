//! IPFS pinning and gateway access for certificate files and metadata.

mod client;

pub use client::{IpfsClient, ipfs_uri};
