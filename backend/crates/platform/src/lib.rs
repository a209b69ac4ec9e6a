//! Platform Crate - Technical Infrastructure
//!
//! Shared technical foundations for the gating crates:
//! - Cryptographic utilities (SHA-256, random hex identifiers, constant-time comparison)
//! - Client identification from proxy headers
//! - Sliding-window rate limiting primitives

pub mod client;
pub mod crypto;
pub mod rate_limit;
