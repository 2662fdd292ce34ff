//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (HMAC-SHA256, Base64, secure random tokens)
//! - Cookie management
//! - Client address extraction
//! - Fixed-window rate limiting arithmetic

pub mod client;
pub mod cookie;
pub mod crypto;
pub mod rate_limit;
