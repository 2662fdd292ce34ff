//! Application Layer - Use Cases
//!
//! Orchestrates domain logic, the store and the external collaborators.

pub mod callback_signer;
pub mod cleanup;
pub mod config;
pub mod otp_service;
pub mod rate_limiter;
pub mod send_code;
pub mod session_signer;
pub mod verify_code;
