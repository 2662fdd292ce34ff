//! Domain Layer
//!
//! - Entities (Account, OtpToken, RateLimitEntry)
//! - Value objects (Email, OtpCode, FlowState, Identity)
//! - Pure services (code generation, hashing, attempt evaluation)
//! - Repository and collaborator traits

pub mod collaborators;
pub mod entities;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use collaborators::{IdentityResolver, Mailer};
pub use entities::{Account, AttemptRecord, OtpToken, RateLimitEntry};
pub use repository::{AccountRepository, GatewayRepository, OtpRepository, RateLimitRepository};
