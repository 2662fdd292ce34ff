//! Email OTP Gateway
//!
//! Fronts the authorize step of a PDS OAuth flow: the user proves control of
//! an email address with a one-time code, then is redirected back to the PDS
//! with a short-lived signed assertion.
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, pure OTP logic, repository traits
//! - `application/` - Config, signers, use cases, cleanup worker
//! - `infra/` - Postgres and in-memory stores, mailers, identity resolvers
//! - `presentation/` - HTTP handlers, pages, middleware, router
//!
//! ## Security Model
//! - Double-submit CSRF cookie on every state-changing request
//! - Flow state lives in an HMAC-signed cookie with an embedded expiry
//! - Only a keyed hash of each code is stored; attempts are counted
//!   atomically before the code is compared
//! - Responses never reveal whether an email has an account

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::cleanup::{CleanupTask, CleanupWorker};
pub use application::config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, OtpFailure};
pub use infra::postgres::PgGatewayRepository;
pub use presentation::router::{gateway_router, gateway_router_generic};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

pub mod config {
    pub use crate::application::config::*;
}

pub mod mailer {
    pub use crate::infra::mailer::{HttpMailer, LogMailer};
}

pub mod identity {
    pub use crate::infra::identity::{NoIdentityResolver, PdsIdentityResolver};
}

pub mod store {
    pub use crate::infra::memory::InMemoryGatewayRepository as MemoryStore;
    pub use crate::infra::postgres::PgGatewayRepository as GatewayStore;
}

#[cfg(test)]
mod tests;
