//! External Collaborators
//!
//! Mail delivery and upstream identity lookup. Both are outside the
//! gateway's trust boundary; callers log their failures and carry on.

use crate::domain::value_objects::{Email, Identity, OtpCode};
use crate::error::GatewayResult;

/// Delivers a code to an email address
#[trait_variant::make(Mailer: Send)]
pub trait LocalMailer {
    async fn send_otp(&self, email: &Email, code: &OtpCode) -> GatewayResult<()>;
}

/// Maps a verified email to the identity the PDS holds for it
#[trait_variant::make(IdentityResolver: Send)]
pub trait LocalIdentityResolver {
    /// `Ok(None)` when the upstream system has no account for the email
    async fn resolve(&self, email: &Email) -> GatewayResult<Option<Identity>>;
}
