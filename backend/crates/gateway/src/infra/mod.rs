//! Infrastructure Layer
//!
//! Store, mail and identity implementations of the domain traits.

pub mod identity;
pub mod mailer;
pub mod memory;
pub mod postgres;
