//! Shared Kernel
//!
//! The smallest vocabulary shared by every gateway crate:
//! - Unified error type and result alias
//! - Typed record identifiers

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
