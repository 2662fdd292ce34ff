//! Presentation Layer
//!
//! HTTP handlers, pages and DTOs for the gateway.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod pages;
pub mod router;
