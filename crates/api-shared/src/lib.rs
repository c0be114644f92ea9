//! # API Shared
//!
//! Shared utilities and definitions for hatch APIs.
//!
//! Contains:
//! - Request authorization against signed tokens ([`auth`])
//! - Request and response schemas used by the REST API and the CLI ([`responses`])
//! - Shared services like `HealthService`

pub mod auth;
pub mod health;
pub mod responses;

pub use auth::{authenticate, authorize, bearer_token, permit, reject_malformed, AuthError};
pub use health::HealthService;
pub use responses::*;
