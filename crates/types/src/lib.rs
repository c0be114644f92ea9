//! Validated identifier types shared across the hatch crates.
//!
//! Everything that arrives from outside the service (URL segments, request bodies, CLI
//! arguments) and ends up naming something on disk goes through one of these types first:
//!
//! - [`WorkspaceName`]: a single safe directory name under the workspaces root
//! - [`ReleaseId`]: a canonical 32-hex-character random identifier

mod ids;

pub use ids::{ReleaseId, WorkspaceName};

/// Errors that can occur when parsing validated identifiers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input is not a valid workspace directory name
    #[error("Invalid workspace name: '{0}'")]
    InvalidWorkspaceName(String),

    /// The input is not a canonical release identifier
    #[error("Release id must be 32 lowercase hex characters, got: '{0}'")]
    InvalidReleaseId(String),
}
