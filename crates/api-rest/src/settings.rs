//! Process settings read from the environment at startup.

use anyhow::Context;
use hatch_core::{upload_policy_from_env_values, CoreConfig, SigningSecret};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:8001";
pub const DEFAULT_BACKEND: &str = "hatch";

/// Everything a server binary needs, resolved once.
#[derive(Clone, Debug)]
pub struct Settings {
    pub cfg: Arc<CoreConfig>,
    pub addr: String,
    pub spa_origin: Option<String>,
}

impl Settings {
    /// Reads settings from environment variables.
    ///
    /// # Environment Variables
    /// - `HATCH_WORKSPACES_DIR`, `HATCH_RELEASES_DIR`: required, must exist
    /// - `JOB_SERVER_ENDPOINT`: required job-server base URL
    /// - `JOB_SERVER_TOKEN`: required shared signing secret
    /// - `HATCH_BACKEND`: backend name (default: "hatch")
    /// - `HATCH_REST_ADDR`: listen address (default: "0.0.0.0:8001")
    /// - `HATCH_SPA_ORIGIN`: origin allowed for CORS and framing
    /// - `HATCH_UPLOAD_MAX_ATTEMPTS`, `HATCH_UPLOAD_BACKOFF_MS`, `HATCH_UPLOAD_MAX_BACKOFF_MS`,
    ///   `HATCH_UPLOAD_RETRY_STATUSES`: upload retry policy
    pub fn from_env() -> anyhow::Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let required = |name: &str| var(name).with_context(|| format!("{name} must be set"));

        let upload_policy = upload_policy_from_env_values(
            var("HATCH_UPLOAD_MAX_ATTEMPTS"),
            var("HATCH_UPLOAD_BACKOFF_MS"),
            var("HATCH_UPLOAD_MAX_BACKOFF_MS"),
            var("HATCH_UPLOAD_RETRY_STATUSES"),
        )?;

        let cfg = CoreConfig::new(
            PathBuf::from(required("HATCH_WORKSPACES_DIR")?),
            PathBuf::from(required("HATCH_RELEASES_DIR")?),
            required("JOB_SERVER_ENDPOINT")?,
            &SigningSecret::new(required("JOB_SERVER_TOKEN")?),
            var("HATCH_BACKEND").unwrap_or_else(|| DEFAULT_BACKEND.into()),
            upload_policy,
        )?;

        Ok(Self {
            cfg: Arc::new(cfg),
            addr: var("HATCH_REST_ADDR").unwrap_or_else(|| DEFAULT_REST_ADDR.into()),
            spa_origin: var("HATCH_SPA_ORIGIN"),
        })
    }
}
