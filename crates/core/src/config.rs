//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Services never read environment variables during request
//! handling; binaries read them once, parse them with the helpers here, and hand the result
//! to [`CoreConfig::new`].

use crate::constants::{
    DEFAULT_UPLOAD_BACKOFF_MS, DEFAULT_UPLOAD_MAX_ATTEMPTS, DEFAULT_UPLOAD_MAX_BACKOFF_MS,
    DEFAULT_UPLOAD_RETRY_STATUSES,
};
use crate::{CoreError, CoreResult};
use hatch_tokens::{SigningSecret, TokenCodec, DEFAULT_SALT};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    workspaces_dir: PathBuf,
    releases_dir: PathBuf,
    job_server_endpoint: String,
    codec: TokenCodec,
    backend: String,
    upload_policy: UploadPolicy,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if either directory is missing, the job-server
    /// endpoint is not an `http(s)://` URL, or the backend name is empty, and
    /// [`CoreError::Token`] if the signing secret is too weak.
    pub fn new(
        workspaces_dir: PathBuf,
        releases_dir: PathBuf,
        job_server_endpoint: String,
        signing_secret: &SigningSecret,
        backend: String,
        upload_policy: UploadPolicy,
    ) -> CoreResult<Self> {
        for (name, dir) in [("workspaces", &workspaces_dir), ("releases", &releases_dir)] {
            if !dir.is_dir() {
                return Err(CoreError::InvalidInput(format!(
                    "{name} directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        let endpoint = job_server_endpoint.trim().trim_end_matches('/').to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(CoreError::InvalidInput(format!(
                "job-server endpoint must be an http(s) URL: {endpoint}"
            )));
        }

        let backend = backend.trim().to_string();
        if backend.is_empty() {
            return Err(CoreError::InvalidInput("backend cannot be empty".into()));
        }

        let codec = TokenCodec::new(signing_secret, DEFAULT_SALT)?;

        Ok(Self {
            workspaces_dir,
            releases_dir,
            job_server_endpoint: endpoint,
            codec,
            backend,
            upload_policy,
        })
    }

    pub fn workspaces_dir(&self) -> &Path {
        &self.workspaces_dir
    }

    pub fn releases_dir(&self) -> &Path {
        &self.releases_dir
    }

    /// Job-server base URL without a trailing slash.
    pub fn job_server_endpoint(&self) -> &str {
        &self.job_server_endpoint
    }

    /// Codec for both inbound verification and outbound upload tokens.
    pub fn token_codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn upload_policy(&self) -> &UploadPolicy {
        &self.upload_policy
    }
}

/// Retry bound, backoff schedule and retryable statuses for outbound uploads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    retry_statuses: Vec<RangeInclusive<u16>>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_UPLOAD_MAX_ATTEMPTS,
            base_backoff: Duration::from_millis(DEFAULT_UPLOAD_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_UPLOAD_MAX_BACKOFF_MS),
            retry_statuses: vec![408..=408, 429..=429, 500..=599],
        }
    }
}

impl UploadPolicy {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if `max_attempts` is zero or `max_backoff` is
    /// shorter than `base_backoff`.
    pub fn new(
        max_attempts: u32,
        base_backoff: Duration,
        max_backoff: Duration,
        retry_statuses: Vec<RangeInclusive<u16>>,
    ) -> CoreResult<Self> {
        if max_attempts == 0 {
            return Err(CoreError::InvalidInput(
                "upload max attempts must be at least 1".into(),
            ));
        }
        if max_backoff < base_backoff {
            return Err(CoreError::InvalidInput(
                "upload max backoff must not be shorter than the base backoff".into(),
            ));
        }

        Ok(Self {
            max_attempts,
            base_backoff,
            max_backoff,
            retry_statuses,
        })
    }

    /// Total attempts per file, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt + 1`: the base doubled per attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.iter().any(|r| r.contains(&status))
    }
}

/// Build an [`UploadPolicy`] from optional environment values.
///
/// Each value that is `None` or empty/whitespace falls back to its default.
pub fn upload_policy_from_env_values(
    max_attempts: Option<String>,
    backoff_ms: Option<String>,
    max_backoff_ms: Option<String>,
    retry_statuses: Option<String>,
) -> CoreResult<UploadPolicy> {
    fn non_empty(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_number<T: std::str::FromStr>(name: &str, value: Option<String>) -> CoreResult<Option<T>> {
        non_empty(value)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| CoreError::InvalidInput(format!("{name} is not a number: {v}")))
            })
            .transpose()
    }

    let max_attempts = parse_number::<u32>("upload max attempts", max_attempts)?
        .unwrap_or(DEFAULT_UPLOAD_MAX_ATTEMPTS);
    let backoff_ms =
        parse_number::<u64>("upload backoff", backoff_ms)?.unwrap_or(DEFAULT_UPLOAD_BACKOFF_MS);
    let max_backoff_ms = parse_number::<u64>("upload max backoff", max_backoff_ms)?
        .unwrap_or(DEFAULT_UPLOAD_MAX_BACKOFF_MS);
    let statuses = non_empty(retry_statuses)
        .unwrap_or_else(|| DEFAULT_UPLOAD_RETRY_STATUSES.to_string());

    UploadPolicy::new(
        max_attempts,
        Duration::from_millis(backoff_ms),
        Duration::from_millis(max_backoff_ms),
        parse_status_list(&statuses)?,
    )
}

/// Parse a comma-separated list of statuses and inclusive ranges, e.g. `408,429,500-599`.
pub fn parse_status_list(value: &str) -> CoreResult<Vec<RangeInclusive<u16>>> {
    let invalid = |item: &str| CoreError::InvalidInput(format!("invalid HTTP status: {item}"));

    let parse_status = |item: &str| -> CoreResult<u16> {
        let status = item.trim().parse::<u16>().map_err(|_| invalid(item))?;
        if !(100..=599).contains(&status) {
            return Err(invalid(item));
        }
        Ok(status)
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse_status(start)?, parse_status(end)?);
                if start > end {
                    return Err(invalid(item));
                }
                Ok(start..=end)
            }
            None => parse_status(item).map(|s| s..=s),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn secret() -> SigningSecret {
        SigningSecret::new("a-shared-secret-that-is-long-enough")
    }

    #[test]
    fn test_new_validates_inputs() {
        let temp = TempDir::new().unwrap();
        let ws = temp.path().join("workspaces");
        let rel = temp.path().join("releases");
        std::fs::create_dir_all(&ws).unwrap();
        std::fs::create_dir_all(&rel).unwrap();

        let cfg = CoreConfig::new(
            ws.clone(),
            rel.clone(),
            "https://jobs.example.org/api/v2/".into(),
            &secret(),
            "tpp".into(),
            UploadPolicy::default(),
        )
        .unwrap();
        assert_eq!(cfg.job_server_endpoint(), "https://jobs.example.org/api/v2");
        assert_eq!(cfg.backend(), "tpp");

        let missing = CoreConfig::new(
            temp.path().join("missing"),
            rel.clone(),
            "https://jobs.example.org".into(),
            &secret(),
            "tpp".into(),
            UploadPolicy::default(),
        );
        assert!(matches!(missing, Err(CoreError::InvalidInput(_))));

        let bad_url = CoreConfig::new(
            ws.clone(),
            rel.clone(),
            "ftp://jobs".into(),
            &secret(),
            "tpp".into(),
            UploadPolicy::default(),
        );
        assert!(matches!(bad_url, Err(CoreError::InvalidInput(_))));

        let weak = CoreConfig::new(
            ws,
            rel,
            "http://localhost:8000".into(),
            &SigningSecret::new("short"),
            "tpp".into(),
            UploadPolicy::default(),
        );
        assert!(matches!(weak, Err(CoreError::Token(_))));
    }

    #[test]
    fn test_default_policy() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.is_retryable_status(408));
        assert!(policy.is_retryable_status(429));
        assert!(policy.is_retryable_status(500));
        assert!(policy.is_retryable_status(503));
        assert!(!policy.is_retryable_status(400));
        assert!(!policy.is_retryable_status(404));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = UploadPolicy::new(
            5,
            Duration::from_millis(100),
            Duration::from_millis(350),
            vec![],
        )
        .unwrap();
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_policy_rejects_zero_attempts() {
        assert!(UploadPolicy::new(0, Duration::ZERO, Duration::ZERO, vec![]).is_err());
    }

    #[test]
    fn test_policy_from_env_values_defaults() {
        let policy = upload_policy_from_env_values(None, Some("  ".into()), None, None).unwrap();
        assert_eq!(policy, UploadPolicy::default());
    }

    #[test]
    fn test_policy_from_env_values_overrides() {
        let policy = upload_policy_from_env_values(
            Some("5".into()),
            Some("10".into()),
            Some("20".into()),
            Some("502, 503".into()),
        )
        .unwrap();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.backoff(3), Duration::from_millis(20));
        assert!(policy.is_retryable_status(503));
        assert!(!policy.is_retryable_status(500));
    }

    #[test]
    fn test_policy_from_env_values_rejects_garbage() {
        assert!(upload_policy_from_env_values(Some("many".into()), None, None, None).is_err());
        assert!(upload_policy_from_env_values(None, None, None, Some("5xx".into())).is_err());
        assert!(upload_policy_from_env_values(None, None, None, Some("599-500".into())).is_err());
    }
}
