//! Constants used throughout the hatch core crate.

use std::time::Duration;

/// Metadata file written at the top of every release directory.
pub const RELEASE_METADATA_FILENAME: &str = "release.json";

/// Subdirectory of a release holding its snapshot of workspace files.
pub const RELEASE_FILES_DIR_NAME: &str = "files";

/// Prefix for staging directories and temporary files. Starts with `.` so listings skip them.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Top-level workspace directories that are never listed, selected or served.
pub const EXCLUDED_WORKSPACE_DIRS: [&str; 2] = ["releases", "metadata"];

/// Maximum attempts at generating an unused release id.
pub const MAX_RELEASE_ID_ATTEMPTS: usize = 5;

pub const DEFAULT_UPLOAD_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_UPLOAD_BACKOFF_MS: u64 = 250;
pub const DEFAULT_UPLOAD_MAX_BACKOFF_MS: u64 = 5_000;

/// Retryable job-server statuses when none are configured: timeout, rate limit, server errors.
pub const DEFAULT_UPLOAD_RETRY_STATUSES: &str = "408,429,500-599";

/// Lifetime of the token minted for each outbound upload call.
pub const UPLOAD_TOKEN_TTL_SECS: i64 = 300;

/// Per-request timeout for outbound upload calls.
pub const UPLOAD_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub const UPLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length of an upstream error body carried into a failure reason.
pub const MAX_ERROR_BODY_LEN: usize = 512;
