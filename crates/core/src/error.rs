use hatch_files::FilesError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),
    #[error("release not found: {0}")]
    ReleaseNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("path escapes its root: {0}")]
    PathTraversal(String),

    #[error("no files selected for release")]
    EmptySelection,
    #[error("file {path} changed since review: expected sha256 {expected}, found {actual}")]
    FileChanged {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("failed to create release: {0}")]
    ReleaseCreationFailed(#[source] std::io::Error),
    #[error(
        "create failed and cleanup also failed (path: {path}): create={create_error}; cleanup={cleanup_error}",
        path = path.display()
    )]
    CleanupAfterCreateFailed {
        path: PathBuf,
        #[source]
        create_error: Box<CoreError>,
        cleanup_error: std::io::Error,
    },
    #[error("invalid status transition for {path}: {from} -> {to}")]
    InvalidStatusTransition {
        path: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("requested range not satisfiable (file is {size} bytes)")]
    RangeNotSatisfiable { size: u64 },

    #[error("transient upload error: {0}")]
    UploadTransientError(String),
    #[error("upload failed: {0}")]
    UploadFatalError(String),

    #[error("failed to read release metadata: {0}")]
    MetadataRead(std::io::Error),
    #[error("failed to write release metadata: {0}")]
    MetadataWrite(std::io::Error),
    #[error("failed to serialize release metadata: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize release metadata: {0}")]
    Deserialization(serde_json::Error),

    #[error("background task failed: {0}")]
    BlockingTask(String),

    #[error("token error: {0}")]
    Token(#[from] hatch_tokens::TokenError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

impl From<FilesError> for CoreError {
    fn from(error: FilesError) -> Self {
        match error {
            FilesError::InvalidRootDirectory(msg) => CoreError::InvalidInput(msg),
            FilesError::PathTraversal(path) => CoreError::PathTraversal(path),
            FilesError::NotFound(path) => CoreError::FileNotFound(path),
            FilesError::RangeNotSatisfiable { size } => CoreError::RangeNotSatisfiable { size },
            FilesError::Io(e) => CoreError::Io(e),
        }
    }
}

impl CoreError {
    /// True for the resource-resolution family that maps to "not found" at the edge.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::WorkspaceNotFound(_)
                | CoreError::ReleaseNotFound(_)
                | CoreError::FileNotFound(_)
        )
    }
}
