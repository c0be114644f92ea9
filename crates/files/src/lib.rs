//! Hatch File Access
//!
//! Read-side file primitives shared by the workspace index, release store and file server.
//!
//! ## Design Principles
//!
//! - Every externally supplied relative path is resolved through [`PathGuard`]; nothing else
//!   in the service joins user input onto a directory
//! - Listings are always re-read from disk; only content hashes are cached, keyed by
//!   `(path, size, mtime)` so a changed file is never served a stale hash
//! - File contents are streamed in bounded chunks; no file is buffered whole in memory
//!
//! ## Example Usage
//!
//! ```no_run
//! use hatch_files::{PathGuard, list_files};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let guard = PathGuard::new(Path::new("/srv/workspaces/proj1"))?;
//! let resolved = guard.resolve("output/results.csv")?;
//! let manifest = list_files(&guard, |_| true)?;
//! # let _ = (resolved, manifest);
//! # Ok(())
//! # }
//! ```

mod constants;
mod guard;
mod hashing;
mod listing;
mod range;
mod stream;

pub use constants::{DEFAULT_HASH_CACHE_ENTRIES, STREAM_CHUNK_SIZE};
pub use guard::{is_hidden, PathGuard, ResolvedPath, RootPolicy};
pub use hashing::{sha256_file, HashCache};
pub use listing::{list_files, FileEntry};
pub use range::{ByteRange, SatisfiedRange};
pub use stream::{open_stream, FileStream};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// The path is absolute, contains `..`, or resolves outside the root
    #[error("Path escapes root: {0}")]
    PathTraversal(String),

    /// The path is well formed but nothing exists there
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested byte range cannot be served from a file of `size` bytes
    #[error("Range not satisfiable for file of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FilesResult<T> = std::result::Result<T, FilesError>;
