//! SHA-256 content hashing with a metadata-keyed cache.
//!
//! A large workspace may hold many big files, and every manifest request needs a hash per
//! file. Hashes are therefore cached in memory keyed by `(path, size, mtime)`: if any of the
//! three differs from the cached entry the file is rehashed.

use crate::constants::{DEFAULT_HASH_CACHE_ENTRIES, STREAM_CHUNK_SIZE};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Computes the hex SHA-256 of a file, reading it in bounded chunks.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; STREAM_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CachedHash {
    size: u64,
    modified: SystemTime,
    sha256: String,
}

/// Thread-safe cache of file content hashes.
#[derive(Debug)]
pub struct HashCache {
    entries: RwLock<HashMap<PathBuf, CachedHash>>,
    max_entries: usize,
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_CACHE_ENTRIES)
    }
}

impl HashCache {
    /// Creates a cache that resets once it holds `max_entries` hashes.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Returns the SHA-256 of `path`, using the cached value when size and mtime still match.
    ///
    /// The file is re-stat'ed after hashing and the result is only cached if the metadata
    /// did not change while it was being read; the freshly computed hash is returned either
    /// way.
    pub fn sha256(&self, path: &Path) -> io::Result<String> {
        let metadata = std::fs::metadata(path)?;
        let size = metadata.len();
        let modified = metadata.modified()?;

        if let Some(cached) = self.entries.read().get(path) {
            if cached.size == size && cached.modified == modified {
                tracing::debug!("SHA_CACHE: HIT: {}", path.display());
                return Ok(cached.sha256.clone());
            }
            tracing::debug!("SHA_CACHE: STALE: {}", path.display());
        } else {
            tracing::debug!("SHA_CACHE: MISS: {}", path.display());
        }

        let sha256 = sha256_file(path)?;

        let after = std::fs::metadata(path)?;
        if after.len() == size && after.modified()? == modified {
            let mut entries = self.entries.write();
            if entries.len() >= self.max_entries && !entries.contains_key(path) {
                entries.clear();
            }
            entries.insert(
                path.to_path_buf(),
                CachedHash {
                    size,
                    modified,
                    sha256: sha256.clone(),
                },
            );
        }

        Ok(sha256)
    }

    /// Number of cached hashes.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
