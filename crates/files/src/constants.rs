//! Sizing constants for file access.

/// Chunk size used when streaming file contents and hashing.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Number of cached content hashes kept before the cache is reset.
pub const DEFAULT_HASH_CACHE_ENTRIES: usize = 100_000;

/// Bytes read from the start of a file for media type detection.
pub(crate) const SNIFF_LEN: usize = 8 * 1024;
