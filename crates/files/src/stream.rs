//! Bounded-chunk file streaming with optional byte ranges.

use crate::constants::{SNIFF_LEN, STREAM_CHUNK_SIZE};
use crate::range::{ByteRange, SatisfiedRange};
use crate::{FilesError, FilesResult};
use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

/// An opened file positioned and bounded for the requested range.
#[derive(Debug)]
pub struct FileStream {
    reader: Take<File>,
    /// Total size of the file on disk.
    pub size: u64,
    /// The satisfied range, or `None` for full content.
    pub range: Option<SatisfiedRange>,
    /// Number of bytes the stream will yield.
    pub content_length: u64,
    /// Best-effort media type.
    pub media_type: &'static str,
}

impl FileStream {
    /// Converts into a stream of chunks of at most [`STREAM_CHUNK_SIZE`] bytes.
    pub fn into_stream(self) -> ReaderStream<Take<File>> {
        ReaderStream::with_capacity(self.reader, STREAM_CHUNK_SIZE)
    }

    /// Converts into the underlying bounded reader.
    pub fn into_reader(self) -> Take<File> {
        self.reader
    }
}

/// Opens `path` for streaming, honouring an optional byte range.
///
/// `path` must already have been resolved through a [`crate::PathGuard`].
///
/// # Errors
///
/// - [`FilesError::NotFound`] if the file does not exist or is not a regular file
/// - [`FilesError::RangeNotSatisfiable`] if `range` cannot be served
/// - [`FilesError::Io`] for any other failure
pub async fn open_stream(path: &Path, range: Option<ByteRange>) -> FilesResult<FileStream> {
    let not_found = || FilesError::NotFound(path.display().to_string());

    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(FilesError::Io(e)),
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(not_found());
    }
    let size = metadata.len();

    let satisfied = range.map(|r| r.resolve(size)).transpose()?;

    let mut prefix = vec![0u8; SNIFF_LEN.min(size as usize)];
    let sniffed = file.read(&mut prefix).await?;
    let media_type = media_type_for(path, &prefix[..sniffed]);

    let (start, content_length) = match satisfied {
        Some(r) => (r.start, r.len()),
        None => (0, size),
    };
    file.seek(SeekFrom::Start(start)).await?;

    Ok(FileStream {
        reader: file.take(content_length),
        size,
        range: satisfied,
        content_length,
        media_type,
    })
}

/// Detects a media type from content, falling back to the file extension for text formats
/// that have no magic bytes.
fn media_type_for(path: &Path, prefix: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(prefix) {
        return kind.mime_type();
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("csv") => "text/csv",
        Some("tsv") => "text/tab-separated-values",
        Some("txt") | Some("log") => "text/plain",
        Some("md") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
