//! Recursive directory listing.

use crate::guard::{is_hidden, PathGuard};
use crate::{FilesError, FilesResult};
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One regular file found under a guard's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Normalised forward-slash path relative to the root.
    pub relative: String,
    /// Absolute path of the file (for symlinks, the canonical target).
    pub absolute: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Lists every visible regular file under the guard's root, sorted by relative path.
///
/// Hidden entries (any segment starting with `.`) are pruned, as is anything for which
/// `include` returns false. Symlinks are listed only when they resolve to a regular file
/// inside the root. Entries that vanish while the walk is in progress are skipped, since
/// external writers may be modifying the tree.
///
/// # Errors
///
/// Returns [`FilesError::Io`] if the root cannot be read or a non-transient error occurs.
pub fn list_files(
    guard: &PathGuard,
    include: impl Fn(&str) -> bool,
) -> FilesResult<Vec<FileEntry>> {
    let root = guard.root();
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| !name.starts_with('.'))
                .unwrap_or(false)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_vanished(&e) => continue,
            Err(e) => {
                if e.path() == Some(root) || e.depth() == 0 {
                    return Err(FilesError::Io(e.into()));
                }
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };

        let Some(relative) = relative_path(root, entry.path()) else {
            tracing::warn!("skipping non UTF-8 path: {}", entry.path().display());
            continue;
        };

        if is_hidden(&relative) || !include(&relative) {
            continue;
        }

        let file_type = entry.file_type();
        let (absolute, metadata) = if file_type.is_file() {
            match entry.metadata() {
                Ok(metadata) => (entry.path().to_path_buf(), metadata),
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(FilesError::Io(e.into())),
            }
        } else if file_type.is_symlink() {
            match guard.resolve(&relative) {
                Ok(resolved) => match std::fs::metadata(&resolved.absolute) {
                    Ok(metadata) if metadata.is_file() => (resolved.absolute, metadata),
                    Ok(_) => continue,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(FilesError::Io(e)),
                },
                Err(FilesError::PathTraversal(_)) | Err(FilesError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        } else {
            continue;
        };

        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .map_err(FilesError::Io)?;

        entries.push(FileEntry {
            relative,
            absolute,
            size: metadata.len(),
            modified,
        });
    }

    entries.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(entries)
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let segments: Option<Vec<&str>> = stripped.components().map(|c| c.as_os_str().to_str()).collect();
    Some(segments?.join("/"))
}

fn is_vanished(error: &walkdir::Error) -> bool {
    error
        .io_error()
        .map(|io| io.kind() == ErrorKind::NotFound)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_lists_sorted_visible_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "output/b.txt", "bb");
        write(root, "output/a.csv", "a");
        write(root, "z.txt", "zzz");
        write(root, "output/.hidden", "x");
        write(root, ".git/config", "x");
        write(root, ".lock", "x");

        let guard = PathGuard::new(root).unwrap();
        let entries = list_files(&guard, |_| true).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.relative.as_str()).collect();

        assert_eq!(names, vec!["output/a.csv", "output/b.txt", "z.txt"]);
        assert_eq!(entries[1].size, 2);
        assert!(entries[0].absolute.ends_with("output/a.csv"));
    }

    #[test]
    fn test_include_filter_applies() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "output/a.csv", "a");
        write(root, "releases/r1/a.csv", "a");
        write(root, "metadata/manifest.json", "{}");

        let guard = PathGuard::new(root).unwrap();
        let entries = list_files(&guard, |rel| {
            !rel.starts_with("releases/") && !rel.starts_with("metadata/")
        })
        .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].relative, "output/a.csv");
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        let guard = PathGuard::new(temp.path()).unwrap();
        assert!(list_files(&guard, |_| true).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_outside_root_are_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("ws");
        write(&root, "a.txt", "a");
        write(temp.path(), "outside.txt", "secret");
        std::os::unix::fs::symlink(temp.path().join("outside.txt"), root.join("escape")).unwrap();
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("inside")).unwrap();

        let guard = PathGuard::new(&root).unwrap();
        let names: Vec<_> = list_files(&guard, |_| true)
            .unwrap()
            .into_iter()
            .map(|e| e.relative)
            .collect();

        assert_eq!(names, vec!["a.txt".to_string(), "inside".to_string()]);
    }
}
