//! Filesystem utilities for harvest.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        // Another worker may have created it between the check and the create.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// What `copy_if_absent` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// The destination already existed and was left untouched.
    AlreadyPresent,
}

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A temp path next to `path`, unique within this process.
pub fn temp_sibling(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent.join(format!(
        ".tmp-{}-{}-{file_name}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

/// Copy `src` to `dest` byte-for-byte unless `dest` already exists.
///
/// The copy goes to a temporary sibling first and is renamed into place, so a
/// concurrent copy of the same file never exposes a half-written destination.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the copy fails.
pub fn copy_if_absent(src: &Path, dest: &Path) -> Result<CopyOutcome, UtilError> {
    if dest.exists() {
        return Ok(CopyOutcome::AlreadyPresent);
    }

    ensure_dir(dest.parent().unwrap_or_else(|| Path::new(".")))?;
    let tmp_path = temp_sibling(dest);

    if let Err(source) = std::fs::copy(src, &tmp_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(UtilError::Io {
            path: src.display().to_string(),
            source,
        });
    }

    if dest.exists() {
        let _ = std::fs::remove_file(&tmp_path);
        return Ok(CopyOutcome::AlreadyPresent);
    }

    match std::fs::rename(&tmp_path, dest) {
        Ok(()) => Ok(CopyOutcome::Copied),
        Err(_) if dest.exists() => {
            let _ = std::fs::remove_file(&tmp_path);
            Ok(CopyOutcome::AlreadyPresent)
        }
        Err(source) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(UtilError::Io {
                path: dest.display().to_string(),
                source,
            })
        }
    }
}

/// Write `contents` to `path` atomically (temp file + rename).
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), UtilError> {
    ensure_dir(path.parent().unwrap_or_else(|| Path::new(".")))?;
    let tmp_path = temp_sibling(path);
    std::fs::write(&tmp_path, contents).map_err(|source| UtilError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| {
        let _ = std::fs::remove_file(&tmp_path);
        UtilError::Io {
            path: path.display().to_string(),
            source,
        }
    })
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Files in `dir` (not recursive) with the given `extension`, sorted by path.
///
/// A missing directory yields an empty list.
///
/// # Errors
/// Returns an error if `dir` exists but cannot be read.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, UtilError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(UtilError::Io {
                path: dir.display().to_string(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == extension)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Whether `path` contains a `..` segment.
pub fn has_parent_segment(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// `path` expressed relative to `base`.
///
/// Returns `None` when no relative form exists (e.g. one path is absolute and
/// the other is not).
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    pathdiff::diff_paths(path, base)
}

/// `path` made absolute against the current directory, without touching the
/// filesystem. Returned unchanged if the current directory is unavailable.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_portable(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// The user's home directory.
///
/// Resolves via `HOME` (Unix) or `USERPROFILE` (Windows).
///
/// # Errors
/// Returns `UtilError::NoHomeDir` if neither environment variable is set.
pub fn home_dir() -> Result<PathBuf, UtilError> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .map_err(|_| UtilError::NoHomeDir)
}

/// Expand a leading `~` to the user's home directory.
///
/// # Errors
/// Returns an error if the path starts with `~` and no home directory is known.
pub fn expand_home(path: &str) -> Result<PathBuf, UtilError> {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            Ok(home_dir()?.join(rest.trim_start_matches(['/', '\\'])))
        }
        _ => Ok(PathBuf::from(path)),
    }
}
