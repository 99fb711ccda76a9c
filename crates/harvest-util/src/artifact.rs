//! Place a remote file into the local repository: download, verify, atomic rename.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::download::{Credentials, Downloader};
use crate::error::UtilError;

/// Where and how to fetch one file.
#[derive(Debug, Clone, Copy)]
pub struct FetchSpec<'a> {
    pub url: &'a str,
    pub credentials: Option<&'a Credentials>,
    /// Check the published `.sha256` sidecar when the repository has one.
    pub verify_checksum: bool,
}

/// Result of ensuring a file is available locally.
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    /// Path to the file on disk.
    pub path: PathBuf,
    /// `true` if the file was downloaded this call, `false` if it already existed.
    pub freshly_downloaded: bool,
}

/// Ensure a file exists at `dest`, downloading it when missing or when `refresh` is set.
///
/// 1. If `dest` exists and no refresh is requested, return it untouched.
/// 2. Otherwise download to a temp file next to `dest`, verify the checksum
///    sidecar if requested, then atomically rename into place.
/// 3. If the rename fails because another worker placed the file first,
///    accept the placed file.
/// 4. The temp file is removed on every error path.
///
/// # Errors
/// Returns `UtilError::NotFound` if the remote does not have the file, a
/// checksum mismatch, a transfer failure, or an I/O failure.
pub fn ensure_artifact(
    downloader: &Downloader,
    spec: FetchSpec<'_>,
    dest: &Path,
    refresh: bool,
) -> Result<ArtifactResult, UtilError> {
    if dest.is_file() && !refresh {
        return Ok(ArtifactResult {
            path: dest.to_path_buf(),
            freshly_downloaded: false,
        });
    }

    crate::fs::ensure_dir(dest.parent().unwrap_or_else(|| Path::new(".")))?;
    let tmp_path = crate::fs::temp_sibling(dest);

    if let Err(e) = downloader.download(spec.url, &tmp_path, spec.credentials) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    if spec.verify_checksum {
        if let Err(e) = verify_sidecar(downloader, &spec, &tmp_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    }

    match std::fs::rename(&tmp_path, dest) {
        Ok(()) => {}
        Err(_) if dest.is_file() => {
            let _ = std::fs::remove_file(&tmp_path);
        }
        Err(source) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(UtilError::Io {
                path: dest.display().to_string(),
                source,
            });
        }
    }

    Ok(ArtifactResult {
        path: dest.to_path_buf(),
        freshly_downloaded: true,
    })
}

/// A missing sidecar is accepted; an unreadable or mismatching one is not.
fn verify_sidecar(
    downloader: &Downloader,
    spec: &FetchSpec<'_>,
    file: &Path,
) -> Result<(), UtilError> {
    let sidecar_url = format!("{}.sha256", spec.url);
    let text = match downloader.fetch_text(&sidecar_url, spec.credentials) {
        Ok(text) => text,
        Err(e) if e.is_not_found() => {
            debug!(url = %sidecar_url, "no checksum published");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    match crate::hash::parse_checksum(&text) {
        Some(expected) => crate::hash::verify_file(file, &expected).map_err(|e| match e {
            UtilError::ChecksumMismatch {
                expected, actual, ..
            } => UtilError::ChecksumMismatch {
                path: spec.url.to_owned(),
                expected,
                actual,
            },
            other => other,
        }),
        None => {
            debug!(url = %sidecar_url, "checksum sidecar is not a sha256 digest, ignoring");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn spec(url: &str, verify: bool) -> FetchSpec<'_> {
        FetchSpec {
            url,
            credentials: None,
            verify_checksum: verify,
        }
    }

    #[test]
    fn existing_file_is_returned_without_download() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("lib-1.0.jar");
        fs::write(&dest, b"cached").unwrap();

        let result = ensure_artifact(
            &Downloader::new(),
            spec("http://unused.example.com/lib-1.0.jar", true),
            &dest,
            false,
        )
        .unwrap();
        assert!(!result.freshly_downloaded);
        assert_eq!(fs::read(&dest).unwrap(), b"cached");
    }

    #[test]
    fn downloads_from_file_remote() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = tmp.path().join("remote");
        fs::create_dir_all(&remote).unwrap();
        fs::write(remote.join("lib-1.0.jar"), b"remote").unwrap();

        let url = format!("file://{}/lib-1.0.jar", remote.display());
        let dest = tmp.path().join("local").join("lib-1.0.jar");
        let result = ensure_artifact(&Downloader::new(), spec(&url, true), &dest, false).unwrap();
        assert!(result.freshly_downloaded);
        assert_eq!(fs::read(&dest).unwrap(), b"remote");
    }

    #[test]
    fn refresh_replaces_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = tmp.path().join("lib-1.0-SNAPSHOT.jar");
        fs::write(&remote, b"new build").unwrap();
        let dest = tmp.path().join("local.jar");
        fs::write(&dest, b"old build").unwrap();

        let url = format!("file://{}", remote.display());
        ensure_artifact(&Downloader::new(), spec(&url, false), &dest, true).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new build");
    }

    #[test]
    fn checksum_mismatch_rejects_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = tmp.path().join("remote");
        fs::create_dir_all(&remote).unwrap();
        fs::write(remote.join("lib.jar"), b"tampered").unwrap();
        fs::write(
            remote.join("lib.jar.sha256"),
            crate::hash::sha256_bytes(b"original"),
        )
        .unwrap();

        let url = format!("file://{}/lib.jar", remote.display());
        let local = tmp.path().join("local");
        let err = ensure_artifact(
            &Downloader::new(),
            spec(&url, true),
            &local.join("lib.jar"),
            false,
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("checksum mismatch"), "error was: {err}");
        assert_eq!(fs::read_dir(&local).unwrap().count(), 0);
    }

    #[test]
    fn matching_checksum_is_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("lib.jar"), b"good").unwrap();
        fs::write(
            tmp.path().join("lib.jar.sha256"),
            format!("{}  lib.jar\n", crate::hash::sha256_bytes(b"good")),
        )
        .unwrap();

        let url = format!("file://{}/lib.jar", tmp.path().display());
        let dest = tmp.path().join("out").join("lib.jar");
        ensure_artifact(&Downloader::new(), spec(&url, true), &dest, false).unwrap();
        assert!(dest.is_file());
    }

    #[test]
    fn missing_remote_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let url = format!("file://{}/absent.jar", tmp.path().display());
        let err = ensure_artifact(
            &Downloader::new(),
            spec(&url, false),
            &tmp.path().join("dest.jar"),
            false,
        )
        .unwrap_err();
        assert!(err.is_not_found(), "error was: {err}");
    }
}
