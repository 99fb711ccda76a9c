//! SHA-256 digests and published-checksum verification.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA-256 hex digest of a file using streaming reads.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn sha256_file(path: &Path) -> Result<String, UtilError> {
    let file = std::fs::File::open(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    std::io::copy(&mut reader, &mut hasher).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extract the digest from a published `.sha256` sidecar.
///
/// Repositories publish either the bare digest or `sha256sum` output
/// (`"<digest>  <filename>"`). Returns `None` if the first token is not a
/// 64-character hex string.
pub fn parse_checksum(text: &str) -> Option<String> {
    let token = text.split_whitespace().next()?;
    (token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}

/// Check that `path` hashes to `expected`.
///
/// # Errors
/// Returns `UtilError::ChecksumMismatch` on a mismatch, or an I/O error if
/// the file cannot be read.
pub fn verify_file(path: &Path, expected: &str) -> Result<(), UtilError> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(UtilError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_owned(),
            actual,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_bytes_empty() {
        assert_eq!(sha256_bytes(b""), EMPTY);
    }

    #[test]
    fn sha256_bytes_different_input() {
        assert_ne!(sha256_bytes(b"hello"), sha256_bytes(b"world"));
    }

    #[test]
    fn sha256_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib-1.0.jar");
        fs::write(&file, b"jar content").unwrap();
        assert_eq!(sha256_file(&file).unwrap(), sha256_bytes(b"jar content"));
    }

    #[test]
    fn sha256_file_missing() {
        assert!(sha256_file(Path::new("/nonexistent/path/file.jar")).is_err());
    }

    #[test]
    fn parse_checksum_accepts_bare_and_sha256sum_forms() {
        assert_eq!(parse_checksum(EMPTY).as_deref(), Some(EMPTY));
        let upper = format!("{}  lib-1.0.jar\n", EMPTY.to_ascii_uppercase());
        assert_eq!(parse_checksum(&upper).as_deref(), Some(EMPTY));
    }

    #[test]
    fn parse_checksum_rejects_garbage() {
        assert_eq!(parse_checksum(""), None);
        assert_eq!(parse_checksum("<html>404</html>"), None);
        assert_eq!(parse_checksum("abc123"), None);
    }

    #[test]
    fn verify_file_reports_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jar");
        fs::write(&file, b"x").unwrap();

        verify_file(&file, &sha256_bytes(b"x")).unwrap();
        let err = verify_file(&file, EMPTY).unwrap_err().to_string();
        assert!(err.contains("checksum mismatch"), "error was: {err}");
    }
}
