//! Error types for harvest-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A transfer failed for a reason other than absence.
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// The remote (or `file://`) location does not hold the requested file.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// A coordinate string is malformed.
    #[error("invalid coordinate \"{coordinate}\": {reason}")]
    InvalidCoordinate { coordinate: String, reason: String },

    /// A version constraint could not be parsed.
    #[error("invalid version constraint \"{constraint}\": {reason}")]
    InvalidConstraint { constraint: String, reason: String },

    /// A downloaded file does not match its published checksum.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Cannot determine the user's home directory.
    #[error("cannot determine home directory, set the HOME environment variable")]
    NoHomeDir,
}

impl UtilError {
    /// Whether this error means "the file is simply not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
