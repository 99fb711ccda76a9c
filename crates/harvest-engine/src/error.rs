//! Error types for harvest-engine.

use harvest_util::coordinate::ArtifactCoordinate;

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] harvest_util::error::UtilError),

    /// The configuration is unusable.
    #[error("{0}")]
    Manifest(#[from] harvest_config::manifest::ManifestError),

    /// A dependency set named on the command line does not exist.
    #[error("no dependency set named `{name}` in harvest.toml")]
    UnknownSet { name: String },

    /// Strict mode: required artifacts could not be resolved.
    #[error("{count} required artifact(s) could not be resolved: {summary}")]
    Unresolved { count: usize, summary: String },

    /// Resolving a single coordinate failed.
    #[error("{0}")]
    Resolve(#[from] ResolveError),
}

/// Outcome of a failed repository request.
///
/// `NotFound` is the benign case: the repository answered and the file is not
/// there. Everything else is a real failure.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{coordinate} not found in any repository")]
    NotFound { coordinate: String },

    #[error("cannot fetch {coordinate}: {message}")]
    Transport { coordinate: String, message: String },

    #[error("bad descriptor for {coordinate}: {message}")]
    Descriptor { coordinate: String, message: String },

    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub(crate) fn not_found(coordinate: &ArtifactCoordinate) -> Self {
        Self::NotFound {
            coordinate: coordinate.to_string(),
        }
    }

    pub(crate) fn descriptor(coordinate: impl ToString, message: impl ToString) -> Self {
        Self::Descriptor {
            coordinate: coordinate.to_string(),
            message: message.to_string(),
        }
    }
}
