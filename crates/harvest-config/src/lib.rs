//! Parse and validate `harvest.toml`.

pub mod manifest;

pub use manifest::{
    ConflictStrategy, DependencySet, DependencySpec, Manifest, ManifestError, RemoteRepository,
    ReportColumn, UpdatePolicy,
};
