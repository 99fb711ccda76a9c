//! Dependency harvesting for Harvest: Maven resolution with classifier
//! fallback, conflict-version recovery, and materialization into an output
//! tree, report, deploy script and OSGi bundle set.
#![forbid(unsafe_code)]

pub mod artifact;
pub mod bundles;
pub mod classifier;
pub mod conflict;
pub mod error;
pub mod osgi;
pub mod populate;
pub mod report;
pub mod repository;
pub mod snapshots;

#[cfg(test)]
mod testutil;

pub use artifact::{ArtifactStore, ArtifactStoreBuilder, CopySummary};
pub use error::{EngineError, ResolveError};
pub use osgi::{inspect_file, BundleDescriptor};
pub use populate::{populate, resolve_coordinate, CoordinateResolution, PopulateSummary};
pub use repository::{MavenRepository, RepositoryClient, ResolvedArtifact};
