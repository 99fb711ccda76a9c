#![forbid(unsafe_code)]
//! Coordinates, version ordering, filesystem helpers, hashing, and transfer for harvest.

pub mod artifact;
pub mod coordinate;
pub mod download;
pub mod error;
pub mod fs;
pub mod hash;
pub mod version;

pub use coordinate::{ArtifactCoordinate, ModuleCoordinate};
pub use error::UtilError;
pub use version::{Version, VersionConstraint};
