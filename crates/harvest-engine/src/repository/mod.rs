//! The repository-resolution capability and the Maven implementation of it.
//!
//! Everything above this module talks to a [`RepositoryClient`]: hand it a
//! [`CollectRequest`], get back the resolved files plus the dependency graph
//! with per-edge requested/selected versions, or an explicit [`ResolveError`].

pub mod maven;
pub mod metadata;
pub mod pom;

use std::path::{Path, PathBuf};

use harvest_util::coordinate::{ArtifactCoordinate, ModuleCoordinate};

pub use crate::error::ResolveError;
pub use maven::MavenRepository;

/// One file produced by a resolution, present in the local repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedArtifact {
    pub coordinate: ArtifactCoordinate,
    pub path: PathBuf,
}

/// What to resolve.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    /// Root artifacts. Their versions may be ranges or dynamic selectors.
    pub roots: Vec<ArtifactCoordinate>,
    /// Also resolve every dependency in the roots' subtrees.
    pub transitive: bool,
}

impl CollectRequest {
    /// A transitive request for a single root.
    pub fn single(root: ArtifactCoordinate) -> Self {
        Self {
            roots: vec![root],
            transitive: true,
        }
    }

    /// Only the given file, no dependencies.
    pub fn artifact_only(root: ArtifactCoordinate) -> Self {
        Self {
            roots: vec![root],
            transitive: false,
        }
    }
}

/// One edge of the resolved graph.
///
/// `parent` is `None` for edges from the request itself to a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub parent: Option<ModuleCoordinate>,
    pub group: String,
    pub artifact: String,
    /// The version string the edge asked for, possibly a range.
    pub requested: String,
    /// The version conflict resolution settled on for this module.
    pub selected: String,
}

impl DependencyEdge {
    pub fn requested_module(&self) -> ModuleCoordinate {
        ModuleCoordinate::new(&self.group, &self.artifact, &self.requested)
    }

    pub fn selected_module(&self) -> ModuleCoordinate {
        ModuleCoordinate::new(&self.group, &self.artifact, &self.selected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    pub edges: Vec<DependencyEdge>,
}

/// A transitive member of the graph that could not be fetched.
///
/// Roots never end up here: a missing root fails the whole request.
#[derive(Debug)]
pub struct Unresolved {
    pub coordinate: ArtifactCoordinate,
    pub error: ResolveError,
}

/// Result of one collect-and-resolve pass.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Roots first, then dependencies in breadth-first order.
    pub artifacts: Vec<ResolvedArtifact>,
    pub graph: DependencyGraph,
    pub unresolved: Vec<Unresolved>,
}

/// Resolves coordinates against some repository system.
///
/// Implementations must be shareable across threads: independent requests
/// are issued in parallel.
pub trait RepositoryClient: Sync {
    /// Collect and resolve `request`.
    ///
    /// # Errors
    /// Returns `ResolveError::NotFound` when a root does not exist in any
    /// repository, or another variant when a root cannot be resolved for any
    /// other reason.
    fn resolve(&self, request: &CollectRequest) -> Result<Resolution, ResolveError>;

    /// Root of the local repository the resolved files live in.
    fn local_repository(&self) -> &Path;
}
