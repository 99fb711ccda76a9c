//! Conflict expansion: re-resolve every version that conflict resolution dropped.
//!
//! Each graph edge whose requested constraint does not accept the selected
//! version gets a detached resolution of `module@requested`. The detached
//! graph is expanded the same way, so overridden edges inside it are recovered too.

use std::collections::{HashSet, VecDeque};

use harvest_util::coordinate::ArtifactCoordinate;
use harvest_util::version::VersionConstraint;
use tracing::{debug, info, warn};

use crate::repository::{
    CollectRequest, DependencyEdge, DependencyGraph, RepositoryClient, ResolvedArtifact,
    Unresolved,
};

/// An edge whose requested version lost to another one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub edge: DependencyEdge,
    pub requested: String,
    pub selected: String,
}

#[derive(Debug, Default)]
pub struct Expansion {
    pub conflicts: Vec<ConflictRecord>,
    /// Detached resolutions (or members of them) that failed.
    pub failures: Vec<Unresolved>,
}

pub struct ConflictExpander<'a, C: RepositoryClient + ?Sized> {
    client: &'a C,
}

struct Walker<'v> {
    expanded: HashSet<(String, String, String)>,
    visited: HashSet<ArtifactCoordinate>,
    pending: VecDeque<DependencyGraph>,
    expansion: Expansion,
    visit: &'v mut dyn FnMut(&ResolvedArtifact),
}

impl<'a, C: RepositoryClient + ?Sized> ConflictExpander<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Walk `graph` and call `visit` once for every file of every recovered version.
    pub fn expand(
        &self,
        graph: &DependencyGraph,
        visit: &mut dyn FnMut(&ResolvedArtifact),
    ) -> Expansion {
        let mut walker = Walker {
            expanded: HashSet::new(),
            visited: HashSet::new(),
            pending: VecDeque::new(),
            expansion: Expansion::default(),
            visit,
        };
        self.expand_edges(&graph.edges, &mut walker);
        while let Some(detached) = walker.pending.pop_front() {
            self.expand_edges(&detached.edges, &mut walker);
        }
        if !walker.expansion.conflicts.is_empty() {
            info!(
                "recovered {} conflicting version(s)",
                walker.expansion.conflicts.len()
            );
        }
        walker.expansion
    }

    fn expand_edges(&self, edges: &[DependencyEdge], walker: &mut Walker<'_>) {
        for edge in edges {
            let constraint = match VersionConstraint::parse(&edge.requested) {
                Ok(constraint) => constraint,
                Err(e) => {
                    warn!("{e}");
                    continue;
                }
            };
            if constraint.accepts(&edge.selected) {
                continue;
            }
            let key = (
                edge.group.clone(),
                edge.artifact.clone(),
                edge.requested.clone(),
            );
            if !walker.expanded.insert(key) {
                continue;
            }

            debug!(
                module = %format_args!("{}:{}", edge.group, edge.artifact),
                requested = %edge.requested,
                selected = %edge.selected,
                "overridden by conflict resolution"
            );
            walker.expansion.conflicts.push(ConflictRecord {
                edge: edge.clone(),
                requested: edge.requested.clone(),
                selected: edge.selected.clone(),
            });

            let root = edge.requested_module().main_jar();
            match self.client.resolve(&CollectRequest::single(root.clone())) {
                Ok(resolution) => {
                    for artifact in &resolution.artifacts {
                        if walker.visited.insert(artifact.coordinate.clone()) {
                            (walker.visit)(artifact);
                        }
                    }
                    walker.expansion.failures.extend(resolution.unresolved);
                    walker.pending.push_back(resolution.graph);
                }
                Err(error) => {
                    warn!("Failed to resolve {root} (this artifact may be required): {error}");
                    walker.expansion.failures.push(Unresolved {
                        coordinate: root,
                        error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use harvest_config::manifest::ConflictStrategy;

    use super::*;
    use crate::repository::MavenRepository;
    use crate::testutil::RepoBuilder;

    fn resolve_graph(client: &MavenRepository, root: &str) -> DependencyGraph {
        client
            .resolve(&CollectRequest::single(
                ArtifactCoordinate::parse(root).unwrap(),
            ))
            .unwrap()
            .graph
    }

    fn expand_collect(client: &MavenRepository, graph: &DependencyGraph) -> (Vec<String>, Expansion) {
        let mut seen = Vec::new();
        let expansion = ConflictExpander::new(client)
            .expand(graph, &mut |artifact: &ResolvedArtifact| {
                seen.push(artifact.coordinate.to_string());
            });
        (seen, expansion)
    }

    fn diamond(repo: &RepoBuilder) {
        repo.module("app:app:1", &["x:x:1", "shared:lib:1.0"]);
        repo.module("x:x:1", &["shared:lib:2.0"]);
        repo.module("shared:lib:1.0", &[]);
        repo.module("shared:lib:2.0", &[]);
    }

    #[test]
    fn recovers_version_dropped_by_nearest_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        diamond(&repo);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let graph = resolve_graph(&client, "app:app:1");
        let (seen, expansion) = expand_collect(&client, &graph);

        assert_eq!(seen, vec!["shared:lib:2.0@jar"]);
        assert_eq!(expansion.conflicts.len(), 1);
        let record = expansion.conflicts.first().unwrap();
        assert_eq!(record.requested, "2.0");
        assert_eq!(record.selected, "1.0");
        assert!(expansion.failures.is_empty());
    }

    #[test]
    fn recovers_direct_version_dropped_by_highest_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        diamond(&repo);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new())
            .with_conflict_strategy(ConflictStrategy::Highest);
        let graph = resolve_graph(&client, "app:app:1");
        let (seen, _) = expand_collect(&client, &graph);
        assert_eq!(seen, vec!["shared:lib:1.0@jar"]);
    }

    #[test]
    fn expansion_recurses_into_detached_graphs() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        repo.module("app:app:1", &["lib:lib:1", "x:x:1"]);
        repo.module("x:x:1", &["lib:lib:2"]);
        repo.module("lib:lib:1", &[]);
        // Inside lib 2 the first-declared path wins z 1, so z 2 needs a second expansion.
        repo.module("lib:lib:2", &["m:m:1", "n:n:1"]);
        repo.module("m:m:1", &["z:z:1"]);
        repo.module("n:n:1", &["z:z:2"]);
        repo.module("z:z:1", &[]);
        repo.module("z:z:2", &[]);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let graph = resolve_graph(&client, "app:app:1");
        let (seen, expansion) = expand_collect(&client, &graph);

        assert_eq!(expansion.conflicts.len(), 2);
        assert!(seen.contains(&"lib:lib:2@jar".to_owned()));
        assert!(seen.contains(&"z:z:2@jar".to_owned()));
        // Each file is visited once.
        let mut deduped = seen.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), seen.len());
    }

    #[test]
    fn graph_without_conflicts_visits_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        repo.module("a:a:1", &["b:b:1"]);
        repo.module("b:b:1", &[]);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let graph = resolve_graph(&client, "a:a:1");
        let (seen, expansion) = expand_collect(&client, &graph);
        assert!(seen.is_empty());
        assert!(expansion.conflicts.is_empty());
    }

    #[test]
    fn range_satisfied_by_selection_is_not_a_conflict() {
        let edge = DependencyEdge {
            parent: None,
            group: "a".to_owned(),
            artifact: "b".to_owned(),
            requested: "[1.0,2.0)".to_owned(),
            selected: "1.5".to_owned(),
        };
        let graph = DependencyGraph { edges: vec![edge] };
        let tmp = tempfile::tempdir().unwrap();
        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let (seen, expansion) = expand_collect(&client, &graph);
        assert!(seen.is_empty());
        assert!(expansion.conflicts.is_empty());
    }

    #[test]
    fn missing_requested_version_is_reported() {
        let edge = DependencyEdge {
            parent: None,
            group: "a".to_owned(),
            artifact: "b".to_owned(),
            requested: "0.9".to_owned(),
            selected: "1.0".to_owned(),
        };
        let graph = DependencyGraph { edges: vec![edge] };
        let tmp = tempfile::tempdir().unwrap();
        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let (seen, expansion) = expand_collect(&client, &graph);
        assert!(seen.is_empty());
        assert_eq!(expansion.failures.len(), 1);
        assert!(expansion.failures.first().unwrap().error.is_not_found());
    }
}
