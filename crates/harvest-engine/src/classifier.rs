//! Classifier fallback resolution.
//!
//! A dependency without an explicit artifact list is resolved as its main jar
//! followed by each optional classifier (`sources`, `tests`, `javadoc` unless
//! configured otherwise). A missing optional classifier is not an error.
//! After all direct dependencies are done, [`ClassifierResolver::complete_transitive`]
//! repeats the optional classifiers for every module seen anywhere with a main jar.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use harvest_util::coordinate::{ArtifactCoordinate, ModuleCoordinate, DEFAULT_EXTENSION};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::repository::{
    CollectRequest, DependencyGraph, RepositoryClient, ResolveError, ResolvedArtifact, Unresolved,
};

/// One entry of a dependency set.
#[derive(Debug, Clone)]
pub struct DependencyRequest {
    pub module: ModuleCoordinate,
    /// Exact `(classifier, extension)` pairs to fetch; `None` means classifier fallback.
    pub artifacts: Option<Vec<ArtifactCoordinate>>,
}

impl DependencyRequest {
    pub fn fallback(module: ModuleCoordinate) -> Self {
        Self {
            module,
            artifacts: None,
        }
    }

    pub fn explicit(module: ModuleCoordinate, artifacts: Vec<ArtifactCoordinate>) -> Self {
        Self {
            module,
            artifacts: Some(artifacts),
        }
    }

    /// The artifacts that make up this dependency in a combined graph:
    /// the explicit list, or the main jar.
    pub fn roots(&self) -> Vec<ArtifactCoordinate> {
        match &self.artifacts {
            Some(explicit) => explicit.clone(),
            None => vec![self.module.main_jar()],
        }
    }
}

/// A coordinate that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub coordinate: ArtifactCoordinate,
    pub message: String,
    /// `false` for optional classifiers; only required failures fail a strict run.
    pub required: bool,
}

#[derive(Debug, Default)]
struct RunState {
    artifacts: BTreeMap<ArtifactCoordinate, PathBuf>,
    modules_with_main: BTreeSet<ModuleCoordinate>,
    attempted: BTreeSet<ArtifactCoordinate>,
    failures: BTreeMap<ArtifactCoordinate, Failure>,
    benign_misses: usize,
}

/// Accumulators owned by a single resolution run.
///
/// Shared by reference between the resolver, the conflict expander and the
/// parallel completion pass; every update takes the lock once.
#[derive(Debug, Default)]
pub struct ResolutionRun {
    state: Mutex<RunState>,
}

impl ResolutionRun {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record resolved files. Returns how many were not already known.
    pub fn record(&self, artifacts: &[ResolvedArtifact]) -> usize {
        let mut state = self.state();
        let mut added = 0;
        for artifact in artifacts {
            let coordinate = &artifact.coordinate;
            if coordinate.is_main() {
                state.modules_with_main.insert(coordinate.module.clone());
            }
            state.attempted.insert(coordinate.clone());
            state.failures.remove(coordinate);
            if state
                .artifacts
                .insert(coordinate.clone(), artifact.path.clone())
                .is_none()
            {
                added += 1;
            }
        }
        added
    }

    /// Record transitive members the client could not fetch.
    pub fn record_unresolved(&self, unresolved: Vec<Unresolved>) {
        for Unresolved { coordinate, error } in unresolved {
            self.record_failure(&coordinate, &error, true);
        }
    }

    fn record_failure(&self, coordinate: &ArtifactCoordinate, error: &ResolveError, required: bool) {
        let mut state = self.state();
        if state.artifacts.contains_key(coordinate) {
            return;
        }
        let failure = Failure {
            coordinate: coordinate.clone(),
            message: error.to_string(),
            required,
        };
        state
            .failures
            .entry(coordinate.clone())
            .and_modify(|existing| existing.required |= required)
            .or_insert(failure);
    }

    fn record_benign_miss(&self) {
        self.state().benign_misses += 1;
    }

    /// Mark a coordinate as tried. Returns `false` if it already was.
    fn mark_attempted(&self, coordinate: &ArtifactCoordinate) -> bool {
        self.state().attempted.insert(coordinate.clone())
    }

    fn was_attempted(&self, coordinate: &ArtifactCoordinate) -> bool {
        self.state().attempted.contains(coordinate)
    }

    /// Every file resolved so far, ordered by coordinate.
    pub fn artifacts(&self) -> Vec<ResolvedArtifact> {
        self.state()
            .artifacts
            .iter()
            .map(|(coordinate, path)| ResolvedArtifact {
                coordinate: coordinate.clone(),
                path: path.clone(),
            })
            .collect()
    }

    pub fn modules_with_main(&self) -> Vec<ModuleCoordinate> {
        self.state().modules_with_main.iter().cloned().collect()
    }

    pub fn failures(&self) -> Vec<Failure> {
        self.state().failures.values().cloned().collect()
    }

    pub fn required_failures(&self) -> Vec<Failure> {
        self.state()
            .failures
            .values()
            .filter(|f| f.required)
            .cloned()
            .collect()
    }

    /// Optional classifiers that the repositories do not have.
    pub fn benign_misses(&self) -> usize {
        self.state().benign_misses
    }
}

/// Files and graph produced for one dependency.
#[derive(Debug, Default)]
pub struct ResolvedDependency {
    pub artifacts: Vec<ResolvedArtifact>,
    pub graph: DependencyGraph,
}

/// Resolves dependencies with classifier fallback against a [`RepositoryClient`].
pub struct ClassifierResolver<'a, C: RepositoryClient + ?Sized> {
    client: &'a C,
    classifiers: Vec<String>,
}

impl<'a, C: RepositoryClient + ?Sized> ClassifierResolver<'a, C> {
    /// `classifiers` are the optional classifiers tried after the main jar.
    pub fn new(client: &'a C, classifiers: &[String]) -> Self {
        Self {
            client,
            classifiers: classifiers.to_vec(),
        }
    }

    fn is_optional(&self, coordinate: &ArtifactCoordinate) -> bool {
        coordinate
            .classifier
            .as_ref()
            .is_some_and(|c| self.classifiers.contains(c))
    }

    /// Resolve one dependency and its subtree. Failures are logged and
    /// recorded in `run`, never returned.
    pub fn resolve(&self, request: &DependencyRequest, run: &ResolutionRun) -> ResolvedDependency {
        let mut resolved = ResolvedDependency::default();
        match &request.artifacts {
            Some(explicit) => {
                for artifact in explicit {
                    let required = !self.is_optional(artifact);
                    self.attempt(artifact, required, true, run, &mut resolved);
                }
            }
            None => {
                self.attempt(&request.module.main_jar(), true, true, run, &mut resolved);
                for classifier in &self.classifiers {
                    let artifact = ArtifactCoordinate::new(
                        request.module.clone(),
                        Some(classifier),
                        DEFAULT_EXTENSION,
                    );
                    self.attempt(&artifact, false, true, run, &mut resolved);
                }
            }
        }
        resolved
    }

    fn attempt(
        &self,
        artifact: &ArtifactCoordinate,
        required: bool,
        transitive: bool,
        run: &ResolutionRun,
        resolved: &mut ResolvedDependency,
    ) {
        run.mark_attempted(artifact);
        let request = if transitive {
            CollectRequest::single(artifact.clone())
        } else {
            CollectRequest::artifact_only(artifact.clone())
        };
        match self.client.resolve(&request) {
            Ok(resolution) => {
                debug!(%artifact, files = resolution.artifacts.len(), "resolved");
                run.record(&resolution.artifacts);
                run.record_unresolved(resolution.unresolved);
                resolved.artifacts.extend(resolution.artifacts);
                resolved.graph.edges.extend(resolution.graph.edges);
            }
            Err(e) if e.is_not_found() && !required => {
                info!("{artifact} is not available, skipping it");
                run.record_benign_miss();
            }
            Err(e) => {
                warn!("Failed to resolve {artifact} (this artifact may be required): {e}");
                run.record_failure(artifact, &e, required);
            }
        }
    }

    /// Try the optional classifiers for every module seen with a main jar
    /// that has not been tried yet. Returns the number of new files.
    pub fn complete_transitive(&self, run: &ResolutionRun) -> usize {
        let pending: Vec<ArtifactCoordinate> = run
            .modules_with_main()
            .into_iter()
            .flat_map(|module| {
                self.classifiers.iter().map(move |classifier| {
                    ArtifactCoordinate::new(module.clone(), Some(classifier), DEFAULT_EXTENSION)
                })
            })
            .filter(|artifact| !run.was_attempted(artifact))
            .collect();
        if pending.is_empty() {
            return 0;
        }

        info!(
            "completing classifiers: {} candidate artifact(s)",
            pending.len()
        );
        pending
            .par_iter()
            .map(|artifact| {
                let mut resolved = ResolvedDependency::default();
                // Classifier files only: the module's dependencies were
                // already collected with its main jar.
                self.attempt(artifact, false, false, run, &mut resolved);
                resolved.artifacts.len()
            })
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::repository::MavenRepository;
    use crate::testutil::RepoBuilder;

    fn default_classifiers() -> Vec<String> {
        vec!["sources".to_owned(), "tests".to_owned(), "javadoc".to_owned()]
    }

    fn module(s: &str) -> ModuleCoordinate {
        ModuleCoordinate::parse(s).unwrap()
    }

    fn coordinates(run: &ResolutionRun) -> Vec<String> {
        run.artifacts()
            .iter()
            .map(|a| a.coordinate.to_string())
            .collect()
    }

    #[test]
    fn main_and_sources_without_tests_or_javadoc() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        repo.module("a:b:1.0", &[]);
        repo.jar("a:b:1.0:sources");

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        let resolved = resolver.resolve(&DependencyRequest::fallback(module("a:b:1.0")), &run);

        assert_eq!(resolved.artifacts.len(), 2);
        assert_eq!(
            coordinates(&run),
            vec!["a:b:1.0@jar", "a:b:1.0:sources@jar"]
        );
        assert!(run.failures().is_empty());
        assert_eq!(run.benign_misses(), 2);
    }

    #[test]
    fn missing_optional_classifiers_are_not_failures() {
        let tmp = tempfile::tempdir().unwrap();
        RepoBuilder::new(tmp.path()).module("a:b:1.0", &[]);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        resolver.resolve(&DependencyRequest::fallback(module("a:b:1.0")), &run);

        assert_eq!(coordinates(&run), vec!["a:b:1.0@jar"]);
        assert!(run.failures().is_empty());
    }

    #[test]
    fn missing_main_is_a_required_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        resolver.resolve(&DependencyRequest::fallback(module("gone:gone:1")), &run);

        let failures = run.required_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.first().unwrap().coordinate.to_string(), "gone:gone:1@jar");
        assert_eq!(run.benign_misses(), 3);
    }

    #[test]
    fn explicit_artifacts_are_resolved_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        repo.module("a:b:1.0", &[]);
        repo.jar("a:b:1.0:sources");
        repo.jar("a:b:1.0:natives@zip");

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        let m = module("a:b:1.0");
        let explicit = vec![
            ArtifactCoordinate::new(m.clone(), Some("natives"), "zip"),
            ArtifactCoordinate::new(m.clone(), Some("linux"), "so"),
        ];
        resolver.resolve(&DependencyRequest::explicit(m, explicit), &run);

        assert_eq!(coordinates(&run), vec!["a:b:1.0:natives@zip"]);
        let failures = run.required_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.first().unwrap().coordinate.to_string(), "a:b:1.0:linux@so");
    }

    #[test]
    fn explicit_optional_classifier_miss_is_benign() {
        let tmp = tempfile::tempdir().unwrap();
        RepoBuilder::new(tmp.path()).module("a:b:1.0", &[]);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        let m = module("a:b:1.0");
        let explicit = vec![
            m.main_jar(),
            ArtifactCoordinate::new(m.clone(), Some("sources"), "jar"),
        ];
        resolver.resolve(&DependencyRequest::explicit(m, explicit), &run);

        assert!(run.failures().is_empty());
        assert_eq!(run.benign_misses(), 1);
    }

    #[test]
    fn transitive_completion_finds_classifiers_of_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        repo.module("a:b:1.0", &["c:d:2.0"]);
        repo.module("c:d:2.0", &[]);
        repo.jar("c:d:2.0:sources");
        repo.jar("c:d:2.0:javadoc");

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        resolver.resolve(&DependencyRequest::fallback(module("a:b:1.0")), &run);
        assert_eq!(coordinates(&run), vec!["a:b:1.0@jar", "c:d:2.0@jar"]);

        let found = resolver.complete_transitive(&run);
        assert_eq!(found, 2);
        assert_eq!(
            coordinates(&run),
            vec![
                "a:b:1.0@jar",
                "c:d:2.0@jar",
                "c:d:2.0:javadoc@jar",
                "c:d:2.0:sources@jar"
            ]
        );
        // Everything was attempted; a second pass does nothing.
        assert_eq!(resolver.complete_transitive(&run), 0);
    }

    #[test]
    fn repository_errors_on_optional_classifiers_are_recorded_but_not_required() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        repo.jar("bad:pom:1");
        repo.pom_xml("bad:pom:1", "<project>");

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &default_classifiers());
        let run = ResolutionRun::new();
        resolver.resolve(&DependencyRequest::fallback(module("bad:pom:1")), &run);

        assert_eq!(run.failures().len(), 4);
        assert_eq!(run.required_failures().len(), 1);
    }

    #[test]
    fn unresolved_transitives_become_required_failures() {
        let tmp = tempfile::tempdir().unwrap();
        RepoBuilder::new(tmp.path()).module("a:b:1.0", &["gone:gone:1"]);

        let client = MavenRepository::new(tmp.path().to_path_buf(), Vec::new());
        let resolver = ClassifierResolver::new(&client, &[]);
        let run = ResolutionRun::new();
        resolver.resolve(&DependencyRequest::fallback(module("a:b:1.0")), &run);

        let failures = run.required_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures.first().unwrap().message.contains("gone:gone:1"));
    }
}
