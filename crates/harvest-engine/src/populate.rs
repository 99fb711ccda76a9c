//! The `populate` run: resolve every dependency set, recover conflicting
//! versions, complete classifiers, then materialize the results.

use std::path::Path;

use harvest_config::manifest::{DependencySet, Manifest, ManifestError};
use harvest_util::coordinate::{ArtifactCoordinate, DEFAULT_EXTENSION};
use tracing::{info, warn};

use crate::artifact::{ArtifactStoreBuilder, CopySummary};
use crate::bundles::{build_bundle_set, write_bundle_set};
use crate::classifier::{ClassifierResolver, DependencyRequest, Failure, ResolutionRun};
use crate::conflict::ConflictExpander;
use crate::error::EngineError;
use crate::report::{write_deploy_script, write_report};
use crate::repository::{
    CollectRequest, DependencyGraph, MavenRepository, RepositoryClient, ResolvedArtifact,
};
use crate::snapshots::remove_snapshots;

/// What a populate run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateSummary {
    /// Dependency sets processed.
    pub sets: usize,
    /// Declared dependencies resolved (file dependencies excluded).
    pub dependencies: usize,
    /// Distinct files resolved into the local repository.
    pub artifacts: usize,
    /// Versions recovered by conflict expansion.
    pub conflicting_versions: usize,
    /// Files found by the transitive classifier pass.
    pub completed_classifiers: usize,
    /// Optional classifiers the repositories do not publish.
    pub benign_misses: usize,
    pub failures: Vec<Failure>,
    /// `None` when only the local repository was populated.
    pub copy: Option<CopySummary>,
    pub outside_repository: usize,
    pub bundles: usize,
    pub snapshots_removed: usize,
}

impl PopulateSummary {
    pub fn required_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.required).count()
    }
}

/// Validate `manifest`, build the Maven client it describes and run.
///
/// `only_sets` restricts the run to the named dependency sets; empty means all.
///
/// # Errors
/// Returns an error for an invalid configuration, an unknown set name, or,
/// in strict mode, any required artifact that could not be resolved.
pub fn populate(manifest: &Manifest, only_sets: &[String]) -> Result<PopulateSummary, EngineError> {
    manifest.validate()?;
    let client = MavenRepository::from_manifest(manifest)?;
    execute(manifest, &client, only_sets)
}

/// Like [`populate`], against any repository client.
///
/// # Errors
/// See [`populate`].
pub fn populate_with<C: RepositoryClient + ?Sized>(
    manifest: &Manifest,
    client: &C,
    only_sets: &[String],
) -> Result<PopulateSummary, EngineError> {
    manifest.validate()?;
    execute(manifest, client, only_sets)
}

fn select_sets<'m>(
    manifest: &'m Manifest,
    only_sets: &[String],
) -> Result<Vec<(&'m str, &'m DependencySet)>, EngineError> {
    if only_sets.is_empty() {
        return Ok(manifest
            .sets
            .iter()
            .map(|(name, set)| (name.as_str(), set))
            .collect());
    }
    only_sets
        .iter()
        .map(|name| {
            manifest
                .sets
                .get_key_value(name)
                .map(|(name, set)| (name.as_str(), set))
                .ok_or_else(|| EngineError::UnknownSet { name: name.clone() })
        })
        .collect()
}

fn dependency_requests(set: &DependencySet) -> Result<Vec<DependencyRequest>, EngineError> {
    let mut requests = Vec::with_capacity(set.dependencies.len());
    for spec in &set.dependencies {
        if spec.is_file_dependency() {
            info!(
                "skipping {}: file dependencies have no repository coordinate",
                spec.coordinate()
            );
            continue;
        }
        let module = spec.module()?;
        let request = match spec.explicit_artifacts()? {
            Some(artifacts) => DependencyRequest::explicit(module, artifacts),
            None => DependencyRequest::fallback(module),
        };
        requests.push(request);
    }
    Ok(requests)
}

/// Expand the combined graph of a set. Falls back to the per-dependency
/// graphs if the combined resolution fails.
fn expand_set<C: RepositoryClient + ?Sized>(
    client: &C,
    requests: &[DependencyRequest],
    per_dependency: DependencyGraph,
    run: &ResolutionRun,
) -> usize {
    let roots: Vec<ArtifactCoordinate> = requests.iter().flat_map(DependencyRequest::roots).collect();
    let request = CollectRequest {
        roots,
        transitive: true,
    };
    let graph = match client.resolve(&request) {
        Ok(resolution) => {
            run.record(&resolution.artifacts);
            run.record_unresolved(resolution.unresolved);
            resolution.graph
        }
        Err(e) => {
            warn!("cannot resolve the set as a whole, expanding each dependency separately: {e}");
            per_dependency
        }
    };

    let expansion = ConflictExpander::new(client).expand(&graph, &mut |artifact: &ResolvedArtifact| {
        run.record(std::slice::from_ref(artifact));
    });
    run.record_unresolved(expansion.failures);
    expansion.conflicts.len()
}

fn execute<C: RepositoryClient + ?Sized>(
    manifest: &Manifest,
    client: &C,
    only_sets: &[String],
) -> Result<PopulateSummary, EngineError> {
    let sets = select_sets(manifest, only_sets)?;
    let resolver = ClassifierResolver::new(client, &manifest.resolve.classifiers);
    let run = ResolutionRun::new();
    let mut summary = PopulateSummary {
        sets: sets.len(),
        ..PopulateSummary::default()
    };

    for (name, set) in &sets {
        let requests = dependency_requests(set)?;
        let total = requests.len();
        info!("resolving dependency set `{name}` ({total} dependencies)");

        let mut graph = DependencyGraph::default();
        for (index, request) in requests.iter().enumerate() {
            info!("[{}/{total}] {}", index + 1, request.module);
            let resolved = resolver.resolve(request, &run);
            graph.edges.extend(resolved.graph.edges);
        }
        summary.dependencies += total;

        if set.include_conflicting_versions {
            summary.conflicting_versions += expand_set(client, &requests, graph, &run);
        }
    }

    summary.completed_classifiers = resolver.complete_transitive(&run);
    summary.benign_misses = run.benign_misses();
    summary.failures = run.failures();

    let required = run.required_failures();
    if manifest.resolve.strict && !required.is_empty() {
        return Err(EngineError::Unresolved {
            count: required.len(),
            summary: required
                .iter()
                .map(|f| f.coordinate.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let artifacts = run.artifacts();
    summary.artifacts = artifacts.len();
    materialize(manifest, client.local_repository(), &artifacts, &mut summary)?;
    Ok(summary)
}

fn materialize(
    manifest: &Manifest,
    local: &Path,
    artifacts: &[ResolvedArtifact],
    summary: &mut PopulateSummary,
) -> Result<(), EngineError> {
    let output = &manifest.output;
    if output.populate_local_only {
        info!("populating the local repository only, nothing is copied");
    } else {
        let directory = output
            .directory
            .as_deref()
            .ok_or(ManifestError::MissingOutputDirectory)?;
        let mut builder = ArtifactStoreBuilder::new(local, directory);
        for artifact in artifacts {
            builder.add_artifact(artifact.clone());
        }
        let store = builder.finish();
        summary.copy = Some(store.copy_to_output());
        summary.outside_repository = store.outside_repository();

        if let Some(report) = &output.report {
            write_report(&store, report, &output.report_columns);
        }
        if let Some(script) = &output.deploy_script {
            write_deploy_script(&store, script);
        }
    }

    if let Some(dir) = &output.bundles {
        let bundles = build_bundle_set(artifacts);
        write_bundle_set(&bundles, dir);
        summary.bundles = bundles.len();
    }

    if output.remove_snapshots {
        summary.snapshots_removed = remove_snapshots(local, artifacts);
    }
    Ok(())
}

/// Files produced by resolving a single coordinate.
#[derive(Debug, Default)]
pub struct CoordinateResolution {
    pub artifacts: Vec<ResolvedArtifact>,
    pub failures: Vec<Failure>,
}

/// Resolve one coordinate with classifier fallback, without copying anything.
///
/// A coordinate naming a classifier or extension resolves exactly that file.
///
/// # Errors
/// Returns an error if the coordinate is malformed or the repository
/// configuration is unusable.
pub fn resolve_coordinate(
    manifest: &Manifest,
    coordinate: &str,
) -> Result<CoordinateResolution, EngineError> {
    manifest.validate_repository()?;
    let client = MavenRepository::from_manifest(manifest)?;
    resolve_coordinate_with(manifest, &client, coordinate)
}

/// Like [`resolve_coordinate`], against any repository client.
///
/// # Errors
/// Returns an error if the coordinate is malformed.
pub fn resolve_coordinate_with<C: RepositoryClient + ?Sized>(
    manifest: &Manifest,
    client: &C,
    coordinate: &str,
) -> Result<CoordinateResolution, EngineError> {
    let artifact = ArtifactCoordinate::parse(coordinate)?;
    let request = if artifact.is_main() && artifact.extension == DEFAULT_EXTENSION {
        DependencyRequest::fallback(artifact.module)
    } else {
        DependencyRequest::explicit(artifact.module.clone(), vec![artifact])
    };
    let run = ResolutionRun::new();
    ClassifierResolver::new(client, &manifest.resolve.classifiers).resolve(&request, &run);
    Ok(CoordinateResolution {
        artifacts: run.artifacts(),
        failures: run.failures(),
    })
}
