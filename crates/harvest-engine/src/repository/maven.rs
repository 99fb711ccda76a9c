//! Maven repository client: local cache first, then remotes in order.
//!
//! Collection is breadth-first. With [`ConflictStrategy::Nearest`] the first
//! occurrence of a conflict key wins (shallowest depth, then declaration
//! order). With [`ConflictStrategy::Highest`] the walk is repeated with the
//! highest requested version of every key pinned, until no pin changes.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use harvest_config::manifest::{ConflictStrategy, Manifest, UpdatePolicy};
use harvest_util::artifact::{ensure_artifact, FetchSpec};
use harvest_util::coordinate::{ArtifactCoordinate, ModuleCoordinate};
use harvest_util::download::{Credentials, Downloader};
use harvest_util::error::UtilError;
use harvest_util::version::{Version, VersionConstraint};
use tracing::{debug, warn};

use super::metadata::{self, VersionListing};
use super::pom::{self, Exclusion, Pom};
use super::{
    CollectRequest, DependencyEdge, DependencyGraph, RepositoryClient, Resolution,
    ResolveError, ResolvedArtifact, Unresolved,
};
use crate::error::EngineError;

/// Parent/BOM chains deeper than this are cut off.
const MAX_DESCRIPTOR_DEPTH: usize = 16;

/// Upper bound on re-walks for the highest-version strategy.
const MAX_HIGHEST_ROUNDS: usize = 16;

/// A remote repository endpoint.
#[derive(Debug, Clone)]
pub struct Remote {
    /// Used to name cached metadata files.
    pub name: String,
    pub url: String,
    pub credentials: Option<Credentials>,
}

impl Remote {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_owned(),
            url: url.trim_end_matches('/').to_owned(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

/// `(group, artifact, classifier, extension)`
type ConflictKey = (String, String, Option<String>, String);

fn conflict_key(coordinate: &ArtifactCoordinate) -> ConflictKey {
    (
        coordinate.module.group.clone(),
        coordinate.module.artifact.clone(),
        coordinate.classifier.clone(),
        coordinate.extension.clone(),
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn transport(coordinate: &ArtifactCoordinate, error: &UtilError) -> ResolveError {
    ResolveError::Transport {
        coordinate: coordinate.to_string(),
        message: error.to_string(),
    }
}

/// Resolves against a local M2 directory and a list of remotes.
#[derive(Debug)]
pub struct MavenRepository {
    local: PathBuf,
    remotes: Vec<Remote>,
    descriptor_remotes: Mutex<Vec<Remote>>,
    policy: UpdatePolicy,
    ignore_descriptor_repositories: bool,
    verify_checksums: bool,
    strategy: ConflictStrategy,
    downloader: Downloader,
    poms: Mutex<HashMap<ModuleCoordinate, Option<Arc<Pom>>>>,
}

impl MavenRepository {
    pub fn new(local: PathBuf, remotes: Vec<Remote>) -> Self {
        Self {
            local,
            remotes,
            descriptor_remotes: Mutex::new(Vec::new()),
            policy: UpdatePolicy::Never,
            ignore_descriptor_repositories: true,
            verify_checksums: true,
            strategy: ConflictStrategy::Nearest,
            downloader: Downloader::new(),
            poms: Mutex::new(HashMap::new()),
        }
    }

    /// Build a client from the `[repository]` table.
    ///
    /// # Errors
    /// Returns an error if the local path cannot be determined or credentials
    /// reference unset environment variables.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, EngineError> {
        let config = &manifest.repository;
        let remotes = config
            .remote
            .iter()
            .map(|r| Ok(Remote::new(&r.name, &r.url).with_credentials(r.credentials()?)))
            .collect::<Result<Vec<_>, harvest_config::ManifestError>>()?;
        Ok(Self::new(config.local_path()?, remotes)
            .with_update_policy(config.update_policy)
            .with_conflict_strategy(config.conflict_strategy)
            .with_descriptor_repositories(!config.ignore_descriptor_repositories)
            .with_checksum_verification(config.verify_checksums))
    }

    pub fn with_update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Honour `<repositories>` declared inside POMs.
    pub fn with_descriptor_repositories(mut self, enabled: bool) -> Self {
        self.ignore_descriptor_repositories = !enabled;
        self
    }

    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    fn all_remotes(&self) -> Vec<Remote> {
        let mut remotes = self.remotes.clone();
        remotes.extend(lock(&self.descriptor_remotes).iter().cloned());
        remotes
    }

    fn add_descriptor_repositories(&self, urls: &[String]) {
        let mut extra = lock(&self.descriptor_remotes);
        for url in urls {
            let url = url.trim_end_matches('/');
            let known = self.remotes.iter().chain(extra.iter()).any(|r| r.url == url);
            if known || !(url.starts_with("http://") || url.starts_with("https://")) {
                continue;
            }
            let digest = harvest_util::hash::sha256_bytes(url.as_bytes());
            let name = format!("descriptor-{}", digest.get(..8).unwrap_or("0"));
            debug!(url, "adding repository declared by a POM");
            extra.push(Remote::new(&name, url));
        }
    }

    fn is_stale(&self, path: &Path) -> bool {
        let age = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        self.policy.is_stale(age)
    }

    /// Make `coordinate` present in the local repository and return its path.
    fn locate(&self, coordinate: &ArtifactCoordinate) -> Result<PathBuf, ResolveError> {
        let dest = coordinate.cache_path(&self.local);
        if coordinate.module.is_snapshot() {
            return self.locate_snapshot(coordinate, dest);
        }
        if dest.is_file() {
            return Ok(dest);
        }

        let mut failure = None;
        for remote in self.all_remotes() {
            let url = coordinate.to_url(&remote.url);
            let spec = FetchSpec {
                url: &url,
                credentials: remote.credentials.as_ref(),
                verify_checksum: self.verify_checksums,
            };
            match ensure_artifact(&self.downloader, spec, &dest, false) {
                Ok(result) => {
                    debug!(%coordinate, remote = %remote.name, "downloaded");
                    return Ok(result.path);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(%coordinate, remote = %remote.name, "{e}");
                    failure = Some(transport(coordinate, &e));
                }
            }
        }
        Err(failure.unwrap_or_else(|| ResolveError::not_found(coordinate)))
    }

    fn locate_snapshot(
        &self,
        coordinate: &ArtifactCoordinate,
        dest: PathBuf,
    ) -> Result<PathBuf, ResolveError> {
        let remotes = self.all_remotes();
        if dest.is_file() && (remotes.is_empty() || !self.is_stale(&dest)) {
            return Ok(dest);
        }

        let mut failure = None;
        for remote in remotes {
            let dir_url = format!("{}/{}", remote.url, coordinate.module.repository_dir());
            let file_version = match self
                .downloader
                .fetch_text(&format!("{dir_url}/maven-metadata.xml"), remote.credentials.as_ref())
            {
                Ok(text) => metadata::parse_snapshot(&text).ok().and_then(|listing| {
                    listing.file_version(
                        &coordinate.module.version,
                        coordinate.classifier.as_deref(),
                        &coordinate.extension,
                    )
                }),
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    warn!(%coordinate, remote = %remote.name, "{e}");
                    failure = Some(transport(coordinate, &e));
                    continue;
                }
            };
            let remote_name = coordinate
                .filename_for(file_version.as_deref().unwrap_or(&coordinate.module.version));
            let url = format!("{dir_url}/{remote_name}");
            let spec = FetchSpec {
                url: &url,
                credentials: remote.credentials.as_ref(),
                verify_checksum: self.verify_checksums,
            };
            match ensure_artifact(&self.downloader, spec, &dest, true) {
                Ok(result) => return Ok(result.path),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!(%coordinate, remote = %remote.name, "{e}");
                    failure = Some(transport(coordinate, &e));
                }
            }
        }

        if dest.is_file() {
            warn!(%coordinate, "could not refresh snapshot, using cached copy");
            return Ok(dest);
        }
        Err(failure.unwrap_or_else(|| ResolveError::not_found(coordinate)))
    }

    /// All known versions of `group:artifact`, from metadata and the local layout.
    fn version_listing(&self, module: &ModuleCoordinate) -> VersionListing {
        let module_dir = module.version_dir(&self.local);
        let module_dir = module_dir.parent().unwrap_or(&self.local).to_path_buf();
        let mut listing = VersionListing::default();

        let local_metadata = module_dir.join("maven-metadata-local.xml");
        if let Ok(text) = std::fs::read_to_string(&local_metadata) {
            if let Ok(found) = metadata::parse_versions(&text) {
                listing.merge(found);
            }
        }

        for remote in self.all_remotes() {
            let cached = module_dir.join(format!("maven-metadata-{}.xml", remote.name));
            if !cached.is_file() || self.is_stale(&cached) {
                let url = format!("{}/{}/maven-metadata.xml", remote.url, module.module_dir());
                match self.downloader.fetch_text(&url, remote.credentials.as_ref()) {
                    Ok(text) => {
                        if let Err(e) = harvest_util::fs::write_atomic(&cached, &text) {
                            warn!("{e}");
                        }
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => warn!(module = %module.module_key(), remote = %remote.name, "{e}"),
                }
            }
            if let Ok(text) = std::fs::read_to_string(&cached) {
                match metadata::parse_versions(&text) {
                    Ok(found) => listing.merge(found),
                    Err(e) => warn!(path = %cached.display(), "ignoring bad metadata: {e}"),
                }
            }
        }

        // Versions installed locally without metadata still count.
        if let Ok(entries) = std::fs::read_dir(&module_dir) {
            let mut local_versions: Vec<String> = entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_owned))
                .collect();
            local_versions.sort();
            listing.merge(VersionListing {
                versions: local_versions,
                ..VersionListing::default()
            });
        }
        listing
    }

    /// Turn a requested version string into a concrete version.
    fn concrete_version(
        &self,
        group: &str,
        artifact: &str,
        requested: &str,
    ) -> Result<String, ResolveError> {
        let display = format!("{group}:{artifact}:{requested}");
        let constraint = VersionConstraint::parse(requested)
            .map_err(|e| ResolveError::descriptor(&display, e))?;
        if let Some(version) = constraint.preferred() {
            return Ok(version.to_owned());
        }
        let listing = self.version_listing(&ModuleCoordinate::new(group, artifact, requested));
        constraint
            .select(listing.versions.iter().map(String::as_str))
            .map(str::to_owned)
            .ok_or(ResolveError::NotFound {
                coordinate: display,
            })
    }

    /// The effective POM of `module`, or `None` if it has no POM anywhere.
    fn effective_pom(
        &self,
        module: &ModuleCoordinate,
        depth: usize,
    ) -> Result<Option<Arc<Pom>>, ResolveError> {
        if let Some(cached) = lock(&self.poms).get(module) {
            return Ok(cached.clone());
        }

        let path = match self.locate(&module.pom()) {
            Ok(path) => path,
            Err(e) if e.is_not_found() => {
                warn!("POM file not found for {module}, treating it as having no dependencies");
                lock(&self.poms).insert(module.clone(), None);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let raw = pom::parse_pom(&text).map_err(|m| ResolveError::descriptor(module, m))?;

        let parent = match &raw.parent {
            Some(parent) if depth < MAX_DESCRIPTOR_DEPTH => {
                self.effective_pom(&parent.module(), depth + 1)?
            }
            Some(parent) => {
                warn!(%module, parent = %parent.module(), "parent chain too deep, ignoring parent");
                None
            }
            None => None,
        };
        let mut effective = Pom::from_raw(&raw, parent.as_deref());

        if depth < MAX_DESCRIPTOR_DEPTH {
            for bom in effective.imports() {
                if let Some(imported) = self.effective_pom(&bom, depth + 1)? {
                    effective.import_managed(&imported);
                }
            }
        }

        if !self.ignore_descriptor_repositories {
            self.add_descriptor_repositories(&effective.repositories);
        }

        let effective = Arc::new(effective);
        lock(&self.poms).insert(module.clone(), Some(Arc::clone(&effective)));
        Ok(Some(effective))
    }

    /// One breadth-first walk. `pins` force the version of a conflict key.
    fn walk(
        &self,
        request: &CollectRequest,
        pins: &HashMap<ConflictKey, String>,
    ) -> Result<Walk, ResolveError> {
        let mut queue: VecDeque<Pending> = request
            .roots
            .iter()
            .map(|root| Pending {
                coordinate: root.clone(),
                requested: root.module.version.clone(),
                parent: None,
                depth: 0,
                exclusions: Vec::new(),
            })
            .collect();

        let mut walk = Walk::default();
        let mut selected: HashMap<ConflictKey, String> = HashMap::new();
        let mut winners: Vec<ArtifactCoordinate> = Vec::new();

        while let Some(entry) = queue.pop_front() {
            let key = conflict_key(&entry.coordinate);
            let module = &entry.coordinate.module;
            let is_root = entry.depth == 0;

            let requested_version =
                match self.concrete_version(&module.group, &module.artifact, &entry.requested) {
                    Ok(v) => v,
                    Err(e) if is_root => return Err(e),
                    Err(e) => {
                        warn!(parent = ?entry.parent.as_ref().map(ToString::to_string), "{e}");
                        walk.unresolved.push(Unresolved {
                            coordinate: entry.coordinate.clone(),
                            error: e,
                        });
                        continue;
                    }
                };
            walk.requested
                .entry(key.clone())
                .or_default()
                .push(requested_version.clone());
            walk.edges
                .push((entry.parent.clone(), key.clone(), entry.requested.clone()));

            if selected.contains_key(&key) {
                continue;
            }
            let version = pins.get(&key).cloned().unwrap_or(requested_version);
            selected.insert(key, version.clone());
            let mut coordinate = entry.coordinate.with_version(&version);

            let pom = if request.transitive || !is_root {
                match self.effective_pom(&coordinate.module, 0) {
                    Ok(pom) => pom,
                    Err(e) if is_root => return Err(e),
                    Err(e) => {
                        warn!("{e}");
                        walk.unresolved.push(Unresolved { coordinate, error: e });
                        continue;
                    }
                }
            } else {
                None
            };

            // A jar dependency on a pom-packaged module resolves to the POM itself.
            if !is_root
                && coordinate.is_main()
                && coordinate.extension == "jar"
                && pom.as_ref().is_some_and(|p| p.packaging == "pom")
            {
                coordinate.extension = "pom".to_owned();
            }

            if is_root {
                let path = self.locate(&coordinate)?;
                walk.artifacts.push(ResolvedArtifact {
                    coordinate: coordinate.clone(),
                    path,
                });
            } else {
                winners.push(coordinate.clone());
            }

            if !request.transitive {
                continue;
            }
            let Some(pom) = pom else { continue };
            for dep in pom.dependencies() {
                if !dep.is_runtime() || dep.optional {
                    continue;
                }
                if entry
                    .exclusions
                    .iter()
                    .any(|e| e.matches(&dep.group, &dep.artifact))
                {
                    debug!(%coordinate, "excluding {}:{}", dep.group, dep.artifact);
                    continue;
                }
                let Some(requested) = dep.version.clone() else {
                    warn!(
                        "{} declares {}:{} without a version, skipping it",
                        coordinate.module, dep.group, dep.artifact
                    );
                    continue;
                };
                let mut exclusions = entry.exclusions.clone();
                exclusions.extend(dep.exclusions.iter().cloned());
                queue.push_back(Pending {
                    coordinate: dep.artifact_coordinate(&requested),
                    requested,
                    parent: Some(coordinate.module.clone()),
                    depth: entry.depth + 1,
                    exclusions,
                });
            }
        }

        walk.selected = selected;
        walk.winners = winners;
        Ok(walk)
    }

    /// Fetch the files of every non-root winner and assemble the result.
    fn finish(&self, walk: Walk) -> Resolution {
        let mut resolution = Resolution {
            artifacts: walk.artifacts,
            graph: DependencyGraph::default(),
            unresolved: walk.unresolved,
        };
        for coordinate in walk.winners {
            match self.locate(&coordinate) {
                Ok(path) => resolution
                    .artifacts
                    .push(ResolvedArtifact { coordinate, path }),
                Err(error) => {
                    warn!("failed to resolve {coordinate}: {error}");
                    resolution.unresolved.push(Unresolved { coordinate, error });
                }
            }
        }
        resolution.graph.edges = walk
            .edges
            .into_iter()
            .filter_map(|(parent, key, requested)| {
                let selected = walk.selected.get(&key)?.clone();
                Some(DependencyEdge {
                    parent,
                    group: key.0,
                    artifact: key.1,
                    requested,
                    selected,
                })
            })
            .collect();
        resolution
    }

    fn resolve_highest(&self, request: &CollectRequest) -> Result<Resolution, ResolveError> {
        let mut pins: HashMap<ConflictKey, String> = HashMap::new();
        for _ in 0..MAX_HIGHEST_ROUNDS {
            let walk = self.walk(request, &pins)?;
            let mut changed = false;
            for (key, versions) in &walk.requested {
                let Some(highest) = versions.iter().max_by_key(|v| Version::parse(v)) else {
                    continue;
                };
                let current = walk.selected.get(key);
                if current.is_some_and(|c| Version::parse(c) < Version::parse(highest)) {
                    pins.insert(key.clone(), highest.clone());
                    changed = true;
                }
            }
            if !changed {
                return Ok(self.finish(walk));
            }
        }
        warn!("highest-version selection did not settle, using the last walk");
        let walk = self.walk(request, &pins)?;
        Ok(self.finish(walk))
    }
}

struct Pending {
    coordinate: ArtifactCoordinate,
    requested: String,
    parent: Option<ModuleCoordinate>,
    depth: usize,
    exclusions: Vec<Exclusion>,
}

#[derive(Default)]
struct Walk {
    artifacts: Vec<ResolvedArtifact>,
    winners: Vec<ArtifactCoordinate>,
    edges: Vec<(Option<ModuleCoordinate>, ConflictKey, String)>,
    requested: HashMap<ConflictKey, Vec<String>>,
    selected: HashMap<ConflictKey, String>,
    unresolved: Vec<Unresolved>,
}

impl RepositoryClient for MavenRepository {
    fn resolve(&self, request: &CollectRequest) -> Result<Resolution, ResolveError> {
        match self.strategy {
            ConflictStrategy::Nearest => {
                let walk = self.walk(request, &HashMap::new())?;
                Ok(self.finish(walk))
            }
            ConflictStrategy::Highest => self.resolve_highest(request),
        }
    }

    fn local_repository(&self) -> &Path {
        &self.local
    }
}
