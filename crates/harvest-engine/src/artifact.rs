//! Artifact grouping and materialization into the output directory.
//!
//! Resolved files are grouped by module (`group:artifact:version`). Each group
//! has at most one main artifact, any number of additional classifier
//! artifacts, and the POM found next to them on disk. The finished
//! [`ArtifactStore`] is read-only and copies every added file, plus the POMs
//! beside it, into an M2-layout output directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use harvest_util::coordinate::{ModuleCoordinate, DEFAULT_EXTENSION};
use harvest_util::fs::{absolute, copy_if_absent, files_with_extension, CopyOutcome};
use rayon::prelude::*;
use tracing::{debug, error, warn};

use crate::repository::ResolvedArtifact;

/// All files of one module version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactGroup {
    module: ModuleCoordinate,
    main: Option<ResolvedArtifact>,
    /// Sorted by classifier then extension, never contains the main artifact.
    additional: Vec<ResolvedArtifact>,
    pom: Option<PathBuf>,
}

impl ArtifactGroup {
    fn new(module: ModuleCoordinate) -> Self {
        Self {
            module,
            main: None,
            additional: Vec::new(),
            pom: None,
        }
    }

    fn add(&mut self, artifact: ResolvedArtifact) {
        if artifact.coordinate.is_main() {
            self.set_main(artifact);
            return;
        }
        let position = self
            .additional
            .binary_search_by(|a| a.coordinate.cmp(&artifact.coordinate));
        match position {
            Ok(index) => {
                if let Some(slot) = self.additional.get_mut(index) {
                    *slot = artifact;
                }
            }
            Err(index) => self.additional.insert(index, artifact),
        }
    }

    /// A jar wins over other unclassified extensions, then the smallest
    /// coordinate. The loser is still copied but not reported.
    fn set_main(&mut self, artifact: ResolvedArtifact) {
        let rank = |a: &ResolvedArtifact| (a.coordinate.extension != DEFAULT_EXTENSION, a.coordinate.clone());
        match self.main.take() {
            None => self.main = Some(artifact),
            Some(current) if current.coordinate == artifact.coordinate => self.main = Some(artifact),
            Some(current) => {
                let (kept, dropped) = if rank(&artifact) < rank(&current) {
                    (artifact, current)
                } else {
                    (current, artifact)
                };
                warn!(
                    "{} has more than one unclassified artifact, reporting {} and only copying {}",
                    self.module, kept.coordinate, dropped.coordinate
                );
                self.main = Some(kept);
            }
        }
    }

    pub fn module(&self) -> &ModuleCoordinate {
        &self.module
    }

    pub fn main(&self) -> Option<&ResolvedArtifact> {
        self.main.as_ref()
    }

    pub fn additional(&self) -> &[ResolvedArtifact] {
        &self.additional
    }

    pub fn pom(&self) -> Option<&Path> {
        self.pom.as_deref()
    }

    pub fn has_other_classifiers(&self) -> bool {
        !self.additional.is_empty()
    }

    /// Every file in the group, main first.
    pub fn files(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.main.iter().chain(self.additional.iter())
    }
}

/// Accumulates resolved artifacts during one run.
#[derive(Debug)]
pub struct ArtifactStoreBuilder {
    local: PathBuf,
    output: PathBuf,
    groups: BTreeMap<ModuleCoordinate, ArtifactGroup>,
    /// Every added file and every POM beside one; what gets copied.
    files: BTreeSet<PathBuf>,
    outside: BTreeSet<PathBuf>,
}

impl ArtifactStoreBuilder {
    /// `local` is the repository the files were resolved into, `output` the
    /// directory they are copied to. Relative paths are taken against the
    /// current directory.
    pub fn new(local: &Path, output: &Path) -> Self {
        Self {
            local: absolute(local),
            output: absolute(output),
            groups: BTreeMap::new(),
            files: BTreeSet::new(),
            outside: BTreeSet::new(),
        }
    }

    /// Add one file with an already known POM (or none).
    ///
    /// Files that do not live inside the local repository are left out.
    pub fn add_result(&mut self, mut artifact: ResolvedArtifact, pom: Option<PathBuf>) {
        artifact.path = absolute(&artifact.path);
        let pom = pom.map(|p| absolute(&p));
        if !is_inside(&artifact.path, &self.local) {
            debug!(path = %artifact.path.display(), "outside the local repository, skipping");
            self.outside.insert(artifact.path);
            return;
        }
        self.files.insert(artifact.path.clone());
        self.files.extend(pom.iter().cloned());
        let module = artifact.coordinate.module.clone();
        let group = self
            .groups
            .entry(module.clone())
            .or_insert_with(|| ArtifactGroup::new(module));
        if group.pom.is_none() {
            group.pom = pom;
        }
        group.add(artifact);
    }

    /// Add one file, locating its POM among the sibling files. Every sibling
    /// POM is copied along with it.
    pub fn add_artifact(&mut self, artifact: ResolvedArtifact) {
        let siblings = sibling_poms(&artifact);
        let pom = choose_pom(&artifact, &siblings);
        if is_inside(&absolute(&artifact.path), &self.local) {
            self.files.extend(siblings.into_iter().map(|p| absolute(&p)));
        }
        self.add_result(artifact, pom);
    }

    pub fn finish(self) -> ArtifactStore {
        let groups: Vec<ArtifactGroup> = self.groups.into_values().collect();
        for group in &groups {
            if group.pom.is_none() {
                warn!(
                    "POM file not found for {}, artifact will not be included in reports or scripts.",
                    group.module
                );
            }
        }
        ArtifactStore {
            local: self.local,
            output: self.output,
            groups,
            files: self.files,
            outside: self.outside.len(),
        }
    }
}

fn sibling_poms(artifact: &ResolvedArtifact) -> Vec<PathBuf> {
    let Some(dir) = artifact.path.parent() else {
        return Vec::new();
    };
    files_with_extension(dir, "pom").unwrap_or_else(|e| {
        warn!("{e}");
        Vec::new()
    })
}

/// `artifact-version.pom` among `candidates` if present, else the first one.
fn choose_pom(artifact: &ResolvedArtifact, candidates: &[PathBuf]) -> Option<PathBuf> {
    let expected = artifact
        .path
        .parent()?
        .join(artifact.coordinate.module.pom().filename());
    if candidates.contains(&expected) {
        return Some(expected);
    }
    candidates.first().cloned()
}

fn is_inside(path: &Path, root: &Path) -> bool {
    harvest_util::fs::relative_to(path, root)
        .is_some_and(|rel| !harvest_util::fs::has_parent_segment(&rel))
}

/// What [`ArtifactStore::copy_to_output`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub copied: usize,
    pub already_present: usize,
    pub failed: usize,
}

/// Read-only view of the grouped artifacts of a finished run.
#[derive(Debug)]
pub struct ArtifactStore {
    local: PathBuf,
    output: PathBuf,
    groups: Vec<ArtifactGroup>,
    files: BTreeSet<PathBuf>,
    outside: usize,
}

impl ArtifactStore {
    /// Groups ordered by module coordinate.
    pub fn groups(&self) -> &[ArtifactGroup] {
        &self.groups
    }

    /// Groups that can appear in reports and scripts: a main artifact and a POM.
    pub fn reportable(&self) -> impl Iterator<Item = &ArtifactGroup> {
        self.groups
            .iter()
            .filter(|g| g.main.is_some() && g.pom.is_some())
    }

    /// Files skipped because they are not inside the local repository.
    pub fn outside_repository(&self) -> usize {
        self.outside
    }

    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Where a local-repository file lands in the output directory.
    pub fn output_path(&self, path: &Path) -> Option<PathBuf> {
        let relative = harvest_util::fs::relative_to(&absolute(path), &self.local)?;
        if harvest_util::fs::has_parent_segment(&relative) {
            return None;
        }
        Some(self.output.join(relative))
    }

    /// The output copy of `path`, relative to the directory holding `consumer`,
    /// with `/` separators.
    pub fn consumer_relative(&self, path: &Path, consumer: &Path) -> Option<String> {
        let target = self.output_path(path)?;
        let consumer = absolute(consumer);
        let base = consumer.parent().unwrap_or_else(|| Path::new("/"));
        let relative = harvest_util::fs::relative_to(&target, base)?;
        Some(harvest_util::fs::to_portable(&relative))
    }

    /// Copy every added file and the POMs beside it into the output directory.
    ///
    /// Existing destinations are left alone; a failed copy is logged and the
    /// remaining files are still copied.
    pub fn copy_to_output(&self) -> CopySummary {
        let outcomes: Vec<Option<CopyOutcome>> = self
            .files
            .par_iter()
            .map(|src| {
                let dest = self.output_path(src)?;
                match copy_if_absent(src, &dest) {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        error!("{e}");
                        None
                    }
                }
            })
            .collect();

        let mut summary = CopySummary::default();
        for outcome in outcomes {
            match outcome {
                Some(CopyOutcome::Copied) => summary.copied += 1,
                Some(CopyOutcome::AlreadyPresent) => summary.already_present += 1,
                None => summary.failed += 1,
            }
        }
        debug!(
            copied = summary.copied,
            present = summary.already_present,
            failed = summary.failed,
            "copied artifacts to {}",
            self.output.display()
        );
        summary
    }
}
