//! Flat, collision-free bundle directory for an OSGi runtime distribution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use harvest_util::coordinate::ArtifactCoordinate;
use harvest_util::fs::{copy_if_absent, CopyOutcome};
use tracing::{error, info};

use crate::osgi::{inspect_artifact, BundleDescriptor};
use crate::repository::ResolvedArtifact;

/// A compliant artifact and the name it gets in the bundle directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub file_name: String,
    pub source: PathBuf,
    pub coordinate: ArtifactCoordinate,
    pub descriptor: BundleDescriptor,
}

/// `<group>.<artifact>-<version>[-<classifier>].<extension>`
pub fn bundle_file_name(coordinate: &ArtifactCoordinate) -> String {
    let module = &coordinate.module;
    let mut name = format!("{}.{}-{}", module.group, module.artifact, module.version);
    if let Some(classifier) = &coordinate.classifier {
        name.push('-');
        name.push_str(classifier);
    }
    name.push('.');
    name.push_str(&coordinate.extension);
    name
}

/// Keep the OSGi-compliant artifacts, renamed. Sorted by file name; the same
/// file name is only kept once.
pub fn build_bundle_set(artifacts: &[ResolvedArtifact]) -> Vec<Bundle> {
    let mut bundles: BTreeMap<String, Bundle> = BTreeMap::new();
    for artifact in artifacts {
        let file_name = bundle_file_name(&artifact.coordinate);
        if bundles.contains_key(&file_name) {
            continue;
        }
        let descriptor = inspect_artifact(artifact);
        if !descriptor.compliant {
            info!(
                "Excluding '{}': not an OSGi bundle",
                artifact.coordinate.module
            );
            continue;
        }
        bundles.insert(
            file_name.clone(),
            Bundle {
                file_name,
                source: artifact.path.clone(),
                coordinate: artifact.coordinate.clone(),
                descriptor,
            },
        );
    }
    bundles.into_values().collect()
}

/// Copy `bundles` into `dir`. Returns how many files were newly written.
/// Failures are logged per file.
pub fn write_bundle_set(bundles: &[Bundle], dir: &Path) -> usize {
    let mut written = 0;
    for bundle in bundles {
        match copy_if_absent(&bundle.source, &dir.join(&bundle.file_name)) {
            Ok(CopyOutcome::Copied) => written += 1,
            Ok(CopyOutcome::AlreadyPresent) => {}
            Err(e) => error!("{e}"),
        }
    }
    written
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testutil::RepoBuilder;

    fn artifact(path: PathBuf, coord: &str) -> ResolvedArtifact {
        ResolvedArtifact {
            coordinate: ArtifactCoordinate::parse(coord).unwrap(),
            path,
        }
    }

    #[test]
    fn file_names_include_group_and_classifier() {
        let main = ArtifactCoordinate::parse("org.example:lib:1.0").unwrap();
        assert_eq!(bundle_file_name(&main), "org.example.lib-1.0.jar");
        let sources = ArtifactCoordinate::parse("org.example:lib:1.0:sources").unwrap();
        assert_eq!(bundle_file_name(&sources), "org.example.lib-1.0-sources.jar");
        let zip = ArtifactCoordinate::parse("org.example:lib:1.0@zip").unwrap();
        assert_eq!(bundle_file_name(&zip), "org.example.lib-1.0.zip");
    }

    #[test]
    fn keeps_only_compliant_artifacts_and_both_versions() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(tmp.path());
        let v1 = repo.bundle("org.example:lib:1.0", "org.example.lib", Some("1.0"));
        let v2 = repo.bundle("org.example:lib:2.0", "org.example.lib", Some("2.0"));
        let plain = repo.jar("org.example:plain:1.0");
        let api = repo.bundle("org.osgi:osgi.core:6.0.0", "osgi.core", None);

        let bundles = build_bundle_set(&[
            artifact(v2, "org.example:lib:2.0"),
            artifact(plain, "org.example:plain:1.0"),
            artifact(v1.clone(), "org.example:lib:1.0"),
            artifact(api, "org.osgi:osgi.core:6.0.0"),
            artifact(v1, "org.example:lib:1.0"),
        ]);
        let names: Vec<&str> = bundles.iter().map(|b| b.file_name.as_str()).collect();
        assert_eq!(names, vec!["org.example.lib-1.0.jar", "org.example.lib-2.0.jar"]);
        assert_eq!(bundles.first().unwrap().descriptor.version, "1.0");
    }

    #[test]
    fn write_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = RepoBuilder::new(&tmp.path().join("repo"));
        let path = repo.bundle("a:b:1", "a.b", None);
        let bundles = build_bundle_set(&[artifact(path.clone(), "a:b:1")]);
        let dir = tmp.path().join("bundles");

        assert_eq!(write_bundle_set(&bundles, &dir), 1);
        assert_eq!(write_bundle_set(&bundles, &dir), 0);
        assert_eq!(
            std::fs::read(dir.join("a.b-1.jar")).unwrap(),
            std::fs::read(path).unwrap()
        );
    }
}
