//! Remove resolved `-SNAPSHOT` versions from the local repository.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use harvest_util::fs::remove_dir_all_if_exists;
use tracing::{debug, error};

use crate::repository::ResolvedArtifact;

/// Delete the version directory of every snapshot artifact that lives in
/// `local`. Returns the number of directories removed.
pub fn remove_snapshots(local: &Path, artifacts: &[ResolvedArtifact]) -> usize {
    let dirs: BTreeSet<PathBuf> = artifacts
        .iter()
        .filter(|a| a.coordinate.module.is_snapshot())
        .filter_map(|a| a.path.parent().map(Path::to_path_buf))
        .filter(|dir| dir.starts_with(local) && dir != local)
        .collect();

    let mut removed = 0;
    for dir in dirs {
        match remove_dir_all_if_exists(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "removed snapshot");
                removed += 1;
            }
            Err(e) => error!("{e}"),
        }
    }
    removed
}
