//! `maven-metadata.xml` parsing: version listings and snapshot build numbers.

/// Module-level metadata (`group/artifact/maven-metadata.xml`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionListing {
    pub versions: Vec<String>,
    pub release: Option<String>,
    pub latest: Option<String>,
}

impl VersionListing {
    /// Add versions from another repository's listing, keeping first-seen order.
    pub fn merge(&mut self, other: VersionListing) {
        for version in other.versions {
            if !self.versions.contains(&version) {
                self.versions.push(version);
            }
        }
        self.release = self.release.take().or(other.release);
        self.latest = self.latest.take().or(other.latest);
    }
}

/// One `<snapshotVersion>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: String,
    pub value: String,
}

/// Version-level metadata of a `-SNAPSHOT` (`group/artifact/1.0-SNAPSHOT/maven-metadata.xml`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotListing {
    pub timestamp: Option<String>,
    pub build_number: Option<String>,
    pub snapshot_versions: Vec<SnapshotVersion>,
}

impl SnapshotListing {
    /// The version string used in the remote file name, e.g.
    /// `1.0-20240101.101010-3`. `None` means the plain `-SNAPSHOT` name.
    pub fn file_version(
        &self,
        base_version: &str,
        classifier: Option<&str>,
        extension: &str,
    ) -> Option<String> {
        let exact = self
            .snapshot_versions
            .iter()
            .find(|sv| sv.classifier.as_deref() == classifier && sv.extension == extension);
        if let Some(sv) = exact {
            return Some(sv.value.clone());
        }
        match (&self.timestamp, &self.build_number) {
            (Some(ts), Some(build)) => {
                let stem = base_version.strip_suffix("-SNAPSHOT").unwrap_or(base_version);
                Some(format!("{stem}-{ts}-{build}"))
            }
            _ => None,
        }
    }
}

fn doc_versioning<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> Result<Option<roxmltree::Node<'a, 'input>>, String> {
    let root = doc.root_element();
    if root.tag_name().name() != "metadata" {
        return Err(format!(
            "expected <metadata> root element, found <{}>",
            root.tag_name().name()
        ));
    }
    Ok(root
        .children()
        .find(|n| n.is_element() && n.has_tag_name("versioning")))
}

fn text_of(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// Parse module-level metadata.
///
/// # Errors
/// Returns a message if the XML is malformed or not a metadata document.
pub fn parse_versions(text: &str) -> Result<VersionListing, String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    let Some(versioning) = doc_versioning(&doc)? else {
        return Ok(VersionListing::default());
    };
    let versions = versioning
        .children()
        .find(|n| n.is_element() && n.has_tag_name("versions"))
        .map(|vs| {
            vs.children()
                .filter(|n| n.is_element() && n.has_tag_name("version"))
                .filter_map(|n| n.text())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Ok(VersionListing {
        versions,
        release: text_of(&versioning, "release"),
        latest: text_of(&versioning, "latest"),
    })
}

/// Parse version-level snapshot metadata.
///
/// # Errors
/// Returns a message if the XML is malformed or not a metadata document.
pub fn parse_snapshot(text: &str) -> Result<SnapshotListing, String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    let Some(versioning) = doc_versioning(&doc)? else {
        return Ok(SnapshotListing::default());
    };
    let snapshot = versioning
        .children()
        .find(|n| n.is_element() && n.has_tag_name("snapshot"));
    let snapshot_versions = versioning
        .children()
        .find(|n| n.is_element() && n.has_tag_name("snapshotVersions"))
        .map(|svs| {
            svs.children()
                .filter(|n| n.is_element() && n.has_tag_name("snapshotVersion"))
                .filter_map(|sv| {
                    Some(SnapshotVersion {
                        classifier: text_of(&sv, "classifier"),
                        extension: text_of(&sv, "extension")?,
                        value: text_of(&sv, "value")?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(SnapshotListing {
        timestamp: snapshot.as_ref().and_then(|s| text_of(s, "timestamp")),
        build_number: snapshot.as_ref().and_then(|s| text_of(s, "buildNumber")),
        snapshot_versions,
    })
}
