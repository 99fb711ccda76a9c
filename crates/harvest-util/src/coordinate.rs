//! Module and artifact coordinates in the Maven M2 layout.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Maven Central repository URL.
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Extension used when a coordinate does not name one.
pub const DEFAULT_EXTENSION: &str = "jar";

/// Identity of a module, independent of classifier and extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleCoordinate {
    /// Group identifier, e.g. `"org.apache.commons"`.
    pub group: String,
    /// Artifact identifier, e.g. `"commons-lang3"`.
    pub artifact: String,
    /// Concrete version, e.g. `"3.14.0"`.
    pub version: String,
}

impl ModuleCoordinate {
    pub fn new(group: &str, artifact: &str, version: &str) -> Self {
        Self {
            group: group.to_owned(),
            artifact: artifact.to_owned(),
            version: version.to_owned(),
        }
    }

    /// Parse `"group:artifact:version"`.
    ///
    /// # Errors
    /// Returns `UtilError::InvalidCoordinate` unless the string has exactly
    /// three non-empty, path-safe parts.
    pub fn parse(coord: &str) -> Result<Self, UtilError> {
        let parts: Vec<&str> = coord.split(':').collect();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(UtilError::InvalidCoordinate {
                coordinate: coord.to_owned(),
                reason: format!(
                    "expected 3 colon-separated parts (group:artifact:version), got {}",
                    parts.len()
                ),
            });
        };
        check_segment(coord, "group", group)?;
        check_segment(coord, "artifact", artifact)?;
        check_segment(coord, "version", version)?;
        Ok(Self::new(group, artifact, version))
    }

    /// `"group:artifact"`, the key conflict resolution groups versions by.
    pub fn module_key(&self) -> String {
        format!("{}:{}", self.group, self.artifact)
    }

    /// Same module at another version.
    pub fn with_version(&self, version: &str) -> Self {
        Self::new(&self.group, &self.artifact, version)
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with("-SNAPSHOT")
    }

    /// Repository-relative directory: `"{group_path}/{artifact}/{version}"`.
    pub fn repository_dir(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version
        )
    }

    /// Repository-relative directory holding all versions of the module.
    pub fn module_dir(&self) -> String {
        format!("{}/{}", self.group.replace('.', "/"), self.artifact)
    }

    /// Local directory for this version, rooted at `root`.
    pub fn version_dir(&self, root: &Path) -> PathBuf {
        self.repository_dir()
            .split('/')
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// The POM artifact of this module.
    pub fn pom(&self) -> ArtifactCoordinate {
        ArtifactCoordinate::new(self.clone(), None, "pom")
    }

    /// The main (classifier-less) jar of this module.
    pub fn main_jar(&self) -> ArtifactCoordinate {
        ArtifactCoordinate::new(self.clone(), None, DEFAULT_EXTENSION)
    }
}

impl fmt::Display for ModuleCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

/// Identity of one physical file published for a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactCoordinate {
    pub module: ModuleCoordinate,
    /// `None` is the main artifact. An empty classifier is normalized to `None`.
    pub classifier: Option<String>,
    /// File extension, e.g. `"jar"` or `"pom"`.
    pub extension: String,
}

impl ArtifactCoordinate {
    pub fn new(module: ModuleCoordinate, classifier: Option<&str>, extension: &str) -> Self {
        Self {
            module,
            classifier: classifier.filter(|c| !c.is_empty()).map(str::to_owned),
            extension: extension.to_owned(),
        }
    }

    /// Parse `"group:artifact:version[:classifier][@extension]"`.
    ///
    /// The extension defaults to `"jar"`.
    ///
    /// # Errors
    /// Returns `UtilError::InvalidCoordinate` when the string has fewer than 3
    /// or more than 4 colon-separated parts, or any part is empty or unsafe.
    pub fn parse(coord: &str) -> Result<Self, UtilError> {
        let (body, extension) = match coord.split_once('@') {
            Some((body, ext)) => {
                check_segment(coord, "extension", ext)?;
                (body, ext)
            }
            None => (coord, DEFAULT_EXTENSION),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let (module, classifier) = match parts.as_slice() {
            [g, a, v] => (format!("{g}:{a}:{v}"), None),
            [g, a, v, c] => {
                check_segment(coord, "classifier", c)?;
                (format!("{g}:{a}:{v}"), Some(*c))
            }
            _ => {
                return Err(UtilError::InvalidCoordinate {
                    coordinate: coord.to_owned(),
                    reason: format!(
                        "expected 3 or 4 colon-separated parts (group:artifact:version[:classifier]), got {}",
                        parts.len()
                    ),
                });
            }
        };

        let module = ModuleCoordinate::parse(&module).map_err(|e| match e {
            UtilError::InvalidCoordinate { reason, .. } => UtilError::InvalidCoordinate {
                coordinate: coord.to_owned(),
                reason,
            },
            other => other,
        })?;
        Ok(Self::new(module, classifier, extension))
    }

    pub fn is_main(&self) -> bool {
        self.classifier.is_none()
    }

    /// The classifier as a string, empty for the main artifact.
    pub fn classifier_str(&self) -> &str {
        self.classifier.as_deref().unwrap_or("")
    }

    /// Same file at another version of the module.
    pub fn with_version(&self, version: &str) -> Self {
        Self {
            module: self.module.with_version(version),
            classifier: self.classifier.clone(),
            extension: self.extension.clone(),
        }
    }

    /// The filename in the M2 layout: `"{artifact}-{version}[-{classifier}].{extension}"`.
    pub fn filename(&self) -> String {
        self.filename_for(&self.module.version)
    }

    /// The filename with `file_version` in place of the module version.
    ///
    /// Remote snapshot files carry a timestamped version while living in the
    /// `-SNAPSHOT` directory.
    pub fn filename_for(&self, file_version: &str) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.module.artifact, file_version, classifier, self.extension
            ),
            None => format!(
                "{}-{}.{}",
                self.module.artifact, file_version, self.extension
            ),
        }
    }

    /// The repository-relative path for this artifact.
    pub fn repository_path(&self) -> String {
        format!("{}/{}", self.module.repository_dir(), self.filename())
    }

    /// Build the full download URL for this artifact.
    ///
    /// Strips any trailing `/` from `repository` before appending the path.
    pub fn to_url(&self, repository: &str) -> String {
        let base = repository.trim_end_matches('/');
        format!("{}/{}", base, self.repository_path())
    }

    /// Return the local cache path for this artifact, rooted at `root`.
    pub fn cache_path(&self, root: &Path) -> PathBuf {
        self.module.version_dir(root).join(self.filename())
    }
}

impl fmt::Display for ArtifactCoordinate {
    /// `g:a:v[:classifier]@extension`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.module)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        write!(f, "@{}", self.extension)
    }
}

/// Coordinate parts become path segments, so reject anything that could
/// escape the repository layout.
fn check_segment(coord: &str, label: &str, value: &str) -> Result<(), UtilError> {
    let reason = if value.is_empty() {
        format!("{label} is empty")
    } else if value == "." || value == ".." {
        format!("{label} must not be a relative path segment")
    } else if value
        .chars()
        .any(|c| matches!(c, '/' | '\\' | ':' | '@') || c.is_whitespace() || c.is_control())
    {
        format!("{label} contains an illegal character")
    } else {
        return Ok(());
    };
    Err(UtilError::InvalidCoordinate {
        coordinate: coord.to_owned(),
        reason,
    })
}
