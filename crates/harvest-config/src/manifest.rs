use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use harvest_util::coordinate::{ArtifactCoordinate, ModuleCoordinate, DEFAULT_EXTENSION};
use harvest_util::download::Credentials;

/// The `harvest.toml` run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Named dependency sets, resolved in name order.
    #[serde(default)]
    pub sets: BTreeMap<String, DependencySet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Local repository cache. Defaults to `~/.m2/repository`.
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    #[serde(default = "default_true")]
    pub ignore_descriptor_repositories: bool,
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    #[serde(default)]
    pub remote: Vec<RemoteRepository>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            local: None,
            update_policy: UpdatePolicy::default(),
            ignore_descriptor_repositories: true,
            verify_checksums: true,
            conflict_strategy: ConflictStrategy::default(),
            remote: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// The local repository directory, with `~` expanded.
    ///
    /// # Errors
    /// Returns an error if the path needs a home directory that cannot be determined.
    pub fn local_path(&self) -> Result<PathBuf, ManifestError> {
        let raw = self.local.as_deref().unwrap_or("~/.m2/repository");
        Ok(harvest_util::fs::expand_home(raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RemoteRepository {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the username.
    #[serde(default)]
    pub username_env: Option<String>,
    /// Environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
}

impl RemoteRepository {
    /// Resolve credentials from inline values or environment variables.
    ///
    /// Returns `Ok(None)` when the repository is anonymous.
    ///
    /// # Errors
    /// Returns an error if a referenced environment variable is unset, or if
    /// only one of username/password is given.
    pub fn credentials(&self) -> Result<Option<Credentials>, ManifestError> {
        let username = pick(&self.username, &self.username_env)?;
        let password = pick(&self.password, &self.password_env)?;
        match (username, password) {
            (None, None) => Ok(None),
            (Some(u), Some(p)) => Ok(Some(Credentials::new(&u, &p))),
            _ => Err(ManifestError::Invalid {
                message: format!(
                    "repository `{}` needs both a username and a password",
                    self.name
                ),
            }),
        }
    }
}

fn pick(inline: &Option<String>, env: &Option<String>) -> Result<Option<String>, ManifestError> {
    if let Some(value) = inline {
        return Ok(Some(value.clone()));
    }
    match env {
        Some(var) => std::env::var(var)
            .map(Some)
            .map_err(|_| ManifestError::MissingEnv { var: var.clone() }),
        None => Ok(None),
    }
}

/// When cached metadata and snapshot artifacts are refreshed from remotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UpdatePolicy {
    #[default]
    Never,
    Always,
    Daily,
    Interval(Duration),
}

impl UpdatePolicy {
    /// Whether a cached file last modified `age` ago should be refreshed.
    pub fn is_stale(&self, age: Duration) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Daily => age >= Duration::from_secs(24 * 60 * 60),
            Self::Interval(interval) => age >= *interval,
        }
    }
}

impl FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "daily" => Ok(Self::Daily),
            other => other
                .strip_prefix("interval:")
                .and_then(|m| m.parse::<u64>().ok())
                .map(|minutes| Self::Interval(Duration::from_secs(minutes.saturating_mul(60))))
                .ok_or_else(|| {
                    format!(
                        "unknown update policy `{other}`, expected never, always, daily or interval:<minutes>"
                    )
                }),
        }
    }
}

impl TryFrom<String> for UpdatePolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UpdatePolicy> for String {
    fn from(policy: UpdatePolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("never"),
            Self::Always => f.write_str("always"),
            Self::Daily => f.write_str("daily"),
            Self::Interval(d) => write!(f, "interval:{}", d.as_secs() / 60),
        }
    }
}

/// How the repository client picks one version per module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Shallowest declaration wins, first declared breaks ties.
    #[default]
    Nearest,
    /// Highest requested version wins.
    Highest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResolveConfig {
    /// Optional classifiers tried after the main artifact, in order.
    #[serde(default = "default_classifiers")]
    pub classifiers: Vec<String>,
    /// Fail the run when any required artifact could not be resolved.
    #[serde(default)]
    pub strict: bool,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            classifiers: default_classifiers(),
            strict: false,
        }
    }
}

fn default_classifiers() -> Vec<String> {
    vec!["sources".to_owned(), "tests".to_owned(), "javadoc".to_owned()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Only fill the local repository; copy nothing and write no reports.
    #[serde(default)]
    pub populate_local_only: bool,
    #[serde(default)]
    pub report: Option<PathBuf>,
    #[serde(default = "ReportColumn::all")]
    pub report_columns: Vec<ReportColumn>,
    #[serde(default)]
    pub deploy_script: Option<PathBuf>,
    #[serde(default)]
    pub bundles: Option<PathBuf>,
    /// Delete resolved snapshot versions from the local repository afterwards.
    #[serde(default)]
    pub remove_snapshots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            populate_local_only: false,
            report: None,
            report_columns: ReportColumn::all(),
            deploy_script: None,
            bundles: None,
            remove_snapshots: false,
        }
    }
}

/// One column of the tab-separated dependency report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportColumn {
    #[serde(rename = "GroupID")]
    GroupId,
    #[serde(rename = "ArtifactID")]
    ArtifactId,
    #[serde(rename = "Version")]
    Version,
    #[serde(rename = "pomFile")]
    PomFile,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "packaging")]
    Packaging,
    #[serde(rename = "classifier")]
    Classifier,
    #[serde(rename = "files")]
    Files,
    #[serde(rename = "classifiers")]
    Classifiers,
    #[serde(rename = "types")]
    Types,
}

impl ReportColumn {
    /// All ten columns in header order.
    pub fn all() -> Vec<Self> {
        vec![
            Self::GroupId,
            Self::ArtifactId,
            Self::Version,
            Self::PomFile,
            Self::File,
            Self::Packaging,
            Self::Classifier,
            Self::Files,
            Self::Classifiers,
            Self::Types,
        ]
    }

    /// The literal header cell.
    pub fn header(self) -> &'static str {
        match self {
            Self::GroupId => "GroupID",
            Self::ArtifactId => "ArtifactID",
            Self::Version => "Version",
            Self::PomFile => "pomFile",
            Self::File => "file",
            Self::Packaging => "packaging",
            Self::Classifier => "classifier",
            Self::Files => "files",
            Self::Classifiers => "classifiers",
            Self::Types => "types",
        }
    }
}

/// A named group of requested dependencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DependencySet {
    /// Recover every version that conflict resolution discards.
    #[serde(default)]
    pub include_conflicting_versions: bool,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

/// A requested dependency: a bare coordinate string or a table with explicit artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Simple(String),
    Detailed {
        coordinate: String,
        #[serde(default)]
        artifacts: Vec<ArtifactSpec>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ArtifactSpec {
    #[serde(default)]
    pub classifier: Option<String>,
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_owned()
}

impl DependencySpec {
    pub fn coordinate(&self) -> &str {
        match self {
            Self::Simple(c) | Self::Detailed { coordinate: c, .. } => c,
        }
    }

    /// A coordinate with an empty group names a local file, not a repository module.
    pub fn is_file_dependency(&self) -> bool {
        self.coordinate().trim_start().starts_with(':')
    }

    /// The module this entry names.
    ///
    /// # Errors
    /// Returns an error if the coordinate string is malformed.
    pub fn module(&self) -> Result<ModuleCoordinate, ManifestError> {
        Ok(ModuleCoordinate::parse(self.coordinate())?)
    }

    /// The explicitly requested artifacts, or `None` for classifier fallback.
    ///
    /// # Errors
    /// Returns an error if the coordinate string is malformed.
    pub fn explicit_artifacts(&self) -> Result<Option<Vec<ArtifactCoordinate>>, ManifestError> {
        match self {
            Self::Detailed { artifacts, .. } if !artifacts.is_empty() => {
                let module = self.module()?;
                Ok(Some(
                    artifacts
                        .iter()
                        .map(|a| {
                            ArtifactCoordinate::new(
                                module.clone(),
                                a.classifier.as_deref(),
                                &a.extension,
                            )
                        })
                        .collect(),
                ))
            }
            _ => Ok(None),
        }
    }
}

impl Manifest {
    /// Read and parse a `harvest.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ManifestError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Check the configuration before any resolution work starts.
    ///
    /// # Errors
    /// Returns an error if materialization is enabled without an output
    /// directory, if there is neither a usable local repository directory nor
    /// a remote, if a coordinate is malformed, or if credentials are incomplete.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if !self.output.populate_local_only && self.output.directory.is_none() {
            return Err(ManifestError::MissingOutputDirectory);
        }

        self.validate_repository()?;

        if self.output.report_columns.is_empty() {
            return Err(ManifestError::Invalid {
                message: "report-columns must name at least one column".to_owned(),
            });
        }

        for (name, set) in &self.sets {
            for dep in set.dependencies.iter().filter(|d| !d.is_file_dependency()) {
                dep.explicit_artifacts().map_err(|e| ManifestError::Invalid {
                    message: format!("dependency set `{name}`: {e}"),
                })?;
                dep.module().map_err(|e| ManifestError::Invalid {
                    message: format!("dependency set `{name}`: {e}"),
                })?;
            }
        }
        Ok(())
    }

    /// Check only the `[repository]` table: a usable local directory or at
    /// least one remote, and complete credentials.
    ///
    /// # Errors
    /// Returns `ManifestError::NoRepository` or a credentials error.
    pub fn validate_repository(&self) -> Result<(), ManifestError> {
        let local = self.repository.local_path()?;
        if self.repository.remote.is_empty() && !local.is_dir() {
            return Err(ManifestError::NoRepository {
                local: local.display().to_string(),
            });
        }
        for remote in &self.repository.remote {
            remote.credentials()?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid harvest.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("output directory not set, configure [output] directory or enable populate-local-only")]
    MissingOutputDirectory,
    #[error("since local repository {local} is not a directory a remote repository must be configured")]
    NoRepository { local: String },
    #[error("environment variable `{var}` is not set")]
    MissingEnv { var: String },
    #[error("{message}")]
    Invalid { message: String },
    #[error("{0}")]
    Util(#[from] harvest_util::error::UtilError),
}
