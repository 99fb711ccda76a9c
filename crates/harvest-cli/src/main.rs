#![forbid(unsafe_code)]

mod logging;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use harvest_config::{Manifest, RemoteRepository};
use harvest_engine::PopulateSummary;
use harvest_util::coordinate::MAVEN_CENTRAL;

type CliResult = Result<(), Box<dyn Error>>;

const DEFAULT_CONFIG: &str = "harvest.toml";

#[derive(Debug, Parser)]
#[command(name = "harvest", about = "Harvest Maven dependencies into a self-contained repository")]
#[command(version)]
struct Cli {
    /// Log debug detail
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve every dependency set and materialize the results
    Populate(PopulateArgs),
    /// Print the OSGi bundle identity of archives
    Inspect {
        /// Jar files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Resolve one coordinate with classifier fallback and list the files
    Resolve {
        /// `group:artifact:version[:classifier][@extension]`
        coordinate: String,
        /// Configuration file (defaults to harvest.toml, or Maven Central if absent)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct PopulateArgs {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,
    /// Local repository cache
    #[arg(long)]
    local_repo: Option<PathBuf>,
    /// Dependency report to create or update
    #[arg(long)]
    report: Option<PathBuf>,
    /// Deploy script to create or update
    #[arg(long)]
    deploy_script: Option<PathBuf>,
    /// Flat OSGi bundle directory
    #[arg(long)]
    bundles: Option<PathBuf>,
    /// Only fill the local repository
    #[arg(long)]
    populate_local_only: bool,
    /// Delete resolved snapshots from the local repository afterwards
    #[arg(long)]
    remove_snapshots: bool,
    /// Fail if any required artifact cannot be resolved
    #[arg(long)]
    strict: bool,
    /// Only resolve the named dependency set (repeatable)
    #[arg(long = "set", value_name = "NAME")]
    sets: Vec<String>,
}

impl PopulateArgs {
    /// Command-line values win over the configuration file.
    fn apply(&self, manifest: &mut Manifest) {
        if let Some(output) = &self.output {
            manifest.output.directory = Some(output.clone());
        }
        if let Some(local) = &self.local_repo {
            manifest.repository.local = Some(local.display().to_string());
        }
        if let Some(report) = &self.report {
            manifest.output.report = Some(report.clone());
        }
        if let Some(script) = &self.deploy_script {
            manifest.output.deploy_script = Some(script.clone());
        }
        if let Some(bundles) = &self.bundles {
            manifest.output.bundles = Some(bundles.clone());
        }
        manifest.output.populate_local_only |= self.populate_local_only;
        manifest.output.remove_snapshots |= self.remove_snapshots;
        manifest.resolve.strict |= self.strict;
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose, cli.quiet) {
        eprintln!("warning: cannot initialise logging: {e}");
    }

    let result = match cli.command {
        Command::Populate(args) => cmd_populate(&args),
        Command::Inspect { files } => cmd_inspect(&files),
        Command::Resolve { coordinate, config } => cmd_resolve(&coordinate, config.as_deref()),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn load_manifest(path: &Path) -> Result<Manifest, Box<dyn Error>> {
    if !path.exists() {
        return Err(format!(
            "no {} found, create one or pass --config",
            path.display()
        )
        .into());
    }
    Ok(Manifest::from_path(path)?)
}

/// Manifest used by `resolve` when no configuration file exists.
fn central_manifest() -> Manifest {
    let mut manifest = Manifest::default();
    manifest.repository.remote.push(RemoteRepository {
        name: "central".to_owned(),
        url: MAVEN_CENTRAL.to_owned(),
        username: None,
        password: None,
        username_env: None,
        password_env: None,
    });
    manifest
}

fn cmd_populate(args: &PopulateArgs) -> CliResult {
    let mut manifest = load_manifest(&args.config)?;
    args.apply(&mut manifest);

    let summary = harvest_engine::populate(&manifest, &args.sets)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &PopulateSummary) {
    eprintln!(
        "    Resolved {} artifact(s) for {} dependency(ies) in {} set(s)",
        summary.artifacts, summary.dependencies, summary.sets
    );
    if summary.conflicting_versions > 0 {
        eprintln!(
            "   Recovered {} conflicting version(s)",
            summary.conflicting_versions
        );
    }
    if let Some(copy) = &summary.copy {
        eprintln!(
            "      Copied {} file(s), {} already present",
            copy.copied, copy.already_present
        );
        if copy.failed > 0 {
            eprintln!("     Failed to copy {} file(s)", copy.failed);
        }
    }
    if summary.outside_repository > 0 {
        eprintln!(
            "     Skipped {} file(s) outside the local repository",
            summary.outside_repository
        );
    }
    if summary.bundles > 0 {
        eprintln!("     Bundled {} artifact(s)", summary.bundles);
    }
    if summary.snapshots_removed > 0 {
        eprintln!("     Removed {} snapshot(s)", summary.snapshots_removed);
    }
    let required = summary.required_failures();
    if required > 0 {
        eprintln!("     Warning {required} required artifact(s) could not be resolved:");
        for failure in summary.failures.iter().filter(|f| f.required) {
            eprintln!("        {}: {}", failure.coordinate, failure.message);
        }
    }
    eprintln!(
        "    Finished with {} unavailable optional classifier(s)",
        summary.benign_misses
    );
}

fn cmd_inspect(files: &[PathBuf]) -> CliResult {
    let mut failed = 0;
    for file in files {
        match harvest_engine::inspect_file(file) {
            Ok(descriptor) if descriptor.compliant => {
                println!(
                    "{}\t{}\t{}",
                    file.display(),
                    descriptor.symbolic_name,
                    descriptor.version
                );
            }
            Ok(_) => println!("{}\tnot an OSGi bundle", file.display()),
            Err(e) => {
                eprintln!("error: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        return Err(format!("{failed} file(s) could not be inspected").into());
    }
    Ok(())
}

fn cmd_resolve(coordinate: &str, config: Option<&Path>) -> CliResult {
    let manifest = match config {
        Some(path) => load_manifest(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => load_manifest(Path::new(DEFAULT_CONFIG))?,
        None => central_manifest(),
    };

    let resolution = harvest_engine::resolve_coordinate(&manifest, coordinate)?;
    for artifact in &resolution.artifacts {
        println!("{}\t{}", artifact.coordinate, artifact.path.display());
    }

    let required: Vec<_> = resolution.failures.iter().filter(|f| f.required).collect();
    if !required.is_empty() {
        for failure in &required {
            eprintln!("error: {}: {}", failure.coordinate, failure.message);
        }
        return Err(format!("{} required artifact(s) could not be resolved", required.len()).into());
    }
    eprintln!(
        "    Finished resolving {} file(s)",
        resolution.artifacts.len()
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use clap::Parser;

    fn populate_args(args: &[&str]) -> PopulateArgs {
        let mut argv = vec!["harvest", "populate"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Populate(args) => args,
            other => panic!("expected Populate, got {other:?}"),
        }
    }

    // ── Subcommand parsing ─────────────────────────────────────────

    #[test]
    fn parse_populate_defaults() {
        let args = populate_args(&[]);
        assert_eq!(args.config, PathBuf::from("harvest.toml"));
        assert!(args.output.is_none());
        assert!(args.sets.is_empty());
        assert!(!args.strict);
        assert!(!args.populate_local_only);
    }

    #[test]
    fn parse_populate_all_flags() {
        let args = populate_args(&[
            "--config",
            "ci.toml",
            "--output",
            "out",
            "--local-repo",
            "m2",
            "--report",
            "out/deps.tsv",
            "--deploy-script",
            "out/deploy.sh",
            "--bundles",
            "plugins",
            "--populate-local-only",
            "--remove-snapshots",
            "--strict",
            "--set",
            "compile",
            "--set",
            "runtime",
        ]);
        assert_eq!(args.config, PathBuf::from("ci.toml"));
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.local_repo, Some(PathBuf::from("m2")));
        assert_eq!(args.bundles, Some(PathBuf::from("plugins")));
        assert!(args.populate_local_only && args.remove_snapshots && args.strict);
        assert_eq!(args.sets, vec!["compile", "runtime"]);
    }

    #[test]
    fn parse_inspect_requires_a_file() {
        let err = Cli::try_parse_from(["harvest", "inspect"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["harvest", "inspect", "a.jar", "b.jar"]).unwrap();
        match cli.command {
            Command::Inspect { files } => assert_eq!(files.len(), 2),
            other => panic!("expected Inspect, got {other:?}"),
        }
    }

    #[test]
    fn parse_resolve() {
        let cli = Cli::try_parse_from(["harvest", "resolve", "a:b:1.0:sources"]).unwrap();
        match cli.command {
            Command::Resolve { coordinate, config } => {
                assert_eq!(coordinate, "a:b:1.0:sources");
                assert!(config.is_none());
            }
            other => panic!("expected Resolve, got {other:?}"),
        }
    }

    // ── Global flags ───────────────────────────────────────────────

    #[test]
    fn verbosity_flags_are_global() {
        let cli = Cli::try_parse_from(["harvest", "populate", "-v"]).unwrap();
        assert!(cli.verbose);
        let cli = Cli::try_parse_from(["harvest", "-q", "inspect", "x.jar"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        let err = Cli::try_parse_from(["harvest", "-v", "-q", "populate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        let err = Cli::try_parse_from(["harvest", "build"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    // ── Overrides ──────────────────────────────────────────────────

    #[test]
    fn flags_override_the_manifest() {
        let mut manifest = Manifest::default();
        manifest.output.directory = Some(PathBuf::from("from-file"));
        manifest.repository.local = Some("file-m2".to_owned());

        populate_args(&["--output", "cli-out", "--local-repo", "cli-m2", "--strict"])
            .apply(&mut manifest);
        assert_eq!(manifest.output.directory, Some(PathBuf::from("cli-out")));
        assert_eq!(manifest.repository.local.as_deref(), Some("cli-m2"));
        assert!(manifest.resolve.strict);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let mut manifest = Manifest::default();
        manifest.output.report = Some(PathBuf::from("deps.tsv"));
        manifest.output.remove_snapshots = true;

        populate_args(&[]).apply(&mut manifest);
        assert_eq!(manifest.output.report, Some(PathBuf::from("deps.tsv")));
        assert!(manifest.output.remove_snapshots);
    }

    #[test]
    fn central_manifest_has_one_remote() {
        let manifest = central_manifest();
        assert_eq!(manifest.repository.remote.len(), 1);
        assert_eq!(
            manifest.repository.remote.first().unwrap().url,
            MAVEN_CENTRAL
        );
    }

    #[test]
    fn missing_config_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_manifest(&tmp.path().join("harvest.toml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("harvest.toml"), "error was: {err}");
    }

    #[test]
    fn inspect_reports_unreadable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let err = cmd_inspect(&[tmp.path().join("missing.jar")])
            .unwrap_err()
            .to_string();
        assert!(err.contains("1 file(s)"), "error was: {err}");
    }
}
