//! Tab-separated dependency report and Maven deploy script.
//!
//! Both are regenerated from the [`ArtifactStore`] and merged with the file
//! already on disk: lines for other modules are kept, lines for the same
//! module are replaced, and everything is sorted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use harvest_config::manifest::ReportColumn;
use tracing::{error, info, warn};

use crate::artifact::{ArtifactGroup, ArtifactStore};

/// Written for any empty field.
pub const PLACEHOLDER: &str = " ";

const FIELD_SEPARATOR: char = '\t';

const DEPLOY_COMMAND: &str = "mvn deploy:deploy-file";

const DEPLOY_PREAMBLE: &str = "#!/bin/sh
# Deploys the harvested artifacts. Set SETTINGS, URL and REPO before running.
set -e
cd \"$(dirname \"$0\")\"
";

pub fn header(columns: &[ReportColumn]) -> String {
    columns
        .iter()
        .map(|c| c.header())
        .collect::<Vec<_>>()
        .join(&FIELD_SEPARATOR.to_string())
}

fn never_empty(value: String) -> String {
    if value.trim().is_empty() {
        PLACEHOLDER.to_owned()
    } else {
        value
    }
}

/// Paths of one reportable group, relative to the consumer file.
struct GroupPaths {
    pom: String,
    file: String,
    others: Vec<String>,
}

impl GroupPaths {
    fn of(store: &ArtifactStore, group: &ArtifactGroup, consumer: &Path) -> Option<Self> {
        let main = group.main()?;
        let pom = store.consumer_relative(group.pom()?, consumer)?;
        let file = store.consumer_relative(&main.path, consumer)?;
        let others = group
            .additional()
            .iter()
            .map(|a| store.consumer_relative(&a.path, consumer))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { pom, file, others })
    }
}

fn warn_unplaced(group: &ArtifactGroup, consumer: &Path) {
    warn!(
        "{} has no path relative to {}, leaving it out",
        group.module(),
        consumer.display()
    );
}

fn joined<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(",")
}

fn report_line(
    store: &ArtifactStore,
    group: &ArtifactGroup,
    consumer: &Path,
    columns: &[ReportColumn],
) -> Option<String> {
    let paths = GroupPaths::of(store, group, consumer)?;
    let main = group.main()?;
    let module = group.module();
    let fields: Vec<String> = columns
        .iter()
        .map(|column| {
            let value = match column {
                ReportColumn::GroupId => module.group.clone(),
                ReportColumn::ArtifactId => module.artifact.clone(),
                ReportColumn::Version => module.version.clone(),
                ReportColumn::PomFile => paths.pom.clone(),
                ReportColumn::File => paths.file.clone(),
                ReportColumn::Packaging => main.coordinate.extension.clone(),
                ReportColumn::Classifier => main.coordinate.classifier_str().to_owned(),
                ReportColumn::Files => paths.others.join(","),
                ReportColumn::Classifiers => joined(
                    group
                        .additional()
                        .iter()
                        .map(|a| a.coordinate.classifier_str()),
                ),
                ReportColumn::Types => joined(
                    group
                        .additional()
                        .iter()
                        .map(|a| a.coordinate.extension.as_str()),
                ),
            };
            never_empty(value)
        })
        .collect();
    Some(fields.join(&FIELD_SEPARATOR.to_string()))
}

/// Identity of a report line: its group, artifact and version cells, or the
/// whole line when those columns are not configured.
fn report_key(line: &str, columns: &[ReportColumn]) -> String {
    let cells: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    let key: Vec<&str> = columns
        .iter()
        .zip(cells.iter())
        .filter(|(column, _)| {
            matches!(
                column,
                ReportColumn::GroupId | ReportColumn::ArtifactId | ReportColumn::Version
            )
        })
        .map(|(_, cell)| *cell)
        .collect();
    if key.is_empty() {
        line.to_owned()
    } else {
        key.join(":")
    }
}

/// Render the report for `consumer`, merged with `existing` report text.
///
/// Existing text with a different header is discarded.
pub fn emit_report(
    store: &ArtifactStore,
    consumer: &Path,
    columns: &[ReportColumn],
    existing: Option<&str>,
) -> String {
    let header = header(columns);
    let mut lines: BTreeMap<String, String> = BTreeMap::new();

    if let Some(existing) = existing {
        let mut existing_lines = existing.lines();
        match existing_lines.next() {
            Some(first) if first == header => {
                for line in existing_lines.filter(|l| !l.trim().is_empty()) {
                    lines.insert(report_key(line, columns), line.to_owned());
                }
            }
            None => {}
            Some(_) => warn!("existing report has different columns, replacing it"),
        }
    }

    for group in store.reportable() {
        match report_line(store, group, consumer, columns) {
            Some(line) => {
                lines.insert(report_key(&line, columns), line);
            }
            None => warn_unplaced(group, consumer),
        }
    }

    let sorted: BTreeSet<String> = lines.into_values().collect();
    let mut text = header;
    text.push('\n');
    for line in sorted {
        text.push_str(&line);
        text.push('\n');
    }
    text
}

fn deploy_line(store: &ArtifactStore, group: &ArtifactGroup, consumer: &Path) -> Option<String> {
    let paths = GroupPaths::of(store, group, consumer)?;
    let mut line = format!(
        "{DEPLOY_COMMAND} --settings ${{SETTINGS}} -Durl=${{URL}} -DrepositoryId=${{REPO}} -Dfile={} -DpomFile={}",
        paths.file, paths.pom
    );
    if group.has_other_classifiers() {
        let classifiers = joined(
            group
                .additional()
                .iter()
                .map(|a| a.coordinate.classifier_str()),
        );
        let types = joined(
            group
                .additional()
                .iter()
                .map(|a| a.coordinate.extension.as_str()),
        );
        line.push_str(&format!(
            " -Dclassifiers={classifiers} -Dtypes={types} -Dfiles={}",
            paths.others.join(",")
        ));
    }
    Some(line)
}

fn deploy_key(line: &str) -> String {
    line.split(' ')
        .find_map(|arg| arg.strip_prefix("-DpomFile="))
        .unwrap_or(line)
        .to_owned()
}

/// Render the deploy script for `consumer`, merged with `existing` script text.
pub fn emit_deploy_script(store: &ArtifactStore, consumer: &Path, existing: Option<&str>) -> String {
    let mut lines: BTreeMap<String, String> = BTreeMap::new();
    for line in existing
        .unwrap_or_default()
        .lines()
        .filter(|l| l.starts_with(DEPLOY_COMMAND))
    {
        lines.insert(deploy_key(line), line.to_owned());
    }
    for group in store.reportable() {
        match deploy_line(store, group, consumer) {
            Some(line) => {
                lines.insert(deploy_key(&line), line);
            }
            None => warn_unplaced(group, consumer),
        }
    }

    let sorted: BTreeSet<String> = lines.into_values().collect();
    let mut text = DEPLOY_PREAMBLE.to_owned();
    for line in sorted {
        text.push_str(&line);
        text.push('\n');
    }
    text
}

fn read_existing(path: &Path, what: &str) -> Option<String> {
    if !path.is_file() {
        info!("Creating {what} {}", path.display());
        return None;
    }
    info!("Updating {what} {}", path.display());
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(
                "cannot read existing {what} {}, it will be overwritten: {e}",
                path.display()
            );
            None
        }
    }
}

fn write_text(path: &Path, text: &str) -> bool {
    match harvest_util::fs::write_atomic(path, text) {
        Ok(()) => true,
        Err(e) => {
            error!("{e}");
            false
        }
    }
}

/// Write (or update) the report at `path`. Failures are logged.
pub fn write_report(store: &ArtifactStore, path: &Path, columns: &[ReportColumn]) -> bool {
    let existing = read_existing(path, "dependency report");
    let text = emit_report(store, path, columns, existing.as_deref());
    write_text(path, &text)
}

/// Write (or update) the deploy script at `path`. Failures are logged.
pub fn write_deploy_script(store: &ArtifactStore, path: &Path) -> bool {
    let existing = read_existing(path, "deployment script");
    let text = emit_deploy_script(store, path, existing.as_deref());
    write_text(path, &text)
}
