//! OSGi bundle detection from an archive's `META-INF/MANIFEST.MF`.

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::repository::ResolvedArtifact;

/// The framework's own API jars; never part of a bundle set.
pub const EXCLUDED_BUNDLES: &[&str] = &[
    "org.osgi:org.osgi.core",
    "org.osgi:org.osgi.enterprise",
    "org.osgi:osgi.core",
    "org.osgi:osgi.enterprise",
];

const MANIFEST_ENTRY: &str = "META-INF/MANIFEST.MF";
const SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
const BUNDLE_VERSION: &str = "Bundle-Version";

/// Version reported when `Bundle-Version` is absent.
pub const DEFAULT_BUNDLE_VERSION: &str = "0.0.0";

/// What the manifest says about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    /// Without any `;directive` suffix.
    pub symbolic_name: String,
    pub version: String,
    pub compliant: bool,
}

impl BundleDescriptor {
    pub fn not_a_bundle() -> Self {
        Self {
            symbolic_name: String::new(),
            version: DEFAULT_BUNDLE_VERSION.to_owned(),
            compliant: false,
        }
    }
}

/// Main-section headers of a JAR manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestHeaders {
    headers: Vec<(String, String)>,
}

impl ManifestHeaders {
    /// Parse the main section. Continuation lines (leading single space) are
    /// joined onto the previous header; parsing stops at the first blank line.
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push_str(continuation);
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_owned(), value.trim_start().to_owned()));
            }
        }
        Self { headers }
    }

    /// Case-insensitive header lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Derive the descriptor from manifest text.
pub fn describe(text: &str) -> BundleDescriptor {
    let headers = ManifestHeaders::parse(text);
    let Some(raw_name) = headers.get(SYMBOLIC_NAME) else {
        return BundleDescriptor::not_a_bundle();
    };
    let symbolic_name = raw_name
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned();
    if symbolic_name.is_empty() {
        return BundleDescriptor::not_a_bundle();
    }
    let version = headers
        .get(BUNDLE_VERSION)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_BUNDLE_VERSION)
        .to_owned();
    BundleDescriptor {
        symbolic_name,
        version,
        compliant: true,
    }
}

fn inspect_reader<R: Read + Seek>(reader: R) -> BundleDescriptor {
    let mut archive = match zip::ZipArchive::new(reader) {
        Ok(archive) => archive,
        Err(e) => {
            debug!("not a zip archive: {e}");
            return BundleDescriptor::not_a_bundle();
        }
    };
    let mut entry = match archive.by_name(MANIFEST_ENTRY) {
        Ok(entry) => entry,
        Err(_) => return BundleDescriptor::not_a_bundle(),
    };
    let mut raw = Vec::new();
    if let Err(e) = entry.read_to_end(&mut raw) {
        debug!("unreadable manifest: {e}");
        return BundleDescriptor::not_a_bundle();
    }
    describe(&String::from_utf8_lossy(&raw))
}

/// Inspect an archive held in memory. Anything that is not a zip with a
/// manifest is simply not a bundle.
pub fn inspect_bytes(bytes: &[u8]) -> BundleDescriptor {
    inspect_reader(Cursor::new(bytes))
}

/// Inspect an archive on disk.
///
/// # Errors
/// Returns an error only if the file cannot be opened.
pub fn inspect_file(path: &Path) -> Result<BundleDescriptor, EngineError> {
    let file = std::fs::File::open(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(inspect_reader(std::io::BufReader::new(file)))
}

/// Inspect a resolved artifact, applying [`EXCLUDED_BUNDLES`].
pub fn inspect_artifact(artifact: &ResolvedArtifact) -> BundleDescriptor {
    let mut descriptor = match inspect_file(&artifact.path) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!("{e}");
            return BundleDescriptor::not_a_bundle();
        }
    };
    let key = artifact.coordinate.module.module_key();
    if EXCLUDED_BUNDLES.contains(&key.as_str()) {
        descriptor.compliant = false;
    }
    descriptor
}
