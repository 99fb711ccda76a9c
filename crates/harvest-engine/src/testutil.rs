//! On-disk repository fixtures shared by the engine tests.
#![allow(clippy::unwrap_used)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use harvest_util::coordinate::{ArtifactCoordinate, ModuleCoordinate};

/// Writes files into an M2-layout directory.
pub struct RepoBuilder {
    root: PathBuf,
}

impl RepoBuilder {
    pub fn new(root: &Path) -> Self {
        fs::create_dir_all(root).unwrap();
        Self {
            root: root.to_path_buf(),
        }
    }

    /// A POM declaring `deps` plus an empty jar.
    ///
    /// Each dependency is `g:a:v` optionally followed by `|flag` parts:
    /// `test`, `provided`, `runtime`, `optional` or `exclude=g:a`.
    pub fn module(&self, coord: &str, deps: &[&str]) {
        self.pom_xml(coord, &pom_text(coord, deps));
        self.jar(coord);
    }

    /// Write `xml` as the POM of module `g:a:v`.
    pub fn pom_xml(&self, coord: &str, xml: &str) -> PathBuf {
        let module = ModuleCoordinate::parse(coord).unwrap();
        self.write_file(&module.pom(), xml.as_bytes())
    }

    /// A jar without an OSGi manifest. `coord` is `g:a:v[:classifier][@ext]`.
    pub fn jar(&self, coord: &str) -> PathBuf {
        let artifact = ArtifactCoordinate::parse(coord).unwrap();
        self.write_file(&artifact, &jar_bytes(Some("Manifest-Version: 1.0\r\n")))
    }

    /// A jar whose manifest declares a bundle symbolic name.
    pub fn bundle(&self, coord: &str, symbolic_name: &str, version: Option<&str>) -> PathBuf {
        let artifact = ArtifactCoordinate::parse(coord).unwrap();
        let manifest = bundle_manifest(symbolic_name, version);
        self.write_file(&artifact, &jar_bytes(Some(&manifest)))
    }

    pub fn write_file(&self, artifact: &ArtifactCoordinate, bytes: &[u8]) -> PathBuf {
        let path = artifact.cache_path(&self.root);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }
}

pub fn bundle_manifest(symbolic_name: &str, version: Option<&str>) -> String {
    let mut manifest = format!(
        "Manifest-Version: 1.0\r\nBundle-ManifestVersion: 2\r\nBundle-SymbolicName: {symbolic_name}\r\n"
    );
    if let Some(version) = version {
        manifest.push_str(&format!("Bundle-Version: {version}\r\n"));
    }
    manifest
}

/// A zip archive, optionally carrying `META-INF/MANIFEST.MF`.
pub fn jar_bytes(manifest: Option<&str>) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    if let Some(manifest) = manifest {
        writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
        writer.write_all(manifest.as_bytes()).unwrap();
    }
    writer.start_file("fixture.txt", options).unwrap();
    writer.write_all(b"fixture").unwrap();
    writer.finish().unwrap().into_inner()
}

/// A minimal POM for `g:a:v` with the given dependencies (see [`RepoBuilder::module`]).
pub fn pom_text(coord: &str, deps: &[&str]) -> String {
    let module = ModuleCoordinate::parse(coord).unwrap();
    let mut xml = format!(
        "<project>\n  <groupId>{}</groupId>\n  <artifactId>{}</artifactId>\n  <version>{}</version>\n",
        module.group, module.artifact, module.version
    );
    if !deps.is_empty() {
        xml.push_str("  <dependencies>\n");
        for dep in deps {
            xml.push_str(&dependency_xml(dep));
        }
        xml.push_str("  </dependencies>\n");
    }
    xml.push_str("</project>\n");
    xml
}

fn dependency_xml(spec: &str) -> String {
    let mut parts = spec.split('|');
    let coord = parts.next().unwrap();
    let mut fields = coord.splitn(3, ':');
    let (group, artifact, version) = (
        fields.next().unwrap(),
        fields.next().unwrap(),
        fields.next().unwrap(),
    );
    let mut xml = format!(
        "    <dependency>\n      <groupId>{group}</groupId>\n      <artifactId>{artifact}</artifactId>\n      <version>{version}</version>\n"
    );
    for flag in parts {
        match flag {
            "optional" => xml.push_str("      <optional>true</optional>\n"),
            scope @ ("test" | "provided" | "runtime" | "system") => {
                xml.push_str(&format!("      <scope>{scope}</scope>\n"));
            }
            other => {
                let (g, a) = other
                    .strip_prefix("exclude=")
                    .and_then(|ga| ga.split_once(':'))
                    .unwrap();
                xml.push_str(&format!(
                    "      <exclusions><exclusion><groupId>{g}</groupId><artifactId>{a}</artifactId></exclusion></exclusions>\n"
                ));
            }
        }
    }
    xml.push_str("    </dependency>\n");
    xml
}
