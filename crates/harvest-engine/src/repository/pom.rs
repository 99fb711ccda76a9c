//! POM parsing: parent inheritance, properties, dependency management.

use std::collections::BTreeMap;

use harvest_util::coordinate::{ArtifactCoordinate, ModuleCoordinate, DEFAULT_EXTENSION};

/// A `<dependency>` element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PomDependency {
    pub group: String,
    pub artifact: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub classifier: Option<String>,
    pub type_: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<Exclusion>,
}

impl PomDependency {
    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or("compile")
    }

    /// Whether this dependency belongs on a runtime classpath.
    pub fn is_runtime(&self) -> bool {
        matches!(self.scope(), "compile" | "runtime")
    }

    /// The file this dependency points at, mapping `<type>` to an extension.
    pub fn artifact_coordinate(&self, version: &str) -> ArtifactCoordinate {
        let module = ModuleCoordinate::new(&self.group, &self.artifact, version);
        let (extension, implied_classifier) = match self.type_.as_deref().unwrap_or("jar") {
            "test-jar" => (DEFAULT_EXTENSION, Some("tests")),
            "bundle" | "maven-plugin" | "ejb" | "ejb-client" => (DEFAULT_EXTENSION, None),
            "java-source" => (DEFAULT_EXTENSION, Some("sources")),
            "javadoc" => (DEFAULT_EXTENSION, Some("javadoc")),
            other => (other, None),
        };
        let classifier = self.classifier.as_deref().or(implied_classifier);
        ArtifactCoordinate::new(module, classifier, extension)
    }
}

/// An `<exclusion>`; either part may be `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub group: String,
    pub artifact: String,
}

impl Exclusion {
    pub fn matches(&self, group: &str, artifact: &str) -> bool {
        (self.group == "*" || self.group == group)
            && (self.artifact == "*" || self.artifact == artifact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl ParentRef {
    pub fn module(&self) -> ModuleCoordinate {
        ModuleCoordinate::new(&self.group, &self.artifact, &self.version)
    }
}

/// A POM exactly as written, before inheritance.
#[derive(Debug, Clone, Default)]
pub struct RawPom {
    pub group: Option<String>,
    pub artifact: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<ParentRef>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<PomDependency>,
    pub dependency_management: Vec<PomDependency>,
    pub repositories: Vec<String>,
}

/// Parse POM XML.
///
/// # Errors
/// Returns the XML error message if the text is not well-formed.
pub fn parse_pom(text: &str) -> Result<RawPom, String> {
    let doc = roxmltree::Document::parse(text).map_err(|e| e.to_string())?;
    let project = doc.root_element();
    if project.tag_name().name() != "project" {
        return Err(format!(
            "expected <project> root element, found <{}>",
            project.tag_name().name()
        ));
    }

    let mut pom = RawPom {
        group: child_text(&project, "groupId"),
        artifact: child_text(&project, "artifactId"),
        version: child_text(&project, "version"),
        packaging: child_text(&project, "packaging"),
        ..RawPom::default()
    };

    if let Some(parent) = child_element(&project, "parent") {
        if let (Some(group), Some(artifact), Some(version)) = (
            child_text(&parent, "groupId"),
            child_text(&parent, "artifactId"),
            child_text(&parent, "version"),
        ) {
            pom.parent = Some(ParentRef {
                group,
                artifact,
                version,
            });
        }
    }

    if let Some(props) = child_element(&project, "properties") {
        for child in props.children().filter(roxmltree::Node::is_element) {
            let value = child.text().map(str::trim).unwrap_or_default();
            pom.properties
                .insert(child.tag_name().name().to_owned(), value.to_owned());
        }
    }

    if let Some(deps) = child_element(&project, "dependencies") {
        pom.dependencies = parse_dependencies(&deps);
    }
    if let Some(deps) = child_element(&project, "dependencyManagement")
        .as_ref()
        .and_then(|dm| child_element(dm, "dependencies"))
    {
        pom.dependency_management = parse_dependencies(&deps);
    }

    if let Some(repos) = child_element(&project, "repositories") {
        pom.repositories = repos
            .children()
            .filter(|n| n.is_element() && n.has_tag_name("repository"))
            .filter_map(|n| child_text(&n, "url"))
            .collect();
    }

    Ok(pom)
}

fn parse_dependencies(node: &roxmltree::Node<'_, '_>) -> Vec<PomDependency> {
    node.children()
        .filter(|n| n.is_element() && n.has_tag_name("dependency"))
        .filter_map(|dep| {
            let exclusions = child_element(&dep, "exclusions")
                .map(|ex| {
                    ex.children()
                        .filter(|n| n.is_element() && n.has_tag_name("exclusion"))
                        .filter_map(|n| {
                            Some(Exclusion {
                                group: child_text(&n, "groupId")?,
                                artifact: child_text(&n, "artifactId")
                                    .unwrap_or_else(|| "*".to_owned()),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(PomDependency {
                group: child_text(&dep, "groupId")?,
                artifact: child_text(&dep, "artifactId")?,
                version: child_text(&dep, "version"),
                scope: child_text(&dep, "scope"),
                classifier: child_text(&dep, "classifier"),
                type_: child_text(&dep, "type"),
                optional: child_text(&dep, "optional").is_some_and(|o| o == "true"),
                exclusions,
            })
        })
        .collect()
}

fn child_element<'a, 'input>(
    node: &roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// The effective model of a POM after inheritance and interpolation.
#[derive(Debug, Clone, Default)]
pub struct Pom {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub packaging: String,
    pub properties: BTreeMap<String, String>,
    /// Keyed by `(group, artifact)`.
    pub dependency_management: BTreeMap<(String, String), PomDependency>,
    /// Declared dependencies, interpolated but without managed values applied.
    declared: Vec<PomDependency>,
    pub repositories: Vec<String>,
}

impl Pom {
    /// Build the effective model from a raw POM and its (already effective) parent.
    pub fn from_raw(raw: &RawPom, parent: Option<&Pom>) -> Self {
        let parent_ref = raw.parent.as_ref();
        let group = raw
            .group
            .clone()
            .or_else(|| parent_ref.map(|p| p.group.clone()))
            .or_else(|| parent.map(|p| p.group.clone()))
            .unwrap_or_default();
        let artifact = raw.artifact.clone().unwrap_or_default();
        let version = raw
            .version
            .clone()
            .or_else(|| parent_ref.map(|p| p.version.clone()))
            .or_else(|| parent.map(|p| p.version.clone()))
            .unwrap_or_default();

        let mut properties = parent.map(|p| p.properties.clone()).unwrap_or_default();
        properties.extend(raw.properties.clone());
        for prefix in ["project", "pom"] {
            properties.insert(format!("{prefix}.groupId"), group.clone());
            properties.insert(format!("{prefix}.artifactId"), artifact.clone());
            properties.insert(format!("{prefix}.version"), version.clone());
        }
        if let Some(p) = parent_ref {
            properties.insert("project.parent.groupId".to_owned(), p.group.clone());
            properties.insert("project.parent.version".to_owned(), p.version.clone());
            properties.insert("parent.version".to_owned(), p.version.clone());
        }

        let version = interpolate(&version, &properties);
        let packaging = raw
            .packaging
            .as_deref()
            .map_or_else(|| DEFAULT_EXTENSION.to_owned(), |p| interpolate(p, &properties));

        let mut dependency_management = parent
            .map(|p| p.dependency_management.clone())
            .unwrap_or_default();
        for dep in &raw.dependency_management {
            let dep = interpolate_dependency(dep, &properties);
            dependency_management.insert((dep.group.clone(), dep.artifact.clone()), dep);
        }

        let mut declared: Vec<PomDependency> = parent
            .map(|p| p.declared.clone())
            .unwrap_or_default();
        for dep in &raw.dependencies {
            let dep = interpolate_dependency(dep, &properties);
            declared.retain(|d| !(d.group == dep.group && d.artifact == dep.artifact));
            declared.push(dep);
        }

        let mut repositories = parent.map(|p| p.repositories.clone()).unwrap_or_default();
        repositories.extend(raw.repositories.iter().map(|r| interpolate(r, &properties)));

        Self {
            group,
            artifact,
            version,
            packaging,
            properties,
            dependency_management,
            declared,
            repositories,
        }
    }

    /// BOMs listed in `<dependencyManagement>` with `scope=import`.
    pub fn imports(&self) -> Vec<ModuleCoordinate> {
        self.dependency_management
            .values()
            .filter(|d| d.scope.as_deref() == Some("import"))
            .filter_map(|d| {
                let version = d.version.as_deref()?;
                Some(ModuleCoordinate::new(&d.group, &d.artifact, version))
            })
            .collect()
    }

    /// Merge an imported BOM's managed entries; entries declared here win.
    pub fn import_managed(&mut self, bom: &Pom) {
        for (key, dep) in &bom.dependency_management {
            self.dependency_management
                .entry(key.clone())
                .or_insert_with(|| dep.clone());
        }
    }

    /// Declared dependencies with managed versions and scopes filled in.
    pub fn dependencies(&self) -> Vec<PomDependency> {
        self.declared
            .iter()
            .map(|dep| {
                let mut dep = dep.clone();
                if let Some(managed) = self
                    .dependency_management
                    .get(&(dep.group.clone(), dep.artifact.clone()))
                {
                    if dep.version.is_none() {
                        dep.version.clone_from(&managed.version);
                    }
                    if dep.scope.is_none() {
                        dep.scope.clone_from(&managed.scope);
                    }
                    if dep.exclusions.is_empty() {
                        dep.exclusions.clone_from(&managed.exclusions);
                    }
                }
                dep
            })
            .collect()
    }
}

fn interpolate_dependency(dep: &PomDependency, props: &BTreeMap<String, String>) -> PomDependency {
    let opt = |v: &Option<String>| v.as_deref().map(|s| interpolate(s, props));
    PomDependency {
        group: interpolate(&dep.group, props),
        artifact: interpolate(&dep.artifact, props),
        version: opt(&dep.version),
        scope: opt(&dep.scope),
        classifier: opt(&dep.classifier),
        type_: opt(&dep.type_),
        optional: dep.optional,
        exclusions: dep
            .exclusions
            .iter()
            .map(|e| Exclusion {
                group: interpolate(&e.group, props),
                artifact: interpolate(&e.artifact, props),
            })
            .collect(),
    }
}

/// Replace `${name}` references. Unknown names are left as written.
/// Nested references are expanded up to a fixed depth.
pub fn interpolate(text: &str, props: &BTreeMap<String, String>) -> String {
    let mut current = text.to_owned();
    for _ in 0..8 {
        if !current.contains("${") {
            break;
        }
        let next = interpolate_once(&current, props);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn interpolate_once(text: &str, props: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let (before, from_marker) = rest.split_at(start);
        out.push_str(before);
        let Some(end) = from_marker.find('}') else {
            out.push_str(from_marker);
            return out;
        };
        let (reference, after) = from_marker.split_at(end + 1);
        let name = reference
            .strip_prefix("${")
            .and_then(|r| r.strip_suffix('}'))
            .unwrap_or_default();
        match props.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(reference),
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PARENT: &str = r#"<?xml version="1.0"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <groupId>org.example</groupId>
  <artifactId>parent</artifactId>
  <version>2.1</version>
  <packaging>pom</packaging>
  <properties>
    <slf4j.version>2.0.9</slf4j.version>
  </properties>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.slf4j</groupId>
        <artifactId>slf4j-api</artifactId>
        <version>${slf4j.version}</version>
      </dependency>
      <dependency>
        <groupId>junit</groupId>
        <artifactId>junit</artifactId>
        <version>4.13.2</version>
        <scope>test</scope>
      </dependency>
    </dependencies>
  </dependencyManagement>
</project>"#;

    const CHILD: &str = r#"<project xmlns="http://maven.apache.org/POM/4.0.0">
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>2.1</version>
  </parent>
  <artifactId>child</artifactId>
  <dependencies>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
    </dependency>
    <dependency>
      <groupId>${project.groupId}</groupId>
      <artifactId>sibling</artifactId>
      <version>${project.version}</version>
      <type>test-jar</type>
      <exclusions>
        <exclusion>
          <groupId>commons-logging</groupId>
          <artifactId>*</artifactId>
        </exclusion>
      </exclusions>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
    </dependency>
    <dependency>
      <groupId>com.example</groupId>
      <artifactId>opt</artifactId>
      <version>1</version>
      <optional>true</optional>
    </dependency>
  </dependencies>
  <repositories>
    <repository><id>extra</id><url>https://repo.example.com/maven</url></repository>
  </repositories>
</project>"#;

    fn effective_child() -> Pom {
        let parent = Pom::from_raw(&parse_pom(PARENT).unwrap(), None);
        Pom::from_raw(&parse_pom(CHILD).unwrap(), Some(&parent))
    }

    #[test]
    fn child_inherits_group_and_version() {
        let pom = effective_child();
        assert_eq!(pom.group, "org.example");
        assert_eq!(pom.artifact, "child");
        assert_eq!(pom.version, "2.1");
        assert_eq!(pom.packaging, "jar");
    }

    #[test]
    fn managed_version_and_scope_are_applied() {
        let deps = effective_child().dependencies();
        let slf4j = deps.iter().find(|d| d.artifact == "slf4j-api").unwrap();
        assert_eq!(slf4j.version.as_deref(), Some("2.0.9"));
        assert!(slf4j.is_runtime());

        let junit = deps.iter().find(|d| d.artifact == "junit").unwrap();
        assert_eq!(junit.scope(), "test");
        assert!(!junit.is_runtime());
    }

    #[test]
    fn project_properties_interpolate_in_dependencies() {
        let deps = effective_child().dependencies();
        let sibling = deps.iter().find(|d| d.artifact == "sibling").unwrap();
        assert_eq!(sibling.group, "org.example");
        assert_eq!(sibling.version.as_deref(), Some("2.1"));

        let coord = sibling.artifact_coordinate("2.1");
        assert_eq!(coord.classifier.as_deref(), Some("tests"));
        assert_eq!(coord.extension, "jar");

        let exclusion = sibling.exclusions.first().unwrap();
        assert!(exclusion.matches("commons-logging", "commons-logging"));
        assert!(!exclusion.matches("org.slf4j", "slf4j-api"));
    }

    #[test]
    fn optional_flag_and_repositories_are_read() {
        let pom = effective_child();
        let deps = pom.dependencies();
        assert!(deps.iter().find(|d| d.artifact == "opt").unwrap().optional);
        assert_eq!(pom.repositories, vec!["https://repo.example.com/maven"]);
    }

    #[test]
    fn bom_imports_fill_missing_management() {
        let bom_text = r#"<project>
  <groupId>org.bom</groupId><artifactId>bom</artifactId><version>1</version>
  <dependencyManagement><dependencies>
    <dependency><groupId>a</groupId><artifactId>b</artifactId><version>9.9</version></dependency>
  </dependencies></dependencyManagement>
</project>"#;
        let user_text = r#"<project>
  <groupId>u</groupId><artifactId>u</artifactId><version>1</version>
  <dependencyManagement><dependencies>
    <dependency><groupId>org.bom</groupId><artifactId>bom</artifactId><version>1</version>
      <type>pom</type><scope>import</scope></dependency>
  </dependencies></dependencyManagement>
  <dependencies>
    <dependency><groupId>a</groupId><artifactId>b</artifactId></dependency>
  </dependencies>
</project>"#;
        let bom = Pom::from_raw(&parse_pom(bom_text).unwrap(), None);
        let mut user = Pom::from_raw(&parse_pom(user_text).unwrap(), None);
        assert_eq!(
            user.imports(),
            vec![ModuleCoordinate::new("org.bom", "bom", "1")]
        );
        user.import_managed(&bom);
        let dep = user.dependencies().into_iter().next().unwrap();
        assert_eq!(dep.version.as_deref(), Some("9.9"));
    }

    #[test]
    fn interpolation_handles_nesting_and_unknowns() {
        let mut props = BTreeMap::new();
        props.insert("a".to_owned(), "${b}".to_owned());
        props.insert("b".to_owned(), "1.0".to_owned());
        assert_eq!(interpolate("v${a}-x", &props), "v1.0-x");
        assert_eq!(interpolate("${missing}", &props), "${missing}");
        assert_eq!(interpolate("${unterminated", &props), "${unterminated");
    }

    #[test]
    fn self_referencing_property_terminates() {
        let mut props = BTreeMap::new();
        props.insert("loop".to_owned(), "${loop}".to_owned());
        assert_eq!(interpolate("${loop}", &props), "${loop}");
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_pom("<project><groupId>").is_err());
        assert!(parse_pom("<metadata/>").is_err());
    }
}
