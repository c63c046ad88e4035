//! Direct POM parsing, the explicit fallback when the tree command fails.
//!
//! Reads declared `<dependencies>` and `<dependencyManagement>` entries,
//! resolves `${property}` version references against `<properties>`, and
//! recurses into `<modules>`. Unresolvable references are kept as-is.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use javelin_core::{Artifact, DependencyNode, Packaging};
use javelin_util::errors::{JavelinError, JavelinResult};

use crate::{file_uri, DepMap};

/// The subset of a POM the fallback parser needs.
#[derive(Debug, Clone, Default)]
pub struct Pom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<PomDependency>,
    pub dependency_management: Vec<PomDependency>,
    pub modules: Vec<String>,
}

/// A dependency declared in a POM file.
#[derive(Debug, Clone, Default)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub classifier: Option<String>,
    pub type_: Option<String>,
}

impl Pom {
    /// Resolve `${property}` references in a string against the POM's
    /// properties and built-in project variables. Unknown references are
    /// kept verbatim.
    pub fn interpolate(&self, input: &str) -> String {
        let mut result = input.to_string();
        let mut iterations = 0;
        while result.contains("${") && iterations < 20 {
            iterations += 1;
            let Some(start) = result.find("${") else {
                break;
            };
            let Some(end) = result[start..].find('}') else {
                break;
            };
            let key = &result[start + 2..start + end];
            match self.resolve_property(key) {
                Some(value) => {
                    result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
                }
                None => break,
            }
        }
        result
    }

    fn resolve_property(&self, key: &str) -> Option<String> {
        match key {
            "project.groupId" | "pom.groupId" => self.group_id.clone(),
            "project.artifactId" | "pom.artifactId" => self.artifact_id.clone(),
            "project.version" | "pom.version" => self.version.clone(),
            _ => self.properties.get(key).cloned(),
        }
    }
}

/// Parse a POM XML string.
pub fn parse_pom(xml: &str) -> JavelinResult<Pom> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut pom = Pom::default();
    let mut path: Vec<String> = Vec::new();
    let mut text_buf = String::new();
    let mut current_dep: Option<PomDependency> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                path.push(tag);
                text_buf.clear();

                let ctx = path.join(">");
                if ctx == "project>dependencies>dependency"
                    || ctx == "project>dependencyManagement>dependencies>dependency"
                {
                    current_dep = Some(PomDependency::default());
                }
            }
            Ok(Event::Text(ref e)) => {
                text_buf = e.unescape().unwrap_or_default().to_string();
            }
            Ok(Event::End(_)) => {
                let ctx = path.join(">");
                let depth = path.len();

                if depth == 3 && path.get(1).map(String::as_str) == Some("properties") {
                    let name = path.last().cloned().unwrap_or_default();
                    pom.properties.insert(name, text_buf.clone());
                }

                if let Some(ref mut dep) = current_dep {
                    match path.last().map(String::as_str) {
                        Some("groupId") if ctx.ends_with(">dependency>groupId") => {
                            dep.group_id = text_buf.clone();
                        }
                        Some("artifactId") if ctx.ends_with(">dependency>artifactId") => {
                            dep.artifact_id = text_buf.clone();
                        }
                        Some("version") if ctx.ends_with(">dependency>version") => {
                            dep.version = Some(text_buf.clone());
                        }
                        Some("scope") if ctx.ends_with(">dependency>scope") => {
                            dep.scope = Some(text_buf.clone());
                        }
                        Some("classifier") if ctx.ends_with(">dependency>classifier") => {
                            dep.classifier = Some(text_buf.clone());
                        }
                        Some("type") if ctx.ends_with(">dependency>type") => {
                            dep.type_ = Some(text_buf.clone());
                        }
                        _ => {}
                    }
                    if ctx == "project>dependencies>dependency" {
                        if let Some(dep) = current_dep.take() {
                            pom.dependencies.push(dep);
                        }
                    } else if ctx == "project>dependencyManagement>dependencies>dependency" {
                        if let Some(dep) = current_dep.take() {
                            pom.dependency_management.push(dep);
                        }
                    }
                }

                if depth == 2 {
                    match path.last().map(String::as_str) {
                        Some("groupId") => pom.group_id = Some(text_buf.clone()),
                        Some("artifactId") => pom.artifact_id = Some(text_buf.clone()),
                        Some("version") => pom.version = Some(text_buf.clone()),
                        _ => {}
                    }
                }

                if ctx == "project>modules>module" {
                    pom.modules.push(text_buf.clone());
                }

                path.pop();
                text_buf.clear();
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(JavelinError::Parse {
                    message: format!("failed to parse POM XML: {err}"),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(pom)
}

/// Parse a POM file and its modules into a dependency map, one URI per
/// build file. Declared dependencies and dependency management both count;
/// all are direct (the POM holds no transitivity information).
pub fn parse_project_dependencies(pom_path: &Path) -> JavelinResult<DepMap> {
    let mut map = DepMap::new();
    parse_into(pom_path, &mut map)?;
    Ok(map)
}

fn parse_into(pom_path: &Path, map: &mut DepMap) -> JavelinResult<()> {
    let xml = std::fs::read_to_string(pom_path).map_err(JavelinError::Io)?;
    let pom = parse_pom(&xml)?;

    let mut roots = Vec::new();
    for dep in pom.dependencies.iter().chain(&pom.dependency_management) {
        roots.push(DependencyNode::direct(to_artifact(&pom, dep)));
    }
    map.insert(file_uri(pom_path), roots);

    let base = pom_path.parent().unwrap_or_else(|| Path::new("."));
    for module in &pom.modules {
        let child = base.join(module).join("pom.xml");
        if child.is_file() {
            parse_into(&child, map)?;
        } else {
            tracing::warn!(module = %child.display(), "declared module has no pom.xml");
        }
    }
    Ok(())
}

fn to_artifact(pom: &Pom, dep: &PomDependency) -> Artifact {
    let version = dep
        .version
        .as_deref()
        .map(|v| pom.interpolate(v))
        .unwrap_or_default();
    Artifact {
        group_id: pom.interpolate(&dep.group_id),
        artifact_id: pom.interpolate(&dep.artifact_id),
        version,
        classifier: dep.classifier.clone(),
        scope: dep.scope.clone(),
        packaging: dep
            .type_
            .as_deref()
            .map(Packaging::parse)
            .unwrap_or_default(),
        ..Artifact::default()
    }
}
