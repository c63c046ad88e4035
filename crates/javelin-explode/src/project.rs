//! Synthesized project rendering.
//!
//! The exploded binary is presented to the language server as a plain Maven
//! project: a fixed pom shell whose dependency list enumerates the artifacts
//! recovered during explosion. Directories without any build file get the
//! minimal descriptors the server needs to open them at all.

use std::path::{Path, PathBuf};

use javelin_core::Artifact;
use javelin_util::errors::{JavelinError, JavelinResult};

const POM_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://maven.apache.org/POM/4.0.0 http://maven.apache.org/xsd/maven-4.0.0.xsd">
  <modelVersion>4.0.0</modelVersion>

  <groupId>io.konveyor</groupId>
  <artifactId>java-project</artifactId>
  <version>1.0-SNAPSHOT</version>

  <properties>
    <maven.compiler.source>1.8</maven.compiler.source>
    <maven.compiler.target>1.8</maven.compiler.target>
    <project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>
  </properties>

  <dependencies>
{{dependencies}}  </dependencies>
</project>
"#;

const CLASSPATH_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<classpath>
  <classpathentry kind="src" path="."/>
  <classpathentry kind="output" path="bin"/>
</classpath>
"#;

const PROJECT_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<projectDescription>
  <name>{{name}}</name>
  <comment></comment>
  <projects></projects>
  <buildSpec>
    <buildCommand>
      <name>org.eclipse.jdt.core.javabuilder</name>
      <arguments></arguments>
    </buildCommand>
  </buildSpec>
  <natures>
    <nature>org.eclipse.jdt.core.javanature</nature>
  </natures>
</projectDescription>
"#;

/// Replace all `{{key}}` placeholders in `input`.
fn interpolate(input: &str, key: &str, value: &str) -> String {
    input.replace(&format!("{{{{{key}}}}}"), value)
}

/// Render the synthesized pom for the surviving artifacts.
///
/// Artifacts are deduplicated by (group, artifact, version, packaging) with
/// order preserved; incomplete artifacts are dropped and never rendered.
pub fn render_pom(artifacts: &[Artifact]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut rendered = String::new();
    for artifact in artifacts {
        if !artifact.is_complete() {
            tracing::debug!(%artifact, "dropping incomplete artifact from synthesized pom");
            continue;
        }
        let key = (
            artifact.group_id.clone(),
            artifact.artifact_id.clone(),
            artifact.version.clone(),
            artifact.packaging,
        );
        if !seen.insert(key) {
            continue;
        }
        rendered.push_str("    <dependency>\n");
        rendered.push_str(&format!(
            "      <groupId>{}</groupId>\n",
            xml_escape(&artifact.group_id)
        ));
        rendered.push_str(&format!(
            "      <artifactId>{}</artifactId>\n",
            xml_escape(&artifact.artifact_id)
        ));
        rendered.push_str(&format!(
            "      <version>{}</version>\n",
            xml_escape(&artifact.version)
        ));
        rendered.push_str("    </dependency>\n");
    }
    interpolate(POM_TEMPLATE, "dependencies", &rendered)
}

/// Write the synthesized `pom.xml` into `project_dir`.
pub fn write_project_pom(project_dir: &Path, artifacts: &[Artifact]) -> JavelinResult<PathBuf> {
    let path = project_dir.join("pom.xml");
    std::fs::write(&path, render_pom(artifacts)).map_err(JavelinError::Io)?;
    Ok(path)
}

/// Write the minimal `.classpath`/`.project` descriptors so the language
/// server can open a directory that has no build file at all.
pub fn write_minimal_project_files(dir: &Path) -> JavelinResult<()> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "java-project".to_string());
    std::fs::write(dir.join(".classpath"), CLASSPATH_TEMPLATE).map_err(JavelinError::Io)?;
    std::fs::write(
        dir.join(".project"),
        interpolate(PROJECT_TEMPLATE, "name", &name),
    )
    .map_err(JavelinError::Io)?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_pom_contains_only_complete_artifacts() {
        let artifacts = vec![
            Artifact::new("junit", "junit", "4.11"),
            Artifact::new("com.megacorp", "internal-lib", ""),
            Artifact::new("", "classes-only", ""),
        ];
        let pom = render_pom(&artifacts);
        assert!(pom.contains("<groupId>junit</groupId>"));
        assert!(!pom.contains("internal-lib"));
        assert!(!pom.contains("classes-only"));
        // Every rendered dependency carries all three coordinates.
        assert_eq!(pom.matches("<dependency>").count(), 1);
        assert_eq!(pom.matches("<groupId>").count(), 2); // shell + junit
        assert_eq!(pom.matches("<version>").count(), 2);
    }

    #[test]
    fn duplicate_artifacts_are_rendered_once() {
        let artifacts = vec![
            Artifact::new("junit", "junit", "4.11"),
            Artifact::new("junit", "junit", "4.11"),
        ];
        let pom = render_pom(&artifacts);
        assert_eq!(pom.matches("<dependency>").count(), 1);
    }

    #[test]
    fn pom_shell_is_fixed() {
        let pom = render_pom(&[]);
        assert!(pom.contains("<groupId>io.konveyor</groupId>"));
        assert!(pom.contains("<artifactId>java-project</artifactId>"));
        assert!(pom.contains("<version>1.0-SNAPSHOT</version>"));
        assert!(pom.contains("<project.build.sourceEncoding>UTF-8</project.build.sourceEncoding>"));
    }

    #[test]
    fn xml_special_characters_are_escaped() {
        let artifacts = vec![Artifact::new("a&b", "lib", "1<2")];
        let pom = render_pom(&artifacts);
        assert!(pom.contains("<groupId>a&amp;b</groupId>"));
        assert!(pom.contains("<version>1&lt;2</version>"));
    }

    #[test]
    fn minimal_descriptors_carry_java_nature() {
        let tmp = tempfile::tempdir().unwrap();
        write_minimal_project_files(tmp.path()).unwrap();
        let project = std::fs::read_to_string(tmp.path().join(".project")).unwrap();
        assert!(project.contains("org.eclipse.jdt.core.javanature"));
        let classpath = std::fs::read_to_string(tmp.path().join(".classpath")).unwrap();
        assert!(classpath.contains(r#"kind="src" path="."#));
        assert!(classpath.contains(r#"kind="output" path="bin"#));
    }
}
