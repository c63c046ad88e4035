use std::path::{Path, PathBuf};
use std::sync::Arc;

use javelin_core::Config;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::process::{CommandBuilder, CommandRunner};

use crate::binary::BinaryBuildTool;
use crate::gradle::GradleBuildTool;
use crate::maven::{maven_settings_args, MavenBuildTool};
use crate::{BuildTool, TREE_TIMEOUT};

/// Location scheme for downloading a coordinate before analysis.
const MVN_SCHEME: &str = "mvn://";

const BINARY_EXTENSIONS: [&str; 3] = ["jar", "war", "ear"];

/// Select the build tool for a location, in fixed order:
///
/// 1. `build.gradle` present → Gradle;
/// 2. a JAR/WAR/EAR path → Binary;
/// 3. `pom.xml` present → Maven;
/// 4. otherwise `None` — the caller fabricates a minimal project so the
///    language server can still open the directory.
pub fn detect(
    location: &Path,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
) -> Option<Box<dyn BuildTool>> {
    if location.join("build.gradle").is_file() {
        tracing::debug!(location = %location.display(), "detected Gradle build");
        return Some(Box::new(GradleBuildTool::new(location, config, runner)));
    }
    let ext = location
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    if let Some(ext) = ext {
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            tracing::debug!(location = %location.display(), "detected binary artifact");
            return Some(Box::new(BinaryBuildTool::new(location, config, runner)));
        }
    }
    if location.join("pom.xml").is_file() {
        tracing::debug!(location = %location.display(), "detected Maven build");
        return Some(Box::new(MavenBuildTool::new(location, config, runner)));
    }
    tracing::debug!(location = %location.display(), "no build tool detected");
    None
}

/// Parsed `mvn://<group>:<artifact>:<version>[:<classifier>]@<destDir>`
/// location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MavenLocation {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub dest: Option<PathBuf>,
}

impl MavenLocation {
    pub(crate) fn parse(location: &str) -> JavelinResult<Self> {
        let rest = location
            .strip_prefix(MVN_SCHEME)
            .ok_or_else(|| JavelinError::Parse {
                message: format!("not a mvn:// location: {location}"),
            })?;
        let (coords, dest) = match rest.split_once('@') {
            Some((coords, dest)) if !dest.is_empty() => (coords, Some(PathBuf::from(dest))),
            Some((coords, _)) => (coords, None),
            None => (rest, None),
        };
        let parts: Vec<&str> = coords.split(':').collect();
        match parts.as_slice() {
            [group, artifact, version] => Ok(Self {
                group: (*group).to_string(),
                artifact: (*artifact).to_string(),
                version: (*version).to_string(),
                classifier: None,
                dest,
            }),
            [group, artifact, version, classifier] => Ok(Self {
                group: (*group).to_string(),
                artifact: (*artifact).to_string(),
                version: (*version).to_string(),
                classifier: Some((*classifier).to_string()),
                dest,
            }),
            _ => Err(JavelinError::Parse {
                message: format!("malformed mvn:// coordinates: {coords}"),
            }
            .into()),
        }
    }

    /// The `-Dartifact` value for `dependency:copy`.
    fn copy_spec(&self) -> String {
        match self.classifier {
            Some(ref classifier) => format!(
                "{}:{}:{}:jar:{classifier}",
                self.group, self.artifact, self.version
            ),
            None => format!("{}:{}:{}", self.group, self.artifact, self.version),
        }
    }

    /// File name `dependency:copy` writes into the output directory.
    fn file_name(&self) -> String {
        match self.classifier {
            Some(ref classifier) => {
                format!("{}-{}-{classifier}.jar", self.artifact, self.version)
            }
            None => format!("{}-{}.jar", self.artifact, self.version),
        }
    }
}

/// Recognize a `mvn://` location, download the coordinate via the external
/// Maven binary, and return the downloaded file path so tool selection can
/// run again. Non-`mvn://` locations pass through unchanged.
pub fn rewrite_maven_location(
    location: &str,
    config: &Config,
    runner: &dyn CommandRunner,
    ctx: &CancellationToken,
) -> JavelinResult<PathBuf> {
    if !location.starts_with(MVN_SCHEME) {
        return Ok(PathBuf::from(location));
    }
    let parsed = MavenLocation::parse(location)?;
    let dest = match parsed.dest {
        Some(ref dest) => {
            if !dest.is_dir() {
                return Err(JavelinError::Config {
                    message: format!("mvn:// destination is not a directory: {}", dest.display()),
                }
                .into());
            }
            dest.clone()
        }
        None => std::env::current_dir().map_err(JavelinError::Io)?,
    };

    let cmd = CommandBuilder::new("mvn")
        .arg("-B")
        .args(maven_settings_args(config, &dest)?)
        .arg("dependency:copy")
        .arg(format!("-Dartifact={}", parsed.copy_spec()))
        .arg(format!("-DoutputDirectory={}", dest.display()))
        .cwd(&dest)
        .timeout(TREE_TIMEOUT)
        .cancellation(ctx.clone());
    let output = runner.run(&cmd)?;
    if !output.success() {
        return Err(JavelinError::Invocation {
            tool: "mvn".into(),
            code: output.code,
            output: output.combined(),
        }
        .into());
    }

    let downloaded = dest.join(parsed.file_name());
    if !downloaded.is_file() {
        return Err(JavelinError::NotFound {
            what: format!("downloaded artifact {}", downloaded.display()),
        }
        .into());
    }
    tracing::info!(artifact = %downloaded.display(), "downloaded mvn:// location");
    Ok(downloaded)
}
