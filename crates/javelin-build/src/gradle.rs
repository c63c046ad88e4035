use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

use javelin_core::{Artifact, Config, DependencyNode, Packaging};
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::process::{CommandBuilder, CommandRunner};

use crate::cache::DepCache;
use crate::resolve::GradleSourcesResolver;
use crate::{file_uri, BuildTool, DepMap, Resolver, TREE_TIMEOUT};

/// One dependency line of `gradle dependencies` output.
static DEP_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([| ]+)?[+\\]--- (.*)$").unwrap());
/// A subproject entry of `gradle projects` output.
static PROJECT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+\\]--- [Pp]roject '([^']+)'").unwrap());
/// Wrapper distribution version, from `gradle-wrapper.properties`.
static WRAPPER_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"gradle-(\d+(?:\.\d+)*)-(?:bin|all)\.zip").unwrap());

/// Each nesting level indents by five columns (`|    ` or five spaces).
const DEPTH_WIDTH: usize = 5;

/// Gradle builds distributed with a wrapper older than this need a Java 8
/// JVM for their child processes.
const JAVA8_CEILING: Version = Version::new(8, 15, 0);

/// Gradle build tool: drives the project-local wrapper and parses its
/// `dependencies` trees.
pub struct GradleBuildTool {
    project_dir: PathBuf,
    build_file: PathBuf,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    cache: DepCache,
}

impl GradleBuildTool {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let project_dir = project_dir.into();
        let build_file = project_dir.join("build.gradle");
        Self {
            project_dir,
            build_file,
            config,
            runner,
            cache: DepCache::new(),
        }
    }

    pub fn build_file(&self) -> &Path {
        &self.build_file
    }

    fn parse(&self, ctx: &CancellationToken) -> JavelinResult<DepMap> {
        let projects_cmd = wrapper_command(&self.project_dir)?
            .arg("projects")
            .timeout(TREE_TIMEOUT)
            .cancellation(ctx.clone());
        let output = self.runner.run(&projects_cmd)?;
        if !output.success() {
            return Err(JavelinError::Invocation {
                tool: "gradlew".into(),
                code: output.code,
                output: output.combined(),
            }
            .into());
        }
        let subprojects = parse_subprojects(&output.combined());

        let tasks: Vec<String> = if subprojects.is_empty() {
            vec!["dependencies".to_string()]
        } else {
            subprojects
                .iter()
                .map(|sub| format!("{sub}:dependencies"))
                .collect()
        };

        let mut roots = Vec::new();
        for task in tasks {
            ctx.check()?;
            let cmd = wrapper_command(&self.project_dir)?
                .arg(&task)
                .timeout(TREE_TIMEOUT)
                .cancellation(ctx.clone());
            let output = self.runner.run(&cmd)?;
            if !output.success() {
                return Err(JavelinError::Invocation {
                    tool: "gradlew".into(),
                    code: output.code,
                    output: output.combined(),
                }
                .into());
            }
            roots.extend(parse_gradle_tree(&output.combined()));
        }

        let mut map = DepMap::new();
        map.insert(file_uri(&self.build_file), roots);
        Ok(map)
    }
}

impl BuildTool for GradleBuildTool {
    fn get_dependencies(&self, ctx: &CancellationToken) -> JavelinResult<DepMap> {
        self.cache.get_or_parse(&self.build_file, || self.parse(ctx))
    }

    fn local_repo_path(&self) -> Option<PathBuf> {
        // Gradle keeps its own cache; there is no Maven local repository.
        None
    }

    fn resolver(&self, decompiler: &Path) -> Box<dyn Resolver> {
        Box::new(GradleSourcesResolver::new(
            self.project_dir.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
            decompiler.to_path_buf(),
        ))
    }
}

/// A wrapper invocation rooted at the project, with the Java home override
/// applied when the Gradle distribution needs a Java 8 JVM.
///
/// Fails when the project has no `gradlew` script.
pub(crate) fn wrapper_command(project_dir: &Path) -> JavelinResult<CommandBuilder> {
    let wrapper = project_dir.join("gradlew");
    if !wrapper.is_file() {
        return Err(JavelinError::ToolNotFound {
            tool: wrapper.to_string_lossy().into_owned(),
        }
        .into());
    }
    let mut cmd = CommandBuilder::new(wrapper.to_string_lossy()).cwd(project_dir);
    if gradle_requires_java8(project_dir) {
        match std::env::var("JAVA8_HOME") {
            Ok(home) if !home.is_empty() => {
                cmd = cmd.env("JAVA_HOME", home);
            }
            _ => {
                tracing::warn!("Gradle distribution needs Java 8 but JAVA8_HOME is unset");
            }
        }
    }
    Ok(cmd)
}

/// Whether the wrapper's pinned distribution is 8.14 or older.
pub(crate) fn gradle_requires_java8(project_dir: &Path) -> bool {
    let properties = project_dir.join("gradle/wrapper/gradle-wrapper.properties");
    let Ok(content) = std::fs::read_to_string(&properties) else {
        return false;
    };
    match wrapper_version(&content) {
        Some(version) => version < JAVA8_CEILING,
        None => false,
    }
}

pub(crate) fn wrapper_version(properties: &str) -> Option<Version> {
    let captures = WRAPPER_VERSION.captures(properties)?;
    let mut parts = captures[1].split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Subproject paths from `gradle projects` output, in listing order.
pub(crate) fn parse_subprojects(output: &str) -> Vec<String> {
    let mut subprojects = Vec::new();
    let mut in_listing = false;
    for line in output.lines() {
        if line.contains("Root project") {
            in_listing = true;
            continue;
        }
        if !in_listing {
            continue;
        }
        if let Some(captures) = PROJECT_LINE.captures(line) {
            subprojects.push(captures[1].to_string());
        }
    }
    subprojects
}

/// Parse a `dependencies` report into root nodes with nested children.
///
/// Depth comes from the width of the leading `|    ` columns; a depth →
/// last-node walk attaches each line to its parent. Lines suffixed `(n)`
/// (unresolved) or `(*)` (previously listed) are skipped.
pub(crate) fn parse_gradle_tree(output: &str) -> Vec<DependencyNode> {
    let mut roots: Vec<DependencyNode> = Vec::new();
    for line in output.lines() {
        let Some(captures) = DEP_LINE.captures(line) else {
            continue;
        };
        let depth = captures
            .get(1)
            .map(|m| m.as_str().len() / DEPTH_WIDTH)
            .unwrap_or(0);
        let Some(artifact) = parse_gradle_coordinate(&captures[2]) else {
            continue;
        };
        let node = if depth == 0 {
            DependencyNode::direct(artifact)
        } else {
            DependencyNode::indirect(artifact)
        };
        place(&mut roots, depth, node);
    }
    roots
}

fn place(nodes: &mut Vec<DependencyNode>, depth: usize, node: DependencyNode) {
    if depth == 0 {
        nodes.push(node);
        return;
    }
    match nodes.last_mut() {
        Some(parent) => place(&mut parent.children, depth - 1, node),
        // An indented line with no parent; keep it rather than lose it.
        None => nodes.push(node),
    }
}

/// Parse one Gradle coordinate.
///
/// Handles `g:a:v`, `g:a:req -> resolved`, `g:a:{strictly v} -> resolved`,
/// `g:a -> v`, and the file-only form `:name`. Returns `None` for skipped
/// (`(n)`, `(*)`) lines.
pub(crate) fn parse_gradle_coordinate(text: &str) -> Option<Artifact> {
    let text = text.trim();
    if text.ends_with("(n)") || text.ends_with("(*)") {
        return None;
    }

    let (declared, resolved) = match text.split_once(" -> ") {
        Some((left, right)) => (left.trim(), Some(right.trim())),
        None => (text, None),
    };

    let parts: Vec<&str> = declared.split(':').collect();
    let mut artifact = match parts.as_slice() {
        ["", name] => Artifact {
            artifact_id: (*name).to_string(),
            packaging: Packaging::Jar,
            ..Artifact::default()
        },
        [group, name] => Artifact::new(*group, *name, resolved.unwrap_or_default()),
        [group, name, version] => {
            Artifact::new(*group, *name, resolved.unwrap_or(strip_strictly(version)))
        }
        _ => return None,
    };
    artifact.packaging = Packaging::Jar;
    Some(artifact)
}

/// `{strictly 1.0.1}` → `1.0.1`.
fn strip_strictly(version: &str) -> &str {
    version
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .and_then(|v| v.trim().strip_prefix("strictly"))
        .map(str::trim)
        .unwrap_or(version)
}
