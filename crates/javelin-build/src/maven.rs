use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;

use javelin_core::{Artifact, Config, DependencyNode, Packaging};
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::fs as jfs;
use javelin_util::process::{CommandBuilder, CommandRunner};

use crate::cache::DepCache;
use crate::resolve::MavenSourcesResolver;
use crate::{file_uri, pom, BuildTool, DepMap, Resolver, TREE_TIMEOUT};

/// Start of a per-module tree in `dependency:tree` output.
static TREE_BEGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(maven-)?dependency(-plugin)?:[^:]+:tree").unwrap());
/// Rule line terminating a module's tree.
static TREE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-+$").unwrap());

/// Maven build tool: drives `mvn dependency:tree` and parses its output.
pub struct MavenBuildTool {
    project_dir: PathBuf,
    pom_path: PathBuf,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    cache: DepCache,
    /// Memoized `settings.localRepository` discovery.
    local_repo: Mutex<Option<PathBuf>>,
}

impl MavenBuildTool {
    pub fn new(
        project_dir: impl Into<PathBuf>,
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let project_dir = project_dir.into();
        let pom_path = project_dir.join("pom.xml");
        Self {
            project_dir,
            pom_path,
            config,
            runner,
            cache: DepCache::new(),
            local_repo: Mutex::new(None),
        }
    }

    pub fn pom_path(&self) -> &Path {
        &self.pom_path
    }

    fn base_command(&self) -> JavelinResult<CommandBuilder> {
        let mut cmd = CommandBuilder::new("mvn")
            .arg("-B")
            .args(maven_settings_args(&self.config, &self.project_dir)?)
            .cwd(&self.project_dir);
        if self.config.maven_insecure {
            cmd = cmd.arg("-Dmaven.wagon.http.ssl.insecure=true");
        }
        Ok(cmd)
    }

    /// Discover the local repository via `help:evaluate`, memoized.
    pub fn discover_local_repo(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.config.maven_cache_dir {
            return Some(dir.clone());
        }
        let mut memo = self
            .local_repo
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if memo.is_some() {
            return memo.clone();
        }

        let cmd = match self.base_command() {
            Ok(cmd) => cmd
                .arg("help:evaluate")
                .arg("-Dexpression=settings.localRepository")
                .arg("-q")
                .arg("-DforceStdout")
                .timeout(TREE_TIMEOUT),
            Err(err) => {
                tracing::warn!(%err, "cannot build help:evaluate command");
                return None;
            }
        };
        let output = match self.runner.run(&cmd) {
            Ok(output) if output.success() => output,
            Ok(output) => {
                tracing::warn!(code = ?output.code, "help:evaluate failed");
                return None;
            }
            Err(err) => {
                tracing::warn!(%err, "help:evaluate did not run");
                return None;
            }
        };
        let repo = parse_evaluate_output(&output.stdout).map(PathBuf::from);
        memo.clone_from(&repo);
        repo
    }

    fn run_tree(&self, ctx: &CancellationToken) -> JavelinResult<DepMap> {
        let cmd = self
            .base_command()?
            .arg("dependency:tree")
            .timeout(TREE_TIMEOUT)
            .cancellation(ctx.clone());
        let output = self.runner.run(&cmd)?;
        if !output.success() {
            if self.config.fallback_on_tree_failure {
                tracing::warn!(
                    code = ?output.code,
                    "dependency:tree failed, falling back to direct POM parse"
                );
                return pom::parse_project_dependencies(&self.pom_path);
            }
            return Err(JavelinError::Invocation {
                tool: "mvn".into(),
                code: output.code,
                output: output.combined(),
            }
            .into());
        }

        let local_repo = self.discover_local_repo();
        let roots = parse_tree_output(&output.combined(), local_repo.as_deref())?;
        let mut map = DepMap::new();
        map.insert(file_uri(&self.pom_path), roots);
        Ok(map)
    }
}

impl BuildTool for MavenBuildTool {
    fn get_dependencies(&self, ctx: &CancellationToken) -> JavelinResult<DepMap> {
        self.cache.get_or_parse(&self.pom_path, || self.run_tree(ctx))
    }

    fn local_repo_path(&self) -> Option<PathBuf> {
        self.discover_local_repo()
    }

    fn resolver(&self, decompiler: &Path) -> Box<dyn Resolver> {
        Box::new(MavenSourcesResolver::new(
            self.project_dir.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
            decompiler.to_path_buf(),
            self.discover_local_repo(),
        ))
    }
}

/// `-s <file>` argument pair, when settings are configured.
///
/// A custom `mavenCacheDir` synthesizes a settings file pinning
/// `<localRepository>` (written once into the workspace dir, or the project
/// dir without one); an explicit settings file is passed through.
pub(crate) fn maven_settings_args(config: &Config, project_dir: &Path) -> JavelinResult<Vec<String>> {
    if let Some(ref cache_dir) = config.maven_cache_dir {
        let dir = config
            .workspace
            .clone()
            .unwrap_or_else(|| project_dir.to_path_buf());
        let path = dir.join("javelin-settings.xml");
        if !path.is_file() {
            jfs::ensure_dir(&dir).map_err(JavelinError::Io)?;
            std::fs::write(&path, settings_xml(cache_dir)).map_err(JavelinError::Io)?;
        }
        return Ok(vec!["-s".into(), path.to_string_lossy().into_owned()]);
    }
    if let Some(ref settings) = config.maven_settings_file {
        return Ok(vec!["-s".into(), settings.to_string_lossy().into_owned()]);
    }
    Ok(Vec::new())
}

/// Settings document pinning a custom local repository.
fn settings_xml(local_repo: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<settings xmlns="http://maven.apache.org/SETTINGS/1.0.0">
  <localRepository>{}</localRepository>
</settings>
"#,
        local_repo.display()
    )
}

/// First meaningful line of `help:evaluate -q -DforceStdout` output.
pub(crate) fn parse_evaluate_output(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('['))
        .map(str::to_string)
}

/// Split combined `dependency:tree` output into per-module line groups.
///
/// A tree opens at the plugin marker and closes at an `[INFO] ---` rule.
/// Inside a tree, the module's own coordinate line opens the group and only
/// tree-drawing lines (first non-blank char `+`, `|`, or `\`) are kept, which
/// drops download-progress noise.
pub(crate) fn extract_submodule_trees(output: &str) -> Vec<Vec<String>> {
    let mut trees: Vec<Vec<String>> = Vec::new();
    let mut gather = false;

    for raw in output.lines() {
        let line = raw
            .strip_prefix("[INFO] ")
            .or_else(|| raw.strip_prefix("[INFO]"))
            .unwrap_or(raw);
        if TREE_BEGIN.is_match(line) {
            gather = true;
            trees.push(Vec::new());
            continue;
        }
        if !gather {
            continue;
        }
        if TREE_END.is_match(line.trim()) {
            gather = false;
            continue;
        }
        let trimmed = line.trim_start();
        let Some(first) = trimmed.chars().next() else {
            continue;
        };
        let tree = trees.last_mut().expect("gathering implies an open tree");
        if matches!(first, '+' | '|' | '\\') {
            tree.push(line.to_string());
        } else if tree.is_empty() && trimmed.contains(':') && !trimmed.contains(' ') {
            // The module's own coordinate line.
            tree.push(line.to_string());
        }
    }
    trees
}

/// Parse full `dependency:tree` output into ordered root nodes.
///
/// In a multi-module build the first tree belongs to the aggregator and is
/// skipped; submodule order is preserved.
pub(crate) fn parse_tree_output(
    output: &str,
    local_repo: Option<&Path>,
) -> JavelinResult<Vec<DependencyNode>> {
    let mut trees = extract_submodule_trees(output);
    if trees.len() > 1 {
        trees.remove(0);
    }
    let mut roots = Vec::new();
    for tree in &trees {
        roots.extend(parse_tree_lines(tree, local_repo)?);
    }
    Ok(roots)
}

/// Parse one module's tree lines.
///
/// The module's own coordinate line is skipped. A dependency line carrying
/// more than two spaces is indirect and attaches to the preceding direct
/// node; everything else starts a new direct node.
pub(crate) fn parse_tree_lines(
    tree: &[String],
    local_repo: Option<&Path>,
) -> JavelinResult<Vec<DependencyNode>> {
    let mut roots: Vec<DependencyNode> = Vec::new();
    for (i, line) in tree.iter().enumerate() {
        let trimmed = line.trim_start();
        let is_tree_line = matches!(trimmed.chars().next(), Some('+' | '|' | '\\'));
        if i == 0 && !is_tree_line {
            // Module's own coordinate.
            continue;
        }
        let artifact = parse_dep_line(line, local_repo)?;
        let indirect = line.matches(' ').count() > 2;
        match (indirect, roots.last_mut()) {
            (true, Some(parent)) => parent.children.push(DependencyNode::indirect(artifact)),
            _ => roots.push(DependencyNode::direct(artifact)),
        }
    }
    Ok(roots)
}

/// Parse one stripped dependency line into an artifact.
///
/// Accepted shapes after splitting on `:`:
/// 5 fields `g:a:packaging:version:scope`, 6 fields with a classifier,
/// 3–4 fields degrade to version `"Unknown"`, fewer is a parse error.
pub(crate) fn parse_dep_line(line: &str, local_repo: Option<&Path>) -> JavelinResult<Artifact> {
    let cleaned = line.trim_matches(|c: char| {
        matches!(c, '+' | '-' | '\\' | '|' | '"' | '\t' | ' ')
    });
    let parts: Vec<&str> = cleaned.split(':').collect();

    let mut artifact = match parts.as_slice() {
        [group, artifact_id, packaging, version, scope] => Artifact {
            group_id: (*group).to_string(),
            artifact_id: (*artifact_id).to_string(),
            version: (*version).to_string(),
            packaging: Packaging::parse(packaging),
            scope: Some((*scope).to_string()),
            ..Artifact::default()
        },
        [group, artifact_id, packaging, classifier, version, scope] => Artifact {
            group_id: (*group).to_string(),
            artifact_id: (*artifact_id).to_string(),
            version: (*version).to_string(),
            packaging: Packaging::parse(packaging),
            classifier: Some((*classifier).to_string()),
            scope: Some((*scope).to_string()),
            ..Artifact::default()
        },
        [group, artifact_id, rest @ ..] if !rest.is_empty() => {
            tracing::warn!(line = cleaned, "dependency line has no version");
            Artifact {
                group_id: (*group).to_string(),
                artifact_id: (*artifact_id).to_string(),
                version: "Unknown".to_string(),
                ..Artifact::default()
            }
        }
        _ => {
            return Err(JavelinError::Parse {
                message: format!("unparseable dependency line: {line}"),
            }
            .into())
        }
    };

    // Sidecar presence only proves local-repo residency (mvn install writes
    // them too), so it is not an online signal; found_online stays false for
    // tree-parsed nodes.
    artifact.sha1 = resolved_identifier(local_repo, &artifact);
    Ok(artifact)
}

/// Read the resolved identifier from the local repository's checksum
/// sidecars, `.pom` first then `.jar`. Empty when neither exists.
pub(crate) fn resolved_identifier(local_repo: Option<&Path>, artifact: &Artifact) -> String {
    let Some(repo) = local_repo else {
        return String::new();
    };
    if !artifact.is_complete() {
        return String::new();
    }
    let dir = repo
        .join(artifact.group_id.replace('.', "/"))
        .join(&artifact.artifact_id)
        .join(&artifact.version);
    let base = match artifact.classifier {
        Some(ref classifier) => {
            format!("{}-{}-{classifier}", artifact.artifact_id, artifact.version)
        }
        None => format!("{}-{}", artifact.artifact_id, artifact.version),
    };
    for ext in ["pom", "jar"] {
        let sidecar = dir.join(format!("{base}.{ext}.sha1"));
        if let Some(token) = jfs::read_first_token(&sidecar) {
            return token;
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_MODULE_OUTPUT: &str = "\
[INFO] Scanning for projects...
[INFO] --- maven-dependency-plugin:3.1.2:tree (default-cli) @ java ---
[INFO] com.example.apps:java:jar:1.0-SNAPSHOT
[INFO] +- junit:junit:jar:4.11:test
[INFO] |  \\- org.hamcrest:hamcrest-core:jar:1.3:test
[INFO] ------------------------------------------------------------------------
[INFO] BUILD SUCCESS
";

    #[test]
    fn single_module_tree_parses_direct_and_indirect() {
        let roots = parse_tree_output(SINGLE_MODULE_OUTPUT, None).unwrap();
        assert_eq!(roots.len(), 1);

        let junit = &roots[0];
        assert_eq!(junit.artifact.display_name(), "junit.junit");
        assert_eq!(junit.artifact.version, "4.11");
        assert_eq!(junit.artifact.scope.as_deref(), Some("test"));
        assert!(!junit.indirect);

        assert_eq!(junit.children.len(), 1);
        let hamcrest = &junit.children[0];
        assert_eq!(
            hamcrest.artifact.display_name(),
            "org.hamcrest.hamcrest-core"
        );
        assert_eq!(hamcrest.artifact.version, "1.3");
        assert!(hamcrest.indirect);
    }

    #[test]
    fn classifier_line_parses_all_six_fields() {
        let artifact = parse_dep_line(
            "+- io.netty:netty-transport-native-epoll:jar:linux-aarch_64:4.1.76.Final:runtime",
            None,
        )
        .unwrap();
        assert_eq!(artifact.group_id, "io.netty");
        assert_eq!(artifact.artifact_id, "netty-transport-native-epoll");
        assert_eq!(artifact.classifier.as_deref(), Some("linux-aarch_64"));
        assert_eq!(artifact.version, "4.1.76.Final");
        assert_eq!(artifact.scope.as_deref(), Some("runtime"));
    }

    #[test]
    fn short_line_degrades_to_unknown_version() {
        let artifact = parse_dep_line("+- org.example:thing:jar", None).unwrap();
        assert_eq!(artifact.version, "Unknown");
    }

    #[test]
    fn unparseable_line_is_an_error() {
        let result = parse_dep_line("+- garbage", None);
        assert!(result.is_err());
    }

    #[test]
    fn aggregator_tree_is_skipped_in_multi_module_output() {
        let output = "\
[INFO] --- maven-dependency-plugin:3.1.2:tree (default-cli) @ parent ---
[INFO] com.example:parent:pom:1.0
[INFO] ------------------------------------------------------------------------
[INFO] --- maven-dependency-plugin:3.1.2:tree (default-cli) @ web ---
[INFO] com.example:web:jar:1.0
[INFO] +- com.example:shared:jar:1.0:compile
[INFO] ------------------------------------------------------------------------
[INFO] --- maven-dependency-plugin:3.1.2:tree (default-cli) @ cli ---
[INFO] com.example:cli:jar:1.0
[INFO] +- info.picocli:picocli:jar:4.7.0:compile
[INFO] ------------------------------------------------------------------------
";
        let roots = parse_tree_output(output, None).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].artifact.artifact_id, "shared");
        assert_eq!(roots[1].artifact.artifact_id, "picocli");
    }

    #[test]
    fn progress_noise_inside_a_tree_is_filtered() {
        let output = "\
[INFO] --- dependency:3.6.0:tree (default-cli) @ app ---
[INFO] com.example:app:jar:1.0
Downloading from central: https://repo.maven.apache.org/maven2/junit/junit/4.11/junit-4.11.pom
[INFO] +- junit:junit:jar:4.11:test
[INFO] ------------------------------------------------------------------------
";
        let roots = parse_tree_output(output, None).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].artifact.artifact_id, "junit");
    }

    #[test]
    fn resolved_identifier_prefers_pom_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("junit/junit/4.11");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("junit-4.11.pom.sha1"), "pomsha junit-4.11.pom\n").unwrap();
        std::fs::write(dir.join("junit-4.11.jar.sha1"), "jarsha\n").unwrap();

        let artifact = Artifact::new("junit", "junit", "4.11");
        assert_eq!(resolved_identifier(Some(tmp.path()), &artifact), "pomsha");
    }

    #[test]
    fn local_sidecar_sets_identifier_but_not_online() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("com/megacorp/billing-core/1.0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("billing-core-1.0.jar.sha1"), "localsha\n").unwrap();

        // A locally-installed artifact has sidecars too; residency in the
        // local repo must not count as found-online.
        let artifact = parse_dep_line(
            "+- com.megacorp:billing-core:jar:1.0:compile",
            Some(tmp.path()),
        )
        .unwrap();
        assert_eq!(artifact.sha1, "localsha");
        assert!(!artifact.found_online);
    }

    #[test]
    fn resolved_identifier_falls_back_to_jar_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("junit/junit/4.11");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("junit-4.11.jar.sha1"), "jarsha\n").unwrap();

        let artifact = Artifact::new("junit", "junit", "4.11");
        assert_eq!(resolved_identifier(Some(tmp.path()), &artifact), "jarsha");
        let missing = Artifact::new("junit", "junit", "4.12");
        assert_eq!(resolved_identifier(Some(tmp.path()), &missing), "");
    }

    #[test]
    fn evaluate_output_skips_log_lines() {
        let stdout = "[INFO] Scanning...\n/home/user/.m2/repository\n";
        assert_eq!(
            parse_evaluate_output(stdout).as_deref(),
            Some("/home/user/.m2/repository")
        );
        assert_eq!(parse_evaluate_output("[ERROR] boom\n"), None);
    }
}
