use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use javelin_core::{Artifact, Config, Packaging};
use javelin_explode::{DecompileJob, DecompilerPool};
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::fs as jfs;
use javelin_util::process::{CommandBuilder, CommandRunner};

use crate::maven::maven_settings_args;
use crate::resolve::Resolver;
use crate::TREE_TIMEOUT;

/// Marker Maven prints for source artifacts it could not download.
const UNRESOLVED_MARKER: &str = "The following artifacts could not be resolved:";

/// One `g:a:jar:sources:v` coordinate inside an unresolved warning.
static SOURCES_COORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_.\-]+):([A-Za-z0-9_.\-]+):jar:sources:([A-Za-z0-9_.\-]+)").unwrap()
});

/// Maven source resolver: downloads sources through the offline plugin and
/// decompiles artifacts whose source JARs do not exist.
pub struct MavenSourcesResolver {
    project_dir: PathBuf,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    decompiler: PathBuf,
    local_repo: Option<PathBuf>,
}

impl MavenSourcesResolver {
    pub fn new(
        project_dir: PathBuf,
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        decompiler: PathBuf,
        local_repo: Option<PathBuf>,
    ) -> Self {
        Self {
            project_dir,
            config,
            runner,
            decompiler,
            local_repo,
        }
    }
}

impl Resolver for MavenSourcesResolver {
    fn resolve_sources(&self, ctx: &CancellationToken) -> JavelinResult<()> {
        let Some(repo) = self
            .local_repo
            .as_ref()
            .filter(|repo| !repo.as_os_str().is_empty())
        else {
            tracing::warn!("no local repository path, skipping source resolution");
            return Ok(());
        };

        let cmd = CommandBuilder::new("mvn")
            .arg("-B")
            .args(maven_settings_args(&self.config, &self.project_dir)?)
            .arg("de.qaware.maven:go-offline-maven-plugin:resolve-dependencies")
            .arg("-DdownloadSources")
            .cwd(&self.project_dir)
            .timeout(TREE_TIMEOUT)
            .cancellation(ctx.clone());
        let output = self.runner.run(&cmd)?;
        if !output.success() {
            return Err(JavelinError::Invocation {
                tool: "mvn".into(),
                code: output.code,
                output: output.combined(),
            }
            .into());
        }

        let misses = parse_unresolved_sources(&output.combined());
        if misses.is_empty() {
            return Ok(());
        }
        tracing::info!(count = misses.len(), "decompiling artifacts without sources");

        let mut jobs = Vec::new();
        for artifact in &misses {
            match decompile_job_for(repo, artifact) {
                Some(job) => jobs.push(job),
                None => {
                    tracing::warn!(%artifact, "jar not present in local repository, skipping");
                }
            }
        }

        let pool = DecompilerPool::with_runner(
            &self.decompiler,
            self.config.decompile_workers,
            Arc::clone(&self.runner),
        )
        .jvm_max_mem(self.config.jvm_max_mem.clone());
        pool.run(ctx, jobs.clone(), None, None)?;

        for job in &jobs {
            attach_as_sources(job)?;
        }
        Ok(())
    }
}

/// Coordinates of unresolved source artifacts in the plugin's warnings.
pub(crate) fn parse_unresolved_sources(output: &str) -> Vec<Artifact> {
    let mut misses = Vec::new();
    for line in output.lines() {
        let Some(pos) = line.find(UNRESOLVED_MARKER) else {
            continue;
        };
        for captures in SOURCES_COORD.captures_iter(&line[pos..]) {
            let mut artifact =
                Artifact::new(&captures[1], &captures[2], &captures[3]);
            artifact.classifier = Some("sources".to_string());
            artifact.packaging = Packaging::Jar;
            misses.push(artifact);
        }
    }
    misses
}

/// Job decompiling `<repo>/<g>/<a>/<v>/<a>-<v>.jar` into a sibling
/// `decompiled/` directory. `None` when the JAR is absent.
pub(crate) fn decompile_job_for(repo: &Path, artifact: &Artifact) -> Option<DecompileJob> {
    let version_dir = repo
        .join(artifact.group_id.replace('.', "/"))
        .join(&artifact.artifact_id)
        .join(&artifact.version);
    let jar_name = format!("{}-{}.jar", artifact.artifact_id, artifact.version);
    let jar = version_dir.join(&jar_name);
    if !jar.is_file() {
        return None;
    }
    Some(DecompileJob {
        input_path: jar,
        output_path: version_dir.join("decompiled").join(jar_name),
        artifact: Artifact {
            classifier: None,
            ..artifact.clone()
        },
        m2_repo: None,
    })
}

/// Rename a decompiled JAR to `<a>-<v>-sources.jar` beside the original so
/// the language server attaches it as sources.
fn attach_as_sources(job: &DecompileJob) -> JavelinResult<()> {
    if !job.output_path.is_file() {
        tracing::warn!(output = %job.output_path.display(), "decompiler produced no archive");
        return Ok(());
    }
    let version_dir = job
        .input_path
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let sources_name = format!(
        "{}-{}-sources.jar",
        job.artifact.artifact_id, job.artifact.version
    );
    jfs::move_file(&job.output_path, &version_dir.join(sources_name)).map_err(JavelinError::Io)?;
    Ok(())
}
