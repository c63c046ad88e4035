use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use javelin_core::{Artifact, Config};
use javelin_explode::{DecompileJob, DecompilerPool};
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::fs as jfs;
use javelin_util::process::CommandRunner;

use crate::gradle::wrapper_command;
use crate::resolve::Resolver;
use crate::TREE_TIMEOUT;

/// Injected task reporting dependencies whose source JARs are missing.
const SOURCES_TASK: &str = "konveyorDownloadSources";

/// `Found 0 sources for g:a:v` lines from the injected task.
static NO_SOURCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Found 0 sources for ([^\s:]+):([^\s:]+):(\S+)").unwrap());

/// Gradle source resolver: temporarily appends the download task to the
/// build file, runs it, and decompiles the artifacts it could not cover.
pub struct GradleSourcesResolver {
    project_dir: PathBuf,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    decompiler: PathBuf,
}

impl GradleSourcesResolver {
    pub fn new(
        project_dir: PathBuf,
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        decompiler: PathBuf,
    ) -> Self {
        Self {
            project_dir,
            config,
            runner,
            decompiler,
        }
    }

    fn run_sources_task(&self, ctx: &CancellationToken, task_file: &Path) -> JavelinResult<String> {
        let build_file = self.project_dir.join("build.gradle");

        // The guard restores the original build file on every exit path,
        // including errors and panics below.
        let _guard = BuildFileGuard::append(&build_file, task_file)?;

        let cmd = wrapper_command(&self.project_dir)?
            .arg(SOURCES_TASK)
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
        Ok(output.combined())
    }
}

impl Resolver for GradleSourcesResolver {
    fn resolve_sources(&self, ctx: &CancellationToken) -> JavelinResult<()> {
        let Some(task_file) = self.config.gradle_sources_task_file.clone() else {
            tracing::warn!("gradleSourcesTaskFile is not configured, skipping source resolution");
            return Ok(());
        };
        let output = self.run_sources_task(ctx, &task_file)?;
        let misses = parse_source_misses(&output);
        if misses.is_empty() {
            return Ok(());
        }
        tracing::info!(count = misses.len(), "decompiling Gradle artifacts without sources");

        let cache_root = gradle_cache_root();
        let mut jobs = Vec::new();
        for artifact in &misses {
            match locate_in_gradle_cache(&cache_root, artifact) {
                Some(jar) => {
                    let parent = jar.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
                    let name = jar
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    jobs.push(DecompileJob {
                        input_path: jar,
                        output_path: parent.join("decompiled").join(name),
                        artifact: artifact.clone(),
                        m2_repo: None,
                    });
                }
                None => {
                    tracing::warn!(%artifact, "jar not found in Gradle cache, skipping");
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
            if !job.output_path.is_file() {
                continue;
            }
            let target = job
                .input_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(format!(
                    "{}-{}-sources.jar",
                    job.artifact.artifact_id, job.artifact.version
                ));
            jfs::move_file(&job.output_path, &target).map_err(JavelinError::Io)?;
        }
        Ok(())
    }
}

/// Swap guard: build file holds `original + task` while alive, `original`
/// again on drop.
struct BuildFileGuard {
    path: PathBuf,
    original: Vec<u8>,
}

impl BuildFileGuard {
    fn append(build_file: &Path, task_file: &Path) -> JavelinResult<Self> {
        let original = std::fs::read(build_file).map_err(JavelinError::Io)?;
        let task = std::fs::read(task_file).map_err(JavelinError::Io)?;
        let mut combined = original.clone();
        combined.push(b'\n');
        combined.extend_from_slice(&task);
        std::fs::write(build_file, combined).map_err(JavelinError::Io)?;
        Ok(Self {
            path: build_file.to_path_buf(),
            original,
        })
    }
}

impl Drop for BuildFileGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::write(&self.path, &self.original) {
            tracing::error!(
                build_file = %self.path.display(),
                %err,
                "failed to restore build file"
            );
        }
    }
}

pub(crate) fn parse_source_misses(output: &str) -> Vec<Artifact> {
    output
        .lines()
        .filter_map(|line| NO_SOURCES.captures(line))
        .map(|captures| Artifact::new(&captures[1], &captures[2], &captures[3]))
        .collect()
}

fn gradle_cache_root() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".gradle/caches/modules-2/files-2.1")
}

/// Walk the cache below the artifact's group directory for
/// `<artifact>-<version>.jar`. The layout nests a content hash between the
/// version directory and the file, so a walk beats path construction.
pub(crate) fn locate_in_gradle_cache(cache_root: &Path, artifact: &Artifact) -> Option<PathBuf> {
    let group_dir = cache_root.join(&artifact.group_id);
    if !group_dir.is_dir() {
        return None;
    }
    let wanted = format!("{}-{}.jar", artifact.artifact_id, artifact.version);
    WalkDir::new(group_dir)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file()
                && entry.file_name().to_string_lossy() == wanted.as_str()
        })
        .map(|entry| entry.into_path())
}
