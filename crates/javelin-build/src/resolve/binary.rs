use std::path::PathBuf;
use std::sync::Arc;

use javelin_core::Config;
use javelin_explode::{project, DecompilerPool, Exploder};
use javelin_identify::{ArtifactIdentifier, ArtifactIndex, Labeler};
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::process::CommandRunner;

use crate::binary::InnerMaven;
use crate::maven::MavenBuildTool;
use crate::resolve::Resolver;

/// Binary resolver: explodes the archive, decompiles what needs it, writes
/// the synthesized pom, and publishes a Maven build tool for the result
/// through the slot shared with [`crate::BinaryBuildTool`].
pub struct BinaryResolver {
    archive: PathBuf,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    decompiler: PathBuf,
    slot: InnerMaven,
}

impl BinaryResolver {
    pub fn new(
        archive: PathBuf,
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        decompiler: PathBuf,
        slot: InnerMaven,
    ) -> Self {
        Self {
            archive,
            config,
            runner,
            decompiler,
            slot,
        }
    }

    fn identifier(&self) -> JavelinResult<ArtifactIdentifier> {
        let labeler = Labeler::from_config(
            self.config.dep_open_source_labels_file.as_deref(),
            &self.config.exclude_packages,
        )?;
        let index = if self.config.disable_maven_search {
            None
        } else {
            match self.config.maven_index_path.as_deref() {
                Some(dir) => match ArtifactIndex::open(dir) {
                    Ok(index) => Some(index),
                    Err(err) => {
                        tracing::warn!(%err, "maven index unavailable, identification degrades");
                        None
                    }
                },
                None => None,
            }
        };
        Ok(ArtifactIdentifier::new(index, labeler))
    }

    fn m2_repo(&self) -> PathBuf {
        if let Some(ref dir) = self.config.maven_cache_dir {
            return dir.clone();
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".m2/repository")
    }
}

impl Resolver for BinaryResolver {
    fn resolve_sources(&self, ctx: &CancellationToken) -> JavelinResult<()> {
        // Held for the whole resolution so concurrent get_dependencies
        // callers wait instead of observing a half-built project.
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            tracing::debug!(archive = %self.archive.display(), "binary already resolved");
            return Ok(());
        }

        let exploder = Exploder::new(self.identifier()?, self.m2_repo());
        let outcome = exploder.explode(ctx, &self.archive)?;
        if outcome.cancelled {
            // Partial extraction stays on disk until explicit cleanup.
            return Err(JavelinError::Cancelled.into());
        }

        let pool = DecompilerPool::with_runner(
            &self.decompiler,
            self.config.decompile_workers,
            Arc::clone(&self.runner),
        )
        .jvm_max_mem(self.config.jvm_max_mem.clone());
        let discovered = pool.run(
            ctx,
            outcome.jobs.clone(),
            None,
            Some((&exploder, outcome.project_dir.as_path())),
        )?;

        let mut artifacts = outcome.artifacts.clone();
        artifacts.extend(discovered);
        project::write_project_pom(&outcome.project_dir, &artifacts)?;

        if self.config.clean_exploded_bin {
            outcome.cleanup_exploded()?;
        }

        *slot = Some(MavenBuildTool::new(
            outcome.project_dir.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
        ));
        tracing::info!(
            archive = %self.archive.display(),
            project = %outcome.project_dir.display(),
            "binary resolved into synthesized project"
        );
        Ok(())
    }
}
