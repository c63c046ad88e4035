use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use javelin_core::Config;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::process::CommandRunner;

use crate::maven::MavenBuildTool;
use crate::resolve::BinaryResolver;
use crate::{BuildTool, DepMap, Resolver};

/// Shared slot the binary resolver populates once explosion finishes.
pub(crate) type InnerMaven = Arc<Mutex<Option<MavenBuildTool>>>;

/// Build tool for opaque JAR/WAR/EAR inputs.
///
/// Holds a lazily-created Maven build tool pointing at the project the
/// binary resolver synthesizes. `get_dependencies` waits on the shared
/// mutex, so callers block while resolution is in flight and fail cleanly
/// when it never ran.
pub struct BinaryBuildTool {
    archive: PathBuf,
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    inner: InnerMaven,
}

impl BinaryBuildTool {
    pub fn new(
        archive: impl Into<PathBuf>,
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            archive: archive.into(),
            config,
            runner,
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }
}

impl BuildTool for BinaryBuildTool {
    fn get_dependencies(&self, ctx: &CancellationToken) -> JavelinResult<DepMap> {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match inner.as_ref() {
            Some(maven) => maven.get_dependencies(ctx),
            None => Err(JavelinError::Generic {
                message: format!(
                    "binary {} has not been resolved yet; run the resolver first",
                    self.archive.display()
                ),
            }
            .into()),
        }
    }

    fn local_repo_path(&self) -> Option<PathBuf> {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.as_ref().and_then(|maven| maven.local_repo_path())
    }

    fn resolver(&self, decompiler: &Path) -> Box<dyn Resolver> {
        Box::new(BinaryResolver::new(
            self.archive.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
            decompiler.to_path_buf(),
            Arc::clone(&self.inner),
        ))
    }

    fn should_resolve(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use javelin_util::process::DefaultCommandRunner;

    #[test]
    fn unresolved_binary_reports_an_error() {
        let tool = BinaryBuildTool::new(
            "/tmp/app.war",
            Arc::new(Config::default()),
            Arc::new(DefaultCommandRunner),
        );
        assert!(tool.should_resolve());
        let err = tool.get_dependencies(&CancellationToken::new()).unwrap_err();
        assert!(err.to_string().contains("has not been resolved"));
    }
}
