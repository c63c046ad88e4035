use std::path::Path;
use std::sync::Mutex;

use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::hash;

use crate::DepMap;

/// Content-hash-keyed single-flight cache of dependency results.
///
/// Each build tool embeds one, keyed by its build file. Concurrent callers
/// either hit the cache or serialize behind the one in-flight parse; the
/// external command runs at most once per build-file content hash. Errors
/// are never cached — every call re-attempts, with the serialization
/// preventing thundering herds.
#[derive(Debug, Default)]
pub struct DepCache {
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    /// SHA-256 of the build file at the last successful parse.
    hash: Option<String>,
    graph: Option<DepMap>,
}

impl DepCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached graph when `build_file` is unchanged, otherwise run
    /// `parse` under the lock and store its result.
    pub fn get_or_parse<F>(&self, build_file: &Path, parse: F) -> JavelinResult<DepMap>
    where
        F: FnOnce() -> JavelinResult<DepMap>,
    {
        // A poisoned lock means a previous parse panicked; the entry is
        // stale at worst, so recover and continue.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let current = hash::sha256_file(build_file).map_err(JavelinError::Io)?;
        if state.hash.as_deref() == Some(current.as_str()) {
            if let Some(ref graph) = state.graph {
                tracing::debug!(build_file = %build_file.display(), "dependency cache hit");
                return Ok(graph.clone());
            }
        }

        let graph = parse()?;
        state.hash = Some(current);
        state.graph = Some(graph.clone());
        Ok(graph)
    }
}
