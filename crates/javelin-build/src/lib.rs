//! Build-tool abstraction and dependency resolution.
//!
//! Detects the build system behind a location (Maven tree, Gradle tree, or
//! opaque binary), drives the appropriate external tree command, and parses
//! its output into a per-build-file dependency DAG. Each variant embeds a
//! single-flight cache keyed by the build file's content hash, and pairs
//! with a resolver that materializes sources for the language server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use javelin_core::DependencyNode;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::JavelinResult;

pub mod binary;
pub mod cache;
pub mod factory;
pub mod gradle;
pub mod jdk;
pub mod maven;
pub mod pom;
pub mod resolve;

pub use binary::BinaryBuildTool;
pub use cache::DepCache;
pub use factory::{detect, rewrite_maven_location};
pub use gradle::GradleBuildTool;
pub use maven::MavenBuildTool;
pub use resolve::Resolver;

/// Per-build-file dependency DAG: URI → ordered root nodes.
pub type DepMap = BTreeMap<String, Vec<DependencyNode>>;

/// Timeout for the external dependency-tree commands.
pub(crate) const TREE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A detected build system bound to its resolver.
pub trait BuildTool: Send + Sync {
    /// Parse (or serve from cache) the dependency DAG.
    fn get_dependencies(&self, ctx: &CancellationToken) -> JavelinResult<DepMap>;

    /// The local Maven repository backing this tool, when known.
    fn local_repo_path(&self) -> Option<PathBuf>;

    /// The resolver that downloads or decompiles sources for this tool.
    fn resolver(&self, decompiler: &Path) -> Box<dyn Resolver>;

    /// Whether resolution must run before `get_dependencies` can succeed.
    /// True only for binary inputs.
    fn should_resolve(&self) -> bool {
        false
    }
}

/// `file://` URI for a build file, the DAG's map key.
pub fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}
