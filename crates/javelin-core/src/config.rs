use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use javelin_util::errors::{JavelinError, JavelinResult};

/// How much work the provider performs for a source input.
///
/// Binary inputs always resolve fully; for source trees the caller chooses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMode {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "source-only")]
    SourceOnly,
}

/// Provider settings, deserialized from a JSON settings file.
///
/// Key names match the provider configuration contract verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Extension JAR paths forwarded to the language server.
    pub bundles: Vec<PathBuf>,
    /// Language-server workspace directory.
    pub workspace: Option<PathBuf>,
    /// Maven settings file forwarded as `-s`.
    pub maven_settings_file: Option<PathBuf>,
    /// Custom local repository; a settings file pinning it is synthesized.
    pub maven_cache_dir: Option<PathBuf>,
    /// Forward `-Dmaven.wagon.http.ssl.insecure=true`.
    pub maven_insecure: bool,
    /// Delete exploded directories on stop.
    pub clean_exploded_bin: bool,
    /// Forwarded to spawned JVMs as `-Xmx`.
    pub jvm_max_mem: Option<String>,
    /// Path to the external decompiler JAR.
    pub fern_flower_path: Option<PathBuf>,
    /// Skip the SHA-1 index lookup tier entirely.
    pub disable_maven_search: bool,
    /// Gradle task file injected for source downloads.
    pub gradle_sources_task_file: Option<PathBuf>,
    /// Directory containing `maven-index.txt` and `maven-index.idx`.
    pub maven_index_path: Option<PathBuf>,
    /// File listing open-source group regexes, one per line.
    pub dep_open_source_labels_file: Option<PathBuf>,
    /// Dependency-name regexes excluded from labeling.
    pub exclude_packages: Vec<String>,
    pub analysis_mode: AnalysisMode,
    /// Opt-in: parse the POM directly when the tree command fails.
    pub fallback_on_tree_failure: bool,
    /// Decompiler worker count.
    #[serde(default = "default_workers")]
    pub decompile_workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    /// Load settings from a JSON file.
    pub fn from_path(path: &Path) -> JavelinResult<Self> {
        let content = std::fs::read_to_string(path).map_err(JavelinError::Io)?;
        serde_json::from_str(&content).map_err(|err| {
            JavelinError::Config {
                message: format!("{}: {err}", path.display()),
            }
            .into()
        })
    }
}
