use std::path::Path;

use regex::Regex;

use javelin_util::errors::{JavelinError, JavelinResult};

/// Label attached to dependencies matching a configured open-source pattern.
pub const OPEN_SOURCE_LABEL: &str = "konveyor.io/dep-source=open-source";
/// Label attached to dependencies that matched nothing and were not found
/// online.
pub const INTERNAL_LABEL: &str = "konveyor.io/dep-source=internal";
/// Language label attached to every dependency this provider emits.
pub const JAVA_LABEL: &str = "konveyor.io/language=java";

/// Pattern → label tagger for the open-source vs internal split.
///
/// The labeler never mutates the DAG; labels are consumed downstream for
/// rule selectivity.
#[derive(Debug, Clone, Default)]
pub struct Labeler {
    open_source: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl Labeler {
    pub fn new(open_source: Vec<Regex>, excludes: Vec<Regex>) -> Self {
        Self {
            open_source,
            excludes,
        }
    }

    /// Build from the configured open-source labels file and exclude list.
    pub fn from_config(
        labels_file: Option<&Path>,
        exclude_patterns: &[String],
    ) -> JavelinResult<Self> {
        let open_source = match labels_file {
            Some(path) => load_patterns_file(path)?,
            None => Vec::new(),
        };
        let excludes = exclude_patterns
            .iter()
            .map(|p| compile(p))
            .collect::<JavelinResult<Vec<_>>>()?;
        Ok(Self::new(open_source, excludes))
    }

    /// Labels for one dependency display name.
    pub fn label(&self, name: &str, found_online: bool) -> Vec<String> {
        let mut labels = Vec::new();
        if self.is_open_source(name) {
            labels.push(OPEN_SOURCE_LABEL.to_string());
        }
        if !labels.contains(&OPEN_SOURCE_LABEL.to_string()) && !found_online {
            labels.push(INTERNAL_LABEL.to_string());
        }
        labels.push(JAVA_LABEL.to_string());
        labels
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excludes.iter().any(|re| re.is_match(name))
    }

    pub fn is_open_source(&self, name: &str) -> bool {
        self.open_source.iter().any(|re| re.is_match(name))
    }

    /// Match a group id against the open-source patterns, progressively
    /// dropping the last dotted segment until a match or exhaustion.
    ///
    /// `com.fasterxml.jackson.core` matches a `com.fasterxml.*` pattern via
    /// the `com.fasterxml` prefix.
    pub fn matches_open_source_prefix(&self, group: &str) -> bool {
        let mut candidate = group;
        loop {
            if candidate.is_empty() {
                return false;
            }
            if self.is_open_source(candidate) {
                return true;
            }
            match candidate.rsplit_once('.') {
                Some((head, _)) => candidate = head,
                None => return false,
            }
        }
    }
}

/// Load one regex per line; blank lines and `#` comments are skipped.
pub fn load_patterns_file(path: &Path) -> JavelinResult<Vec<Regex>> {
    let content = std::fs::read_to_string(path).map_err(JavelinError::Io)?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(compile)
        .collect()
}

fn compile(pattern: &str) -> JavelinResult<Regex> {
    Regex::new(pattern).map_err(|err| {
        JavelinError::Config {
            message: format!("invalid pattern `{pattern}`: {err}"),
        }
        .into()
    })
}
