use serde::{Deserialize, Serialize};

/// Packaging of a resolved Java artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Packaging {
    #[default]
    Jar,
    War,
    Ear,
    Pom,
    Class,
}

impl Packaging {
    /// Parse a Maven packaging string; unknown values default to `jar`.
    pub fn parse(s: &str) -> Self {
        match s {
            "war" => Self::War,
            "ear" => Self::Ear,
            "pom" => Self::Pom,
            "class" => Self::Class,
            _ => Self::Jar,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jar => "jar",
            Self::War => "war",
            Self::Ear => "ear",
            Self::Pom => "pom",
            Self::Class => "class",
        }
    }

    /// Archive packagings can be exploded and decompiled recursively.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Jar | Self::War | Self::Ear)
    }
}

/// The unit of dependency identity: Maven coordinates plus provenance.
///
/// Constructed by a parser or the artifact identifier and frozen thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub packaging: Packaging,
    /// Whether the coordinates were located via the index or embedded
    /// metadata, as opposed to inferred from structure.
    #[serde(default)]
    pub found_online: bool,
    /// Hex SHA-1 of the resolved artifact file; empty when unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha1: String,
}

impl Artifact {
    /// A new artifact from the identity triple, everything else defaulted.
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// An artifact is complete iff group, artifact, and version are all
    /// non-empty. Incomplete artifacts must never appear in a generated
    /// build file.
    pub fn is_complete(&self) -> bool {
        !self.group_id.is_empty() && !self.artifact_id.is_empty() && !self.version.is_empty()
    }

    /// Display name used for labeling and output: `group.artifact`.
    pub fn display_name(&self) -> String {
        if self.group_id.is_empty() {
            self.artifact_id.clone()
        } else {
            format!("{}.{}", self.group_id, self.artifact_id)
        }
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id, self.artifact_id, self.version
        )
    }
}
