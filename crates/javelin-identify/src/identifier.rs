use std::fs::File;
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use zip::ZipArchive;

use javelin_core::{Artifact, Packaging};
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::hash;

use crate::index::ArtifactIndex;
use crate::labeler::Labeler;

static POM_PROPERTIES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^META-INF/maven/[^/]+/[^/]+/pom\.properties$").unwrap());

/// Tiered identification of an opaque JAR:
///
/// 1. SHA-1 lookup in the [`ArtifactIndex`];
/// 2. embedded `pom.properties` build metadata;
/// 3. inference from the class directory structure.
///
/// The caller decides how to treat incomplete results (decompile locally
/// versus use as-is).
#[derive(Debug, Clone)]
pub struct ArtifactIdentifier {
    index: Option<ArtifactIndex>,
    labeler: Labeler,
}

impl ArtifactIdentifier {
    pub fn new(index: Option<ArtifactIndex>, labeler: Labeler) -> Self {
        Self { index, labeler }
    }

    /// Identify `jar`, trying each tier in order.
    pub fn identify(&self, jar: &Path) -> JavelinResult<Artifact> {
        let sha1 = hash::sha1_file(jar).map_err(JavelinError::Io)?;

        if let Some(ref index) = self.index {
            if let Some(artifact) = index.lookup(&sha1)? {
                tracing::debug!(%artifact, "identified via index");
                return Ok(artifact);
            }
        }

        if let Some(mut artifact) = read_pom_properties(jar)? {
            artifact.sha1 = sha1;
            artifact.found_online = true;
            tracing::debug!(%artifact, "identified via embedded pom.properties");
            return Ok(artifact);
        }

        let mut artifact = infer_from_layout(jar)?;
        artifact.sha1 = sha1;
        artifact.found_online = self.labeler.matches_open_source_prefix(&artifact.group_id);
        tracing::debug!(%artifact, online = artifact.found_online, "identified structurally");
        Ok(artifact)
    }
}

/// Read coordinates from an embedded `META-INF/maven/*/*/pom.properties`.
/// Success requires all of groupId, artifactId, and version.
fn read_pom_properties(jar: &Path) -> JavelinResult<Option<Artifact>> {
    let file = File::open(jar).map_err(JavelinError::Io)?;
    let mut archive = ZipArchive::new(file).map_err(zip_error(jar))?;

    let entry_name = archive
        .file_names()
        .find(|name| POM_PROPERTIES.is_match(name))
        .map(str::to_string);
    let Some(entry_name) = entry_name else {
        return Ok(None);
    };

    let mut content = String::new();
    archive
        .by_name(&entry_name)
        .map_err(zip_error(jar))?
        .read_to_string(&mut content)
        .map_err(JavelinError::Io)?;

    let mut artifact = Artifact::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "groupId" => artifact.group_id = value.trim().to_string(),
            "artifactId" => artifact.artifact_id = value.trim().to_string(),
            "version" => artifact.version = value.trim().to_string(),
            _ => {}
        }
    }
    Ok(artifact.is_complete().then_some(artifact))
}

/// Infer coordinates from the class layout: the longest common directory
/// prefix of the non-metadata, non-inner classes becomes the dotted group,
/// the file stem becomes the artifact. Version is left blank.
fn infer_from_layout(jar: &Path) -> JavelinResult<Artifact> {
    let file = File::open(jar).map_err(JavelinError::Io)?;
    let archive = ZipArchive::new(file).map_err(zip_error(jar))?;

    let mut prefix: Option<Vec<String>> = None;
    for name in archive.file_names() {
        if !name.ends_with(".class")
            || name.starts_with("META-INF/")
            || name.contains('$')
            || name.ends_with("module-info.class")
        {
            continue;
        }
        let dirs: Vec<String> = Path::new(name)
            .parent()
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        prefix = Some(match prefix {
            None => dirs,
            Some(current) => common_prefix(current, &dirs),
        });
    }

    let group = prefix.unwrap_or_default().join(".");
    let artifact_id = jar
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(Artifact {
        group_id: group,
        artifact_id,
        packaging: Packaging::Jar,
        ..Artifact::default()
    })
}

fn common_prefix(current: Vec<String>, next: &[String]) -> Vec<String> {
    current
        .into_iter()
        .zip(next.iter())
        .take_while(|(a, b)| a == *b)
        .map(|(a, _)| a)
        .collect()
}

fn zip_error(jar: &Path) -> impl FnOnce(zip::result::ZipError) -> JavelinError + '_ {
    move |err| JavelinError::Parse {
        message: format!("failed to read archive {}: {err}", jar.display()),
    }
}
