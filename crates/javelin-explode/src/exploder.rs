use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use javelin_core::{Artifact, Packaging};
use javelin_identify::ArtifactIdentifier;
use javelin_util::cancel::CancellationToken;
use javelin_util::errors::{JavelinError, JavelinResult};
use javelin_util::fs as jfs;

use crate::pool::DecompileJob;

/// Decompiler output markers for classes it could not handle.
const UNPARSABLE_MARKERS: [&str; 2] = ["unparsable", "NonParsable"];

/// Recursive archive decomposition into a synthesized Maven-style project
/// plus a list of decompile jobs.
#[derive(Debug, Clone)]
pub struct Exploder {
    identifier: ArtifactIdentifier,
    m2_repo: PathBuf,
}

/// Result of exploding one archive.
///
/// Cancellation mid-walk does not discard work: the jobs and artifacts
/// accumulated up to that point are returned with `cancelled` set, and the
/// caller decides whether to surface a cancellation error.
#[derive(Debug, Default)]
pub struct ExplodeOutcome {
    pub project_dir: PathBuf,
    pub exploded_dir: PathBuf,
    pub jobs: Vec<DecompileJob>,
    pub artifacts: Vec<Artifact>,
    /// The walk stopped early because the context was cancelled.
    pub cancelled: bool,
}

impl ExplodeOutcome {
    /// Delete the extraction directory. Only invoked on explicit caller
    /// request (`cleanExplodedBin`).
    pub fn cleanup_exploded(&self) -> JavelinResult<()> {
        if self.exploded_dir.is_dir() {
            std::fs::remove_dir_all(&self.exploded_dir).map_err(JavelinError::Io)?;
        }
        Ok(())
    }
}

impl Exploder {
    pub fn new(identifier: ArtifactIdentifier, m2_repo: impl Into<PathBuf>) -> Self {
        Self {
            identifier,
            m2_repo: m2_repo.into(),
        }
    }

    pub fn m2_repo(&self) -> &Path {
        &self.m2_repo
    }

    /// Explode a top-level JAR/WAR/EAR.
    ///
    /// Creates `<dir>/<name>-<ext>-exploded` for extraction and
    /// `<dir>/java-project` (random suffix when taken) for the synthesized
    /// project tree.
    pub fn explode(&self, ctx: &CancellationToken, archive: &Path) -> JavelinResult<ExplodeOutcome> {
        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        let (stem, ext) = archive_label(archive);

        let exploded_dir = parent.join(format!("{stem}-{ext}-exploded"));
        ensure_dir_exec(&exploded_dir).map_err(JavelinError::Io)?;

        let project_dir = if parent.join("java-project").exists() {
            tempfile::Builder::new()
                .prefix("java-project-")
                .tempdir_in(parent)
                .map_err(JavelinError::Io)?
                .keep()
        } else {
            let dir = parent.join("java-project");
            jfs::ensure_dir(&dir).map_err(JavelinError::Io)?;
            dir
        };
        jfs::ensure_dir(&project_dir.join("src/main/java")).map_err(JavelinError::Io)?;

        tracing::info!(
            archive = %archive.display(),
            project = %project_dir.display(),
            "exploding archive"
        );

        let (jobs, artifacts, cancelled) =
            self.explode_archive(ctx, archive, &exploded_dir, &project_dir)?;
        Ok(ExplodeOutcome {
            project_dir,
            exploded_dir,
            jobs,
            artifacts,
            cancelled,
        })
    }

    /// Explode an archive produced mid-pipeline (a decompiled nested JAR)
    /// into an existing project tree.
    pub fn explode_nested(
        &self,
        ctx: &CancellationToken,
        archive: &Path,
        project_dir: &Path,
    ) -> JavelinResult<ExplodeOutcome> {
        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        let (stem, ext) = archive_label(archive);
        let exploded_dir = parent.join(format!("{stem}-{ext}-exploded"));
        ensure_dir_exec(&exploded_dir).map_err(JavelinError::Io)?;
        let (jobs, artifacts, cancelled) =
            self.explode_archive(ctx, archive, &exploded_dir, project_dir)?;
        Ok(ExplodeOutcome {
            project_dir: project_dir.to_path_buf(),
            exploded_dir,
            jobs,
            artifacts,
            cancelled,
        })
    }

    /// Walk one archive, extracting and classifying every entry.
    ///
    /// The third tuple element reports cancellation; the jobs and artifacts
    /// gathered before the cancelled check are still returned.
    fn explode_archive(
        &self,
        ctx: &CancellationToken,
        archive_path: &Path,
        exploded_dir: &Path,
        project_dir: &Path,
    ) -> JavelinResult<(Vec<DecompileJob>, Vec<Artifact>, bool)> {
        let file = File::open(archive_path).map_err(JavelinError::Io)?;
        let mut archive = ZipArchive::new(file).map_err(|err| JavelinError::Parse {
            message: format!("failed to read {}: {err}", archive_path.display()),
        })?;

        let (stem, ext) = archive_label(archive_path);
        let resources_dir = project_dir.join(format!("{stem}-{ext}-exploded"));
        let source_root = project_dir.join("src/main/java");

        let mut jobs = Vec::new();
        let mut artifacts = Vec::new();
        let mut seen_class_dirs = HashSet::new();

        for i in 0..archive.len() {
            if ctx.is_cancelled() {
                tracing::debug!(
                    archive = %archive_path.display(),
                    "cancelled mid-walk, returning partial results"
                );
                return Ok((jobs, artifacts, true));
            }

            let rel;
            let is_dir;
            {
                let entry = archive.by_index(i).map_err(|err| JavelinError::Parse {
                    message: format!("bad entry in {}: {err}", archive_path.display()),
                })?;
                let raw_name = entry.name().to_string();
                rel = jfs::sanitize_entry_name(&raw_name);
                if rel.as_os_str().is_empty() {
                    continue;
                }
                if !jfs::is_within(exploded_dir, &rel) {
                    return Err(JavelinError::PathTraversal { entry: raw_name }.into());
                }
                is_dir = entry.is_dir();
            }

            let file_name = rel
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if UNPARSABLE_MARKERS.iter().any(|m| file_name == *m) {
                continue;
            }

            let dest = exploded_dir.join(&rel);
            if is_dir {
                ensure_dir_exec(&dest).map_err(JavelinError::Io)?;
                continue;
            }
            if let Some(parent) = dest.parent() {
                ensure_dir_exec(parent).map_err(JavelinError::Io)?;
            }
            {
                let mut entry = archive.by_index(i).map_err(|err| JavelinError::Parse {
                    message: format!("bad entry in {}: {err}", archive_path.display()),
                })?;
                let mut out = File::create(&dest).map_err(JavelinError::Io)?;
                io::copy(&mut entry, &mut out).map_err(JavelinError::Io)?;
            }

            match entry_kind(&rel) {
                EntryKind::Class => {
                    let stripped = strip_source_prefix(&rel);
                    let output = source_root.join(stripped.with_extension("java"));
                    jobs.push(DecompileJob {
                        input_path: dest,
                        output_path: output,
                        artifact: Artifact {
                            packaging: Packaging::Class,
                            ..Artifact::default()
                        },
                        m2_repo: None,
                    });
                    if !under_metadata(&rel) {
                        if let Some(artifact) = class_dir_artifact(&stripped, &mut seen_class_dirs)
                        {
                            artifacts.push(artifact);
                        }
                    }
                }
                EntryKind::Java => {
                    let stripped = strip_source_prefix(&rel);
                    jfs::move_file(&dest, &source_root.join(stripped))
                        .map_err(JavelinError::Io)?;
                }
                EntryKind::War => {
                    let nested = self.explode_nested(ctx, &dest, project_dir)?;
                    jobs.extend(nested.jobs);
                    artifacts.extend(nested.artifacts);
                    if nested.cancelled {
                        return Ok((jobs, artifacts, true));
                    }
                }
                EntryKind::Jar => {
                    self.classify_jar(&dest, &file_name, &mut jobs, &mut artifacts);
                }
                EntryKind::Resource => {
                    jfs::move_file(&dest, &resources_dir.join(&rel)).map_err(JavelinError::Io)?;
                }
            }
        }

        Ok((jobs, artifacts, false))
    }

    /// Identify a nested JAR. Known artifacts are copied into the local
    /// repository; everything else becomes a decompile job.
    fn classify_jar(
        &self,
        dest: &Path,
        file_name: &str,
        jobs: &mut Vec<DecompileJob>,
        artifacts: &mut Vec<Artifact>,
    ) {
        let identified = match self.identifier.identify(dest) {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::warn!(jar = %dest.display(), %err, "identification failed");
                Artifact::default()
            }
        };

        if identified.is_complete() && identified.found_online {
            let repo_dir = self
                .m2_repo
                .join(identified.group_id.replace('.', "/"))
                .join(&identified.artifact_id)
                .join(&identified.version);
            let copy = jfs::ensure_dir(&repo_dir)
                .and_then(|()| std::fs::copy(dest, repo_dir.join(file_name)).map(|_| ()));
            match copy {
                Ok(()) => {
                    tracing::debug!(artifact = %identified, "copied known artifact into local repo");
                    artifacts.push(identified);
                    return;
                }
                Err(err) => {
                    tracing::warn!(jar = %dest.display(), %err, "copy into local repo failed");
                }
            }
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let (stem, _) = archive_label(dest);
        jobs.push(DecompileJob {
            input_path: dest.to_path_buf(),
            output_path: parent.join(format!("{stem}-decompiled")).join(file_name),
            artifact: Artifact {
                packaging: Packaging::Jar,
                ..identified
            },
            m2_repo: Some(self.m2_repo.clone()),
        });
    }
}

enum EntryKind {
    Class,
    Java,
    War,
    Jar,
    Resource,
}

fn entry_kind(rel: &Path) -> EntryKind {
    match rel.extension().and_then(OsStr::to_str) {
        Some("class") => EntryKind::Class,
        Some("java") => EntryKind::Java,
        Some("war") => EntryKind::War,
        Some("jar") => EntryKind::Jar,
        _ => EntryKind::Resource,
    }
}

/// `name.ext` → `("name", "ext")`; extensionless files keep an empty ext.
fn archive_label(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (stem, ext)
}

/// Drop the container prefixes (`WEB-INF/classes`, `META-INF`, …) so the
/// remainder is a plain Java package path.
fn strip_source_prefix(rel: &Path) -> PathBuf {
    let mut components: Vec<&OsStr> = rel.components().map(|c| c.as_os_str()).collect();
    while let Some(first) = components.first() {
        match first.to_string_lossy().as_ref() {
            "WEB-INF" | "META-INF" | "classes" => {
                components.remove(0);
            }
            _ => break,
        }
    }
    components.iter().collect()
}

fn under_metadata(rel: &Path) -> bool {
    matches!(
        rel.components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .as_deref(),
        Some("WEB-INF") | Some("META-INF")
    )
}

/// Application code artifact synthesized from a class directory, emitted
/// once per directory.
fn class_dir_artifact(stripped: &Path, seen: &mut HashSet<PathBuf>) -> Option<Artifact> {
    let dir = stripped.parent().filter(|d| !d.as_os_str().is_empty())?;
    if !seen.insert(dir.to_path_buf()) {
        return None;
    }
    let group = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".");
    let artifact_id = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Some(Artifact {
        group_id: group,
        artifact_id,
        packaging: Packaging::Class,
        ..Artifact::default()
    })
}

/// Create a directory chain, setting execute bits on every directory
/// created so the external decompiler can traverse.
fn ensure_dir_exec(path: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        ensure_dir_exec(parent)?;
    }
    match std::fs::create_dir(path) {
        Ok(()) => jfs::set_exec_bits(path),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use javelin_identify::Labeler;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn identifier() -> ArtifactIdentifier {
        ArtifactIdentifier::new(None, Labeler::default())
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn identifiable_jar() -> Vec<u8> {
        zip_bytes(&[
            (
                "META-INF/maven/com.google.guava/guava/pom.properties",
                b"groupId=com.google.guava\nartifactId=guava\nversion=31.0\n".as_slice(),
            ),
            ("com/google/common/collect/Lists.class", b"".as_slice()),
        ])
    }

    #[test]
    fn war_classes_become_jobs_and_known_jars_land_in_the_repo() {
        let tmp = tempfile::tempdir().unwrap();
        let m2 = tmp.path().join("m2");
        let war = tmp.path().join("app.war");
        let jar = identifiable_jar();
        std::fs::write(
            &war,
            zip_bytes(&[
                ("WEB-INF/classes/com/x/A.class", b"\xca\xfe".as_slice()),
                ("WEB-INF/lib/guava-31.jar", jar.as_slice()),
            ]),
        )
        .unwrap();

        let exploder = Exploder::new(identifier(), &m2);
        let outcome = exploder.explode(&CancellationToken::new(), &war).unwrap();

        // One decompile job, for the class, into the synthesized source tree.
        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert!(job.input_path.ends_with("WEB-INF/classes/com/x/A.class"));
        assert_eq!(
            job.output_path,
            outcome.project_dir.join("src/main/java/com/x/A.java")
        );

        // The identifiable JAR was copied into the local repository.
        let copied = m2.join("com/google/guava/guava/31.0/guava-31.jar");
        assert!(copied.is_file());
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(outcome.artifacts[0].artifact_id, "guava");

        // WEB-INF classes contribute no application artifact.
        assert!(outcome
            .artifacts
            .iter()
            .all(|a| a.packaging != Packaging::Class));
    }

    #[test]
    fn unidentifiable_jar_becomes_a_decompile_job() {
        let tmp = tempfile::tempdir().unwrap();
        let war = tmp.path().join("app.war");
        let nested = zip_bytes(&[("com/megacorp/Secret.class", b"".as_slice())]);
        std::fs::write(
            &war,
            zip_bytes(&[("WEB-INF/lib/secret-1.0.jar", nested.as_slice())]),
        )
        .unwrap();

        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let outcome = exploder.explode(&CancellationToken::new(), &war).unwrap();

        assert_eq!(outcome.jobs.len(), 1);
        let job = &outcome.jobs[0];
        assert!(job
            .output_path
            .ends_with("secret-1.0-decompiled/secret-1.0.jar"));
        assert_eq!(job.artifact.packaging, Packaging::Jar);
        assert!(job.m2_repo.is_some());
    }

    #[test]
    fn application_classes_emit_one_artifact_per_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        std::fs::write(
            &jar,
            zip_bytes(&[
                ("com/x/A.class", b"".as_slice()),
                ("com/x/B.class", b"".as_slice()),
                ("com/y/C.class", b"".as_slice()),
            ]),
        )
        .unwrap();

        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let outcome = exploder.explode(&CancellationToken::new(), &jar).unwrap();

        assert_eq!(outcome.jobs.len(), 3);
        let names: Vec<String> = outcome
            .artifacts
            .iter()
            .map(|a| a.display_name())
            .collect();
        assert_eq!(names, vec!["com.x.x", "com.y.y"]);
    }

    #[test]
    fn slip_entry_aborts_and_writes_nothing_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside");
        std::fs::create_dir(&outside).unwrap();
        let jar = outside.join("evil.jar");
        std::fs::write(&jar, zip_bytes(&[("../evil", b"boom".as_slice())])).unwrap();

        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let err = exploder
            .explode(&CancellationToken::new(), &jar)
            .unwrap_err();
        let err: JavelinError = err.downcast().unwrap();
        assert!(matches!(err, JavelinError::PathTraversal { .. }));
        assert!(!outside.join("evil").exists());
        assert!(!tmp.path().join("evil").exists());
    }

    #[test]
    fn pre_cancelled_token_yields_no_work() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        std::fs::write(&jar, zip_bytes(&[("com/x/A.class", b"".as_slice())])).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let outcome = exploder.explode(&token, &jar).unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.jobs.is_empty());
        assert!(outcome.artifacts.is_empty());
    }

    #[test]
    fn mid_walk_cancellation_returns_partial_results() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        // The two blobs give the canceller a wide window between the first
        // and last entries.
        let blob = vec![0u8; 64 * 1024 * 1024];
        std::fs::write(
            &jar,
            zip_bytes(&[
                ("com/x/First.class", b"".as_slice()),
                ("data/blob1.bin", blob.as_slice()),
                ("data/blob2.bin", blob.as_slice()),
                ("com/x/Last.class", b"".as_slice()),
            ]),
        )
        .unwrap();

        let token = CancellationToken::new();
        let first_extracted = tmp.path().join("app-jar-exploded/com/x/First.class");
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                while !first_extracted.exists() {
                    std::thread::sleep(std::time::Duration::from_micros(200));
                }
                token.cancel();
            })
        };

        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let outcome = exploder.explode(&token, &jar).unwrap();
        canceller.join().unwrap();

        assert!(outcome.cancelled);
        // Work done before the cancelled check survives.
        assert!(outcome
            .jobs
            .iter()
            .any(|job| job.output_path.ends_with("First.java")));
        // Entries past the cancellation point were never classified.
        assert!(!outcome
            .jobs
            .iter()
            .any(|job| job.output_path.ends_with("Last.java")));
    }

    #[test]
    fn decompiler_markers_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        std::fs::write(
            &jar,
            zip_bytes(&[
                ("com/x/unparsable", b"".as_slice()),
                ("com/x/NonParsable", b"".as_slice()),
                ("readme.txt", b"hi".as_slice()),
            ]),
        )
        .unwrap();

        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let outcome = exploder.explode(&CancellationToken::new(), &jar).unwrap();
        assert!(outcome.jobs.is_empty());
        // The resource moved into the project tree.
        assert!(outcome
            .project_dir
            .join("app-jar-exploded/readme.txt")
            .is_file());
    }

    #[test]
    fn second_explosion_gets_a_randomized_project_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = tmp.path().join("app.jar");
        std::fs::write(&jar, zip_bytes(&[("readme.txt", b"hi".as_slice())])).unwrap();

        let exploder = Exploder::new(identifier(), tmp.path().join("m2"));
        let first = exploder.explode(&CancellationToken::new(), &jar).unwrap();
        let second = exploder.explode(&CancellationToken::new(), &jar).unwrap();
        assert_eq!(first.project_dir, tmp.path().join("java-project"));
        assert_ne!(second.project_dir, first.project_dir);
        assert!(second
            .project_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("java-project-"));
    }
}
