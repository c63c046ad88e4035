use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use javelin_core::Artifact;
use javelin_util::errors::{JavelinError, JavelinResult};

/// Size of one fixed-width index record.
pub const ENTRY_SIZE: u64 = 56;
/// Zero-padded hex SHA-1 key prefix of a record.
const KEY_SIZE: usize = 40;

const DATA_FILE: &str = "maven-index.txt";
const INDEX_FILE: &str = "maven-index.idx";

/// SHA-1 → coordinate lookup over a sorted, fixed-width binary index.
///
/// Two sibling files: a human-inspectable data file with lines of
/// `<sha1> <group:artifact:packaging:classifier:version>`, and a binary
/// index of 56-byte records (40-byte key, 8-byte LE offset, 8-byte LE
/// length) sorted by key. Both are read-only.
#[derive(Debug, Clone)]
pub struct ArtifactIndex {
    data_path: PathBuf,
    index_path: PathBuf,
}

impl ArtifactIndex {
    /// Open the index pair in `dir`. Fails when either file is missing.
    pub fn open(dir: &Path) -> JavelinResult<Self> {
        let data_path = dir.join(DATA_FILE);
        let index_path = dir.join(INDEX_FILE);
        if !data_path.is_file() || !index_path.is_file() {
            return Err(JavelinError::NotFound {
                what: format!("maven index files in {}", dir.display()),
            }
            .into());
        }
        Ok(Self {
            data_path,
            index_path,
        })
    }

    /// Number of records in the index.
    pub fn len(&self) -> JavelinResult<u64> {
        let size = std::fs::metadata(&self.index_path)
            .map_err(JavelinError::Io)?
            .len();
        if size % ENTRY_SIZE != 0 {
            return Err(JavelinError::Parse {
                message: format!(
                    "index file {} is not a multiple of {ENTRY_SIZE} bytes",
                    self.index_path.display()
                ),
            }
            .into());
        }
        Ok(size / ENTRY_SIZE)
    }

    pub fn is_empty(&self) -> JavelinResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Look up a lowercase hex SHA-1. Returns `None` when absent.
    pub fn lookup(&self, sha1: &str) -> JavelinResult<Option<Artifact>> {
        let entries = self.len()?;
        if entries == 0 {
            return Ok(None);
        }
        let mut index = File::open(&self.index_path).map_err(JavelinError::Io)?;
        let Some(slot) = lower_bound(&mut index, entries, sha1)? else {
            return Ok(None);
        };
        let (key, offset, length) = read_entry(&mut index, slot)?;
        if key != sha1 {
            return Ok(None);
        }

        let mut data = File::open(&self.data_path).map_err(JavelinError::Io)?;
        data.seek(SeekFrom::Start(offset)).map_err(JavelinError::Io)?;
        let mut buf = vec![0u8; length as usize];
        data.read_exact(&mut buf).map_err(JavelinError::Io)?;
        let line = String::from_utf8_lossy(&buf);

        let coords = match line.trim_end().split_once(' ') {
            Some((_, coords)) => coords.to_string(),
            None => {
                return Err(JavelinError::Parse {
                    message: format!("malformed index data line: {line}"),
                }
                .into())
            }
        };
        let mut artifact = parse_coordinates(&coords)?;
        artifact.found_online = true;
        artifact.sha1 = sha1.to_string();
        Ok(Some(artifact))
    }
}

/// Least slot whose key is `>= target`, probing only the 40-byte key prefix
/// of each visited record. `None` when every key is smaller.
fn lower_bound<R: Read + Seek>(
    reader: &mut R,
    entries: u64,
    target: &str,
) -> JavelinResult<Option<u64>> {
    let mut lo = 0u64;
    let mut hi = entries;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let key = read_key(reader, mid)?;
        if key.as_str() < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok((lo < entries).then_some(lo))
}

fn read_key<R: Read + Seek>(reader: &mut R, slot: u64) -> JavelinResult<String> {
    reader
        .seek(SeekFrom::Start(slot * ENTRY_SIZE))
        .map_err(JavelinError::Io)?;
    let mut key = [0u8; KEY_SIZE];
    reader.read_exact(&mut key).map_err(JavelinError::Io)?;
    let end = key.iter().position(|&b| b == 0).unwrap_or(KEY_SIZE);
    Ok(String::from_utf8_lossy(&key[..end]).into_owned())
}

fn read_entry<R: Read + Seek>(reader: &mut R, slot: u64) -> JavelinResult<(String, u64, u64)> {
    let key = read_key(reader, slot)?;
    let mut word = [0u8; 8];
    reader.read_exact(&mut word).map_err(JavelinError::Io)?;
    let offset = u64::from_le_bytes(word);
    reader.read_exact(&mut word).map_err(JavelinError::Io)?;
    let length = u64::from_le_bytes(word);
    Ok((key, offset, length))
}

/// Parse the colon-separated coordinate value of a data line.
///
/// The canonical shape is `group:artifact:packaging:classifier:version`
/// with an empty classifier allowed; a bare `group:artifact:version` is
/// accepted for hand-maintained files.
fn parse_coordinates(coords: &str) -> JavelinResult<Artifact> {
    let parts: Vec<&str> = coords.split(':').collect();
    match parts.as_slice() {
        [group, artifact, packaging, classifier, version] => {
            let mut out = Artifact::new(*group, *artifact, *version);
            out.packaging = javelin_core::Packaging::parse(packaging);
            if !classifier.is_empty() {
                out.classifier = Some((*classifier).to_string());
            }
            Ok(out)
        }
        [group, artifact, version] => Ok(Artifact::new(*group, *artifact, *version)),
        _ => Err(JavelinError::Parse {
            message: format!("malformed index coordinates: {coords}"),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Build `(data, idx)` file contents from `(sha1, coords)` pairs.
    /// Pairs must be supplied in key order.
    fn build_index(pairs: &[(&str, &str)]) -> (Vec<u8>, Vec<u8>) {
        let mut data = Vec::new();
        let mut idx = Vec::new();
        for (sha, coords) in pairs {
            let offset = data.len() as u64;
            let line = format!("{sha} {coords}\n");
            data.extend_from_slice(line.as_bytes());
            let mut key = [0u8; 40];
            key[..sha.len()].copy_from_slice(sha.as_bytes());
            idx.extend_from_slice(&key);
            idx.extend_from_slice(&offset.to_le_bytes());
            idx.extend_from_slice(&(line.len() as u64).to_le_bytes());
        }
        (data, idx)
    }

    fn write_index(dir: &Path, pairs: &[(&str, &str)]) {
        let (data, idx) = build_index(pairs);
        std::fs::write(dir.join(DATA_FILE), data).unwrap();
        std::fs::write(dir.join(INDEX_FILE), idx).unwrap();
    }

    const SPRING_SHA: &str = "dd4295f0567deb2cc629dd647d2f055268c2fd3e";

    fn sample_pairs() -> Vec<(&'static str, &'static str)> {
        vec![
            (
                "0b1f2d3c4e5a6978695a4b3c2d1e0f1a2b3c4d5e",
                "junit:junit:jar::4.11",
            ),
            (
                SPRING_SHA,
                "org.springframework:spring-core:jar::3.1.2.RELEASE",
            ),
            (
                "ffa1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3",
                "org.hamcrest:hamcrest-core:jar::1.3",
            ),
        ]
    }

    #[test]
    fn lookup_round_trips_every_entry() {
        let tmp = tempfile::tempdir().unwrap();
        write_index(tmp.path(), &sample_pairs());
        let index = ArtifactIndex::open(tmp.path()).unwrap();
        assert_eq!(index.len().unwrap(), 3);

        let artifact = index.lookup(SPRING_SHA).unwrap().unwrap();
        assert_eq!(artifact.group_id, "org.springframework");
        assert_eq!(artifact.artifact_id, "spring-core");
        assert_eq!(artifact.version, "3.1.2.RELEASE");
        assert_eq!(artifact.classifier, None);
        assert!(artifact.found_online);
        assert_eq!(artifact.sha1, SPRING_SHA);

        for (sha, _) in sample_pairs() {
            assert!(index.lookup(sha).unwrap().is_some(), "missing {sha}");
        }
    }

    #[test]
    fn lookup_miss_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        write_index(tmp.path(), &sample_pairs());
        let index = ArtifactIndex::open(tmp.path()).unwrap();
        let miss = index
            .lookup("0000000000000000000000000000000000000000")
            .unwrap();
        assert!(miss.is_none());
        let past_end = index
            .lookup("ffffffffffffffffffffffffffffffffffffffff")
            .unwrap();
        assert!(past_end.is_none());
    }

    #[test]
    fn search_reads_log_n_keys() {
        // 1024 synthetic entries; the probe count of a miss must stay
        // logarithmic, witnessed through a counting reader.
        struct Counting<R> {
            inner: R,
            seeks: u32,
        }
        impl<R: Read> Read for Counting<R> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.inner.read(buf)
            }
        }
        impl<R: Seek> Seek for Counting<R> {
            fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
                self.seeks += 1;
                self.inner.seek(pos)
            }
        }

        let pairs: Vec<(String, String)> = (0..1024)
            .map(|i| (format!("{i:040x}"), format!("g:a{i}:jar::1.0")))
            .collect();
        let refs: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(s, c)| (s.as_str(), c.as_str()))
            .collect();
        let (_, idx) = build_index(&refs);

        let mut reader = Counting {
            inner: Cursor::new(idx),
            seeks: 0,
        };
        let slot = lower_bound(&mut reader, 1024, "00000000000000000000000000000000000003ff")
            .unwrap()
            .unwrap();
        assert_eq!(slot, 1023);
        assert!(reader.seeks <= 11, "took {} probes", reader.seeks);
    }

    #[test]
    fn corrupt_index_size_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_index(tmp.path(), &sample_pairs());
        let idx_path = tmp.path().join(INDEX_FILE);
        let mut bytes = std::fs::read(&idx_path).unwrap();
        bytes.push(0);
        std::fs::write(&idx_path, bytes).unwrap();
        let index = ArtifactIndex::open(tmp.path()).unwrap();
        assert!(index.len().is_err());
    }

    #[test]
    fn open_requires_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(DATA_FILE), "").unwrap();
        assert!(ArtifactIndex::open(tmp.path()).is_err());
    }
}
