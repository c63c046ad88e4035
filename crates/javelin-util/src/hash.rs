use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 hash of a file, returning a lowercase hex string.
/// Streams through a fixed buffer; does not load the file into memory.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    stream_into(path, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the SHA-1 hash of a file, returning a lowercase hex string.
///
/// SHA-1 is the identity Maven publishes for artifacts; it is used here only
/// to key index lookups, never as an integrity check.
pub fn sha1_file(path: &Path) -> std::io::Result<String> {
    let mut hasher = Sha1::new();
    stream_into(path, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn stream_into<D: Digest>(path: &Path, hasher: &mut D) -> std::io::Result<()> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(64 * 1024, file);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}
