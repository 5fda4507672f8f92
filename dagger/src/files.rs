//! files.create — write an artifact file and report its SHA-256

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

const HASH_BLOCK: usize = 8192;

/// A file written on request; not tracked after creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    pub path: PathBuf,
    pub sha256: String,
}

/// Create `folder/filename` with `content` and describe the outcome.
///
/// The folder is created if needed and an existing file is overwritten.
pub fn execute(folder: &Path, filename: &str, content: &str) -> String {
    match create(folder, filename, content.as_bytes()) {
        Ok(artifact) => format!(
            "Created file {} sha256={}",
            artifact.path.display(),
            artifact.sha256
        ),
        Err(e) => format!("File create error: {e:#}"),
    }
}

pub fn create(folder: &Path, filename: &str, content: &[u8]) -> Result<FileArtifact> {
    fs::create_dir_all(folder)
        .with_context(|| format!("cannot create folder {}", folder.display()))?;

    let path = folder.join(filename);
    fs::write(&path, content).with_context(|| format!("cannot write {}", path.display()))?;

    // hash what is on disk, not the buffer we meant to write
    let sha256 = sha256_file(&path)?;
    Ok(FileArtifact { path, sha256 })
}

/// Block-wise SHA-256 of a file, lowercase hex
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; HASH_BLOCK];
    loop {
        let n = file
            .read(&mut block)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_create_known_digest() {
        let dir = TempDir::new().unwrap();
        let artifact = create(dir.path(), "abc.txt", b"abc").unwrap();
        assert_eq!(
            artifact.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(artifact.path, dir.path().join("abc.txt"));
    }

    #[test]
    fn test_empty_content() {
        let dir = TempDir::new().unwrap();
        let artifact = create(dir.path(), "empty.bin", b"").unwrap();
        assert_eq!(artifact.sha256, EMPTY_SHA256);
        assert_eq!(fs::metadata(&artifact.path).unwrap().len(), 0);
    }

    #[test]
    fn test_same_bytes_same_digest() {
        let dir = TempDir::new().unwrap();
        let a = create(&dir.path().join("one"), "payload.dll", b"MZ fake header").unwrap();
        let b = create(&dir.path().join("two"), "other.dll", b"MZ fake header").unwrap();
        let c = create(dir.path(), "changed.dll", b"MZ fake header!").unwrap();

        assert_eq!(a.sha256, b.sha256);
        assert_ne!(a.sha256, c.sha256);
    }

    #[test]
    fn test_digest_matches_recomputation() {
        let dir = TempDir::new().unwrap();
        // spans several hash blocks
        let content = vec![0x5a; HASH_BLOCK * 3 + 17];
        let artifact = create(dir.path(), "big.bin", &content).unwrap();
        assert_eq!(sha256_file(&artifact.path).unwrap(), artifact.sha256);
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        create(dir.path(), "note.txt", b"first version, longer").unwrap();
        let artifact = create(dir.path(), "note.txt", b"second").unwrap();
        assert_eq!(fs::read(&artifact.path).unwrap(), b"second");
    }

    #[test]
    fn test_creates_missing_folder() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("nested").join("deeper");
        let msg = execute(&folder, "ioc.txt", "evil");
        assert!(msg.starts_with("Created file "), "{msg}");
        assert!(msg.contains(" sha256="), "{msg}");
        assert!(folder.join("ioc.txt").is_file());
    }

    #[test]
    fn test_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // a regular file where the folder should be
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let msg = execute(&blocker, "ioc.txt", "evil");
        assert!(msg.starts_with("File create error: "), "{msg}");
    }
}
