//! Lock-file stand-in for named mutexes
//!
//! `<lock_dir>/dagger_mutex_<name>.lock`, created exclusively, containing the
//! decimal PID of the creating process.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{HeldLock, LockError, NamedLock};

#[derive(Debug)]
pub struct LockFileBackend {
    dir: PathBuf,
}

impl LockFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("dagger_mutex_{name}.lock"))
    }
}

impl NamedLock for LockFileBackend {
    fn backend(&self) -> &'static str {
        "lockfile"
    }

    fn acquire(&self, name: &str) -> Result<Box<dyn HeldLock>, LockError> {
        if name.contains(['/', '\\']) {
            return Err(LockError::InvalidName(name.to_string()));
        }

        let path = self.lock_path(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LockError::AlreadyExists(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = file.write_all(std::process::id().to_string().as_bytes()) {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        Ok(Box::new(LockFile {
            name: name.to_string(),
            path,
        }))
    }
}

#[derive(Debug)]
struct LockFile {
    name: String,
    path: PathBuf,
}

impl LockFile {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl HeldLock for LockFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn created_message(&self) -> String {
        format!("Created lockfile '{}'", self.path().display())
    }

    fn release(&self) -> Result<String, LockError> {
        fs::remove_file(self.path())?;
        Ok(format!("Removed lockfile {}", self.path().display()))
    }
}
