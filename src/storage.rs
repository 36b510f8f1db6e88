//! Byte store for uploaded files: one flat file per upload under the
//! configured uploads directory, addressed by its server-generated name.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self, stored_name: &str) -> PathBuf {
        self.dir.join(stored_name)
    }

    pub fn put(&self, stored_name: &str, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(self.path(stored_name), bytes)
    }

    pub fn exists(&self, stored_name: &str) -> bool {
        self.path(stored_name).exists()
    }

    /// Remove stored bytes. Deleting something that is already gone is fine;
    /// delete flows treat the byte removal as best-effort.
    pub fn delete(&self, stored_name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path(stored_name)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    #[cfg(test)]
    pub fn stored_count(&self) -> usize {
        std::fs::read_dir(&self.dir).map(|d| d.count()).unwrap_or(0)
    }
}
