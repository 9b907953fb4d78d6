//! Byte stores the vector store persists through.
//!
//! [`PersistenceMedium`] is a narrow key/value contract. The store writes two
//! keys per snapshot (see [`codec`](super::codec)) via [`PersistenceMedium::write_batch`],
//! which implementations make atomic where the backend allows it.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key/value byte storage used for corpus snapshots.
///
/// All methods are synchronous; the store calls them from
/// `tokio::task::spawn_blocking`.
pub trait PersistenceMedium: Send + Sync {
    /// Read the full value for `key`, or `None` if it was never written.
    fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value for `key`.
    fn write_all(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Replace several keys. The default writes them one by one.
    fn write_batch(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        for (key, bytes) in entries {
            self.write_all(key, bytes)?;
        }
        Ok(())
    }

    /// Short label for logs (`"file"`, `"sqlite"`, `"memory"`).
    fn describe(&self) -> String;
}

/// One file per key under a directory.
///
/// Writes go to `<key>.tmp` and are renamed over the destination, so a crash
/// never leaves a half-written stream in place.
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl PersistenceMedium for FileMedium {
    fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn write_all(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let dest = self.path_for(key);
        let tmp = dest.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .with_context(|| format!("failed to write temp file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &dest)
            .with_context(|| format!("failed to rename temp file to {}", dest.display()))?;
        Ok(())
    }

    /// Stage every key to a temp file first, then rename them all, so a
    /// failing write leaves every destination untouched.
    fn write_batch(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        let mut staged = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let dest = self.path_for(key);
            let tmp = dest.with_extension("tmp");
            if let Err(e) = std::fs::write(&tmp, bytes) {
                for (tmp, _) in &staged {
                    let _ = std::fs::remove_file(tmp);
                }
                return Err(e).with_context(|| format!("failed to write temp file: {}", tmp.display()));
            }
            staged.push((tmp, dest));
        }
        for (tmp, dest) in staged {
            std::fs::rename(&tmp, &dest)
                .with_context(|| format!("failed to rename temp file to {}", dest.display()))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }
}

/// Process-local storage for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceMedium for MemoryMedium {
    fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("medium lock poisoned: {e}"))?;
        Ok(entries.get(key).cloned())
    }

    fn write_all(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("medium lock poisoned: {e}"))?;
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn write_batch(&self, batch: &[(&str, &[u8])]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("medium lock poisoned: {e}"))?;
        for (key, bytes) in batch {
            entries.insert(key.to_string(), bytes.to_vec());
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
