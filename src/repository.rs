// MIT License - Copyright (c) 2026 The dsc2smartthings authors

//! File-backed JSON configuration repository.
//!
//! One repository instance owns one on-disk document. Reads are served from
//! an in-memory cache after the first (lazy) load; a missing file yields the
//! type's default value. Writes go through a temp-file-then-rename sequence
//! so a crash mid-write leaves the previous document untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{BridgeError, Result};

pub struct ConfigRepository<T> {
    path: PathBuf,
    cached: RwLock<Option<T>>,
}

impl<T> ConfigRepository<T>
where
    T: Clone + Default + Serialize + DeserializeOwned,
{
    /// Create a repository backed by the given file. The file is not touched
    /// until the first `get` or `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value, loading from disk on first access.
    ///
    /// An absent file is not an error: the default value is returned (and
    /// cached). An unreadable or unparseable file is surfaced.
    pub async fn get(&self) -> Result<T> {
        if let Some(value) = self.cached.read().await.as_ref() {
            return Ok(value.clone());
        }

        let mut cached = self.cached.write().await;
        // Re-check: another task may have loaded while we waited.
        if let Some(value) = cached.as_ref() {
            return Ok(value.clone());
        }

        let value = self.load()?;
        *cached = Some(value.clone());
        Ok(value)
    }

    /// Atomically replace the on-disk document and the cache.
    ///
    /// The new content is written to a sibling temp file, flushed, then
    /// renamed over the target. On any failure the previous file is left
    /// intact and the cache is not updated.
    pub async fn save(&self, value: &T) -> Result<()> {
        let mut cached = self.cached.write().await;

        let json = serde_json::to_vec_pretty(value).map_err(|source| {
            BridgeError::MalformedConfig { path: self.path.clone(), source }
        })?;

        let tmp = self.tmp_path();
        let write_result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(source) = write_result {
            let _ = fs::remove_file(&tmp);
            return Err(BridgeError::Persistence { path: self.path.clone(), source });
        }

        debug!("Saved {}", self.path.display());
        *cached = Some(value.clone());
        Ok(())
    }

    fn load(&self) -> Result<T> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                BridgeError::MalformedConfig { path: self.path.clone(), source }
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} absent, using defaults", self.path.display());
                Ok(T::default())
            }
            Err(source) => Err(BridgeError::Persistence { path: self.path.clone(), source }),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
