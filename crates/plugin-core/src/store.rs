use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};
use tracing::warn;

/// A settings document persisted as one pretty-printed JSON file.
///
/// Every [`update`](Self::update) is a full read-modify-write under a single
/// lock and replaces the file atomically, so two commands racing on the same
/// store cannot interleave their writes.
#[derive(Debug)]
pub struct JsonStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents; a missing or corrupt file reads as `T::default()`.
    pub async fn load(&self) -> T {
        let _guard = self.lock.lock().await;
        self.read_unlocked().await
    }

    /// Apply `f` to the stored value and persist the result.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub async fn update<R: Send>(&self, f: impl FnOnce(&mut T) -> R + Send) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut value = self.read_unlocked().await;
        let out = f(&mut value);
        self.write_unlocked(&value).await?;
        Ok(out)
    }

    async fn read_unlocked(&self) -> T {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    warn!(file = %self.path.display(), error = %e, "Corrupt settings file; using defaults");
                    T::default()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => T::default(),
            Err(e) => {
                warn!(file = %self.path.display(), error = %e, "Failed to read settings file; using defaults");
                T::default()
            }
        }
    }

    async fn write_unlocked(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating settings directory {}", parent.display()))?;
        }
        let data = serde_json::to_vec_pretty(value).context("serializing settings")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .await
            .with_context(|| format!("writing settings file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing settings file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
    struct Counter {
        hits: u32,
        names: Vec<String>,
    }

    #[tokio::test]
    async fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonStore<Counter> = JsonStore::new(dir.path().join("none.json"));
        assert_eq!(store.load().await, Counter::default());
    }

    #[tokio::test]
    async fn update_persists_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("counter.json");
        let store: JsonStore<Counter> = JsonStore::new(&path);

        let hits = store
            .update(|c| {
                c.hits += 1;
                c.names.push("a".to_owned());
                c.hits
            })
            .await
            .unwrap();
        assert_eq!(hits, 1);

        let reopened: JsonStore<Counter> = JsonStore::new(&path);
        let loaded = reopened.load().await;
        assert_eq!(loaded.hits, 1);
        assert_eq!(loaded.names, vec!["a".to_owned()]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced_on_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store: JsonStore<Counter> = JsonStore::new(&path);
        assert_eq!(store.load().await, Counter::default());
        store.update(|c| c.hits = 7).await.unwrap();
        assert_eq!(store.load().await.hits, 7);
    }
}
