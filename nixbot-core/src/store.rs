// ABOUTME: File-backed string key/value store shared by concurrent handlers
// ABOUTME: One RwLock guards the map; writers hold it across modify-serialize-rename

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

/// JSON-object store, fully materialized in memory and rewritten on every mutation
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl KvStore {
    /// Load the store at `path`. A missing file yields an empty store; the
    /// file is created on the first mutation.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_entries(&path).await?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "Loaded key/value store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    /// Snapshot of every entry
    pub async fn load_all(&self) -> BTreeMap<String, String> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Insert or replace `key`, then persist
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    /// Remove `key`, then persist. Returns whether the key existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    /// Write the whole map to a sibling temp file and rename it over the store
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries).context("Failed to serialize store")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

async fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(content) => serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn read_file(path: &Path) -> BTreeMap<String, String> {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::open(dir.path().join("repl.json")).await.unwrap();
        assert!(store.is_empty().await);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_set_persists_whole_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repl.json");
        let store = KvStore::open(&path).await.unwrap();

        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, store.load_all().await);
        assert_eq!(on_disk.len(), 2);
        assert!(!tmp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repl.json");
        let store = KvStore::open(&path).await.unwrap();

        store.set("a", "1").await.unwrap();
        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await, None);

        let reopened = KvStore::open(&path).await.unwrap();
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn test_reopen_reads_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repl.json");
        std::fs::write(&path, r#"{"x": "pkgs.hello"}"#).unwrap();

        let store = KvStore::open(&path).await.unwrap();
        assert_eq!(store.get("x").await.as_deref(), Some("pkgs.hello"));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repl.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(KvStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_map_unchanged() {
        let dir = TempDir::new().unwrap();
        // The store path is a directory, so rename over it fails
        let path = dir.path().join("occupied");
        std::fs::create_dir_all(path.join("child")).unwrap();
        let store = KvStore {
            path: path.clone(),
            entries: RwLock::new(BTreeMap::new()),
        };

        assert!(store.set("a", "1").await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_see_whole_writes() {
        const KEYS: usize = 20;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repl.json");
        let store = Arc::new(KvStore::open(&path).await.unwrap());
        let done = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            readers.push(tokio::spawn(async move {
                let mut observed = 0usize;
                loop {
                    // Keys are added k00, k01.. in order and removed in the
                    // same order, so every whole state is one contiguous run
                    let snapshot = store.load_all().await;
                    let indices: Vec<usize> =
                        snapshot.keys().map(|k| k[1..].parse().unwrap()).collect();
                    if let (Some(first), Some(last)) = (indices.first(), indices.last()) {
                        assert_eq!(last - first + 1, indices.len(), "torn state {:?}", snapshot);
                    }
                    for (key, value) in &snapshot {
                        assert_eq!(value, &format!("value-{key}"));
                    }
                    if let Some(value) = store.get("k00").await {
                        assert_eq!(value, "value-k00");
                    }
                    observed += 1;
                    if done.load(Ordering::SeqCst) {
                        return observed;
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for i in 0..KEYS {
            let key = format!("k{i:02}");
            store.set(&key, &format!("value-{key}")).await.unwrap();
            assert_eq!(read_file(&path), store.load_all().await);
        }
        for i in 0..KEYS {
            assert!(store.delete(&format!("k{i:02}")).await.unwrap());
            assert_eq!(read_file(&path), store.load_all().await);
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_leave_file_matching_memory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repl.json");
        let store = Arc::new(KvStore::open(&path).await.unwrap());

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    for i in 0..10 {
                        let key = format!("w{w}-{i}");
                        store.set(&key, "x").await.unwrap();
                        if i % 2 == 0 {
                            store.delete(&key).await.unwrap();
                        }
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let on_disk = read_file(&path);
        assert_eq!(on_disk, store.load_all().await);
        assert_eq!(on_disk.len(), 8 * 5);
    }
}
