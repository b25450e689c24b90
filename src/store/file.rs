//! Directory-backed store
//!
//! Layout under the store root:
//! - `records/<hex(key)>.json`
//! - `blobs/<hex(key)>.bin`
//!
//! Keys are hex-encoded so `overlay:<name>:<index>` is safe on every
//! filesystem. Each write lands in a temp file that is renamed over the
//! target, so a key is either fully old or fully new.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{check_namespace, Namespace, PersistenceStore, StoreError, StoreResult, StoreValue};

const RECORDS_DIR: &str = "records";
const BLOBS_DIR: &str = "blobs";
const TEMP_EXTENSION: &str = "tmp";

/// A [`PersistenceStore`] persisted as one file per key.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    quota_bytes: Option<u64>,
    closed: AtomicBool,
    /// Bytes on disk across both namespaces. Held for the whole of each
    /// mutation so quota checks and writes are one transaction.
    usage: Mutex<u64>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>, quota_bytes: Option<u64>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let mut used = 0;
        for ns in [Namespace::Records, Namespace::Blobs] {
            let dir = Self::dir_for(&root, ns);
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::from_io(ns, "*", 0, e))?;
            used += Self::scan(&root, ns)
                .await?
                .iter()
                .map(|(_, _, size)| size)
                .sum::<u64>();
        }
        debug!(root = %root.display(), used_bytes = used, "opened file store");
        Ok(Self {
            root,
            quota_bytes,
            closed: AtomicBool::new(false),
            usage: Mutex::new(used),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(root: &Path, ns: Namespace) -> PathBuf {
        match ns {
            Namespace::Records => root.join(RECORDS_DIR),
            Namespace::Blobs => root.join(BLOBS_DIR),
        }
    }

    fn extension(ns: Namespace) -> &'static str {
        match ns {
            Namespace::Records => "json",
            Namespace::Blobs => "bin",
        }
    }

    fn path_for(&self, ns: Namespace, key: &str) -> PathBuf {
        Self::dir_for(&self.root, ns).join(format!(
            "{}.{}",
            hex::encode(key.as_bytes()),
            Self::extension(ns)
        ))
    }

    fn ensure_open(&self, ns: Namespace, key: &str) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::closed(ns, key));
        }
        Ok(())
    }

    /// Bytes currently on disk across both namespaces.
    pub async fn used_bytes(&self) -> u64 {
        *self.usage.lock().await
    }

    async fn entries(&self, ns: Namespace) -> StoreResult<Vec<(String, PathBuf, u64)>> {
        Self::scan(&self.root, ns).await
    }

    /// Keys and file sizes of one namespace, sorted by key.
    async fn scan(root: &Path, ns: Namespace) -> StoreResult<Vec<(String, PathBuf, u64)>> {
        let dir = Self::dir_for(root, ns);
        let extension = Self::extension(ns);

        let listed = tokio::task::spawn_blocking(move || {
            let mut entries: Vec<(String, PathBuf, u64)> = WalkDir::new(&dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    entry.path().extension().and_then(|e| e.to_str()) == Some(extension)
                })
                .filter_map(|entry| {
                    let stem = entry.path().file_stem()?.to_str()?.to_string();
                    let key = match hex::decode(&stem).ok().and_then(|b| String::from_utf8(b).ok())
                    {
                        Some(key) => key,
                        None => {
                            warn!(file = %entry.path().display(), "ignoring foreign file in store");
                            return None;
                        }
                    };
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    Some((key, entry.path().to_path_buf(), size))
                })
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        })
        .await
        .map_err(|e| StoreError::storage(ns, "*", e.to_string()))?;

        Ok(listed)
    }

    async fn read_value(&self, ns: Namespace, key: &str, path: &Path) -> StoreResult<StoreValue> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| StoreError::from_io(ns, key, 0, e))?;
        match ns {
            Namespace::Records => serde_json::from_slice(&bytes)
                .map(StoreValue::Record)
                .map_err(|e| StoreError::storage(ns, key, format!("corrupt record: {}", e))),
            Namespace::Blobs => Ok(StoreValue::Blob(bytes)),
        }
    }
}

#[async_trait]
impl PersistenceStore for FileStore {
    async fn get(&self, ns: Namespace, key: &str) -> StoreResult<StoreValue> {
        self.ensure_open(ns, key)?;
        let path = self.path_for(ns, key);
        self.read_value(ns, key, &path).await
    }

    async fn put(&self, ns: Namespace, key: &str, value: StoreValue) -> StoreResult<()> {
        check_namespace(ns, key, &value)?;
        self.ensure_open(ns, key)?;
        let mut usage = self.usage.lock().await;

        let bytes = value.to_bytes(key)?;
        let needed = bytes.len() as u64;
        let path = self.path_for(ns, key);

        let existing = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        let used = usage.saturating_sub(existing);
        if let Some(quota) = self.quota_bytes {
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StoreError::QuotaExceeded {
                    namespace: ns,
                    key: key.to_string(),
                    needed_bytes: needed,
                    available_bytes: available,
                });
            }
        }

        let temp_path = path.with_extension(TEMP_EXTENSION);
        if let Err(e) = fs::write(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::from_io(ns, key, needed, e));
        }
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::from_io(ns, key, needed, e))?;
        *usage = used + needed;

        debug!(namespace = %ns, key, bytes = needed, "file store put");
        Ok(())
    }

    async fn delete(&self, ns: Namespace, key: &str) -> StoreResult<()> {
        self.ensure_open(ns, key)?;
        let mut usage = self.usage.lock().await;
        let path = self.path_for(ns, key);
        let size = fs::metadata(&path)
            .await
            .map_err(|e| StoreError::from_io(ns, key, 0, e))?
            .len();
        fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::from_io(ns, key, 0, e))?;
        *usage = usage.saturating_sub(size);
        debug!(namespace = %ns, key, "file store delete");
        Ok(())
    }

    async fn list_keys(&self, ns: Namespace) -> StoreResult<Vec<String>> {
        self.ensure_open(ns, "*")?;
        Ok(self
            .entries(ns)
            .await?
            .into_iter()
            .map(|(key, _, _)| key)
            .collect())
    }

    async fn list_all(&self, ns: Namespace) -> StoreResult<Vec<(String, StoreValue)>> {
        self.ensure_open(ns, "*")?;
        let mut all = Vec::new();
        for (key, path, _) in self.entries(ns).await? {
            let value = self.read_value(ns, &key, &path).await?;
            all.push((key, value));
        }
        Ok(all)
    }

    async fn clear(&self, ns: Namespace) -> StoreResult<()> {
        self.ensure_open(ns, "*")?;
        let mut usage = self.usage.lock().await;
        for (key, path, size) in self.entries(ns).await? {
            fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::from_io(ns, &key, 0, e))?;
            *usage = usage.saturating_sub(size);
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!(root = %self.root.display(), "closed file store");
    }
}
