//! In-memory store
//!
//! Backs tests and ephemeral sessions. Supports an optional byte quota so
//! callers can exercise quota handling without filling a disk.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{check_namespace, Namespace, PersistenceStore, StoreError, StoreResult, StoreValue};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, Value>,
    blobs: BTreeMap<String, Vec<u8>>,
    /// Serialized size of everything held, kept current by each mutation.
    used_bytes: u64,
    quota_bytes: Option<u64>,
    closed: bool,
}

impl Inner {
    fn stored_len(&self, ns: Namespace, key: &str) -> u64 {
        match ns {
            Namespace::Records => self
                .records
                .get(key)
                .and_then(|v| serde_json::to_vec(v).ok())
                .map_or(0, |b| b.len() as u64),
            Namespace::Blobs => self.blobs.get(key).map_or(0, |b| b.len() as u64),
        }
    }

    fn ensure_open(&self, ns: Namespace, key: &str) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::closed(ns, key));
        }
        Ok(())
    }
}

/// A [`PersistenceStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that refuses writes beyond `quota_bytes`.
    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            inner: RwLock::new(Inner {
                quota_bytes: Some(quota_bytes),
                ..Inner::default()
            }),
        }
    }

    /// Change the quota. `None` removes it.
    pub async fn set_quota(&self, quota_bytes: Option<u64>) {
        self.inner.write().await.quota_bytes = quota_bytes;
    }

    /// Total bytes currently held across both namespaces.
    pub async fn used_bytes(&self) -> u64 {
        self.inner.read().await.used_bytes
    }
}

#[async_trait]
impl PersistenceStore for MemoryStore {
    async fn get(&self, ns: Namespace, key: &str) -> StoreResult<StoreValue> {
        let inner = self.inner.read().await;
        inner.ensure_open(ns, key)?;
        let value = match ns {
            Namespace::Records => inner.records.get(key).cloned().map(StoreValue::Record),
            Namespace::Blobs => inner.blobs.get(key).cloned().map(StoreValue::Blob),
        };
        value.ok_or_else(|| StoreError::not_found(ns, key))
    }

    async fn put(&self, ns: Namespace, key: &str, value: StoreValue) -> StoreResult<()> {
        check_namespace(ns, key, &value)?;
        let mut inner = self.inner.write().await;
        inner.ensure_open(ns, key)?;

        let new_len = value.to_bytes(key)?.len() as u64;
        let used = inner.used_bytes.saturating_sub(inner.stored_len(ns, key));
        if let Some(quota) = inner.quota_bytes {
            let available = quota.saturating_sub(used);
            if new_len > available {
                return Err(StoreError::QuotaExceeded {
                    namespace: ns,
                    key: key.to_string(),
                    needed_bytes: new_len,
                    available_bytes: available,
                });
            }
        }

        debug!(namespace = %ns, key, bytes = new_len, "memory store put");
        inner.used_bytes = used + new_len;
        match value {
            StoreValue::Record(v) => {
                inner.records.insert(key.to_string(), v);
            }
            StoreValue::Blob(b) => {
                inner.blobs.insert(key.to_string(), b);
            }
        }
        Ok(())
    }

    async fn delete(&self, ns: Namespace, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open(ns, key)?;
        let len = inner.stored_len(ns, key);
        let removed = match ns {
            Namespace::Records => inner.records.remove(key).is_some(),
            Namespace::Blobs => inner.blobs.remove(key).is_some(),
        };
        if !removed {
            return Err(StoreError::not_found(ns, key));
        }
        inner.used_bytes = inner.used_bytes.saturating_sub(len);
        debug!(namespace = %ns, key, "memory store delete");
        Ok(())
    }

    async fn list_keys(&self, ns: Namespace) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        inner.ensure_open(ns, "*")?;
        Ok(match ns {
            Namespace::Records => inner.records.keys().cloned().collect(),
            Namespace::Blobs => inner.blobs.keys().cloned().collect(),
        })
    }

    async fn list_all(&self, ns: Namespace) -> StoreResult<Vec<(String, StoreValue)>> {
        let inner = self.inner.read().await;
        inner.ensure_open(ns, "*")?;
        Ok(match ns {
            Namespace::Records => inner
                .records
                .iter()
                .map(|(k, v)| (k.clone(), StoreValue::Record(v.clone())))
                .collect(),
            Namespace::Blobs => inner
                .blobs
                .iter()
                .map(|(k, v)| (k.clone(), StoreValue::Blob(v.clone())))
                .collect(),
        })
    }

    async fn clear(&self, ns: Namespace) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_open(ns, "*")?;
        let freed: u64 = match ns {
            Namespace::Records => std::mem::take(&mut inner.records)
                .values()
                .map(|v| serde_json::to_vec(v).map_or(0, |b| b.len() as u64))
                .sum(),
            Namespace::Blobs => std::mem::take(&mut inner.blobs)
                .values()
                .map(|b| b.len() as u64)
                .sum(),
        };
        inner.used_bytes = inner.used_bytes.saturating_sub(freed);
        Ok(())
    }

    async fn close(&self) {
        self.inner.write().await.closed = true;
    }
}
