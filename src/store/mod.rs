//! Persistence Store
//!
//! A generic async key/value store with two namespaces: small JSON
//! `records` and larger binary `blobs`. The store knows nothing about
//! custom models; that lives in [`crate::repository`].
//!
//! Every operation is a single transaction from the caller's point of
//! view. Store handles are passed explicitly and have an explicit
//! open/close lifecycle.

pub mod error;
pub mod file;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;

/// The two logical namespaces of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Records,
    Blobs,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Records => "records",
            Namespace::Blobs => "blobs",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value held by the store. The variant must match the namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Record(Value),
    Blob(Vec<u8>),
}

impl StoreValue {
    /// Namespace this kind of value belongs to.
    pub fn namespace(&self) -> Namespace {
        match self {
            StoreValue::Record(_) => Namespace::Records,
            StoreValue::Blob(_) => Namespace::Blobs,
        }
    }

    /// Serialized payload as it is written to storage.
    pub fn to_bytes(&self, key: &str) -> StoreResult<Vec<u8>> {
        match self {
            StoreValue::Record(value) => serde_json::to_vec(value)
                .map_err(|e| StoreError::storage(Namespace::Records, key, e.to_string())),
            StoreValue::Blob(bytes) => Ok(bytes.clone()),
        }
    }

    pub fn into_record(self, key: &str) -> StoreResult<Value> {
        match self {
            StoreValue::Record(value) => Ok(value),
            StoreValue::Blob(_) => Err(StoreError::storage(
                Namespace::Records,
                key,
                "expected a JSON record, found a blob",
            )),
        }
    }

    pub fn into_blob(self, key: &str) -> StoreResult<Vec<u8>> {
        match self {
            StoreValue::Blob(bytes) => Ok(bytes),
            StoreValue::Record(_) => Err(StoreError::storage(
                Namespace::Blobs,
                key,
                "expected a blob, found a JSON record",
            )),
        }
    }
}

/// Longest key any store accepts, in UTF-8 bytes. Hex-encoded plus an
/// extension it still fits a 255-byte file name.
pub const MAX_KEY_BYTES: usize = 120;

/// Reject a value written to the wrong namespace or under an over-long key.
pub(crate) fn check_namespace(ns: Namespace, key: &str, value: &StoreValue) -> StoreResult<()> {
    if key.len() > MAX_KEY_BYTES {
        return Err(StoreError::storage(
            ns,
            key,
            format!("key is {} bytes, over the {} byte limit", key.len(), MAX_KEY_BYTES),
        ));
    }
    if value.namespace() != ns {
        return Err(StoreError::storage(
            ns,
            key,
            format!("cannot store a {} value here", value.namespace()),
        ));
    }
    Ok(())
}

/// Async two-namespace key/value store.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get(&self, ns: Namespace, key: &str) -> StoreResult<StoreValue>;

    async fn put(&self, ns: Namespace, key: &str, value: StoreValue) -> StoreResult<()>;

    /// Remove a key. Absent keys yield [`StoreError::NotFound`].
    async fn delete(&self, ns: Namespace, key: &str) -> StoreResult<()>;

    /// All keys of a namespace in ascending order.
    async fn list_keys(&self, ns: Namespace) -> StoreResult<Vec<String>>;

    /// All entries of a namespace in ascending key order.
    async fn list_all(&self, ns: Namespace) -> StoreResult<Vec<(String, StoreValue)>>;

    async fn clear(&self, ns: Namespace) -> StoreResult<()>;

    /// Close the handle. Later operations fail with a storage error.
    async fn close(&self);

    async fn get_record(&self, key: &str) -> StoreResult<Value> {
        self.get(Namespace::Records, key).await?.into_record(key)
    }

    async fn put_record(&self, key: &str, value: Value) -> StoreResult<()> {
        self.put(Namespace::Records, key, StoreValue::Record(value))
            .await
    }

    async fn get_blob(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.get(Namespace::Blobs, key).await?.into_blob(key)
    }

    async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.put(Namespace::Blobs, key, StoreValue::Blob(bytes)).await
    }
}
