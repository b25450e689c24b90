//! Error types for the persistence store.

use thiserror::Error;

use super::Namespace;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`PersistenceStore`](super::PersistenceStore).
///
/// Every variant carries the namespace and key it was raised for.
/// Whole-namespace operations use `*` as the key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{namespace}/{key}: not found")]
    NotFound { namespace: Namespace, key: String },

    #[error(
        "{namespace}/{key}: storage quota exceeded (needed {needed_bytes} bytes, available {available_bytes} bytes)"
    )]
    QuotaExceeded {
        namespace: Namespace,
        key: String,
        needed_bytes: u64,
        available_bytes: u64,
    },

    #[error("{namespace}/{key}: {reason}")]
    Storage {
        namespace: Namespace,
        key: String,
        reason: String,
    },
}

impl StoreError {
    pub(crate) fn storage(namespace: Namespace, key: &str, reason: impl Into<String>) -> Self {
        StoreError::Storage {
            namespace,
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(namespace: Namespace, key: &str) -> Self {
        StoreError::NotFound {
            namespace,
            key: key.to_string(),
        }
    }

    pub(crate) fn closed(namespace: Namespace, key: &str) -> Self {
        Self::storage(namespace, key, "store is closed")
    }

    /// Map an I/O failure, keeping "disk full" distinguishable.
    pub(crate) fn from_io(
        namespace: Namespace,
        key: &str,
        needed_bytes: u64,
        err: std::io::Error,
    ) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(namespace, key),
            std::io::ErrorKind::StorageFull => StoreError::QuotaExceeded {
                namespace,
                key: key.to_string(),
                needed_bytes,
                available_bytes: 0,
            },
            _ => Self::storage(namespace, key, err.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded { .. })
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            StoreError::NotFound { namespace, .. }
            | StoreError::QuotaExceeded { namespace, .. }
            | StoreError::Storage { namespace, .. } => *namespace,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            StoreError::NotFound { key, .. }
            | StoreError::QuotaExceeded { key, .. }
            | StoreError::Storage { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_storage_full_maps_to_quota() {
        let err = StoreError::from_io(
            Namespace::Blobs,
            "overlay:car:0",
            512,
            std::io::Error::from(std::io::ErrorKind::StorageFull),
        );
        assert!(err.is_quota_exceeded());
        assert_eq!(err.namespace(), Namespace::Blobs);
        assert_eq!(err.key(), "overlay:car:0");
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = StoreError::from_io(
            Namespace::Records,
            "car",
            0,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_display_carries_context() {
        let err = StoreError::closed(Namespace::Records, "car");
        assert_eq!(err.to_string(), "records/car: store is closed");
    }
}
