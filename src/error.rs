//! Error handling for Decalkit
//!
//! Store-level failures are wrapped with their namespace and key before
//! they reach the repository layer.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for Decalkit operations
pub type Result<T> = std::result::Result<T, DecalError>;

/// Main error type for Decalkit operations
#[derive(Error, Debug)]
pub enum DecalError {
    // Import Validation Errors
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Unsupported image type: {file_name}")]
    UnsupportedFileType { file_name: String },

    #[error("Image file is empty: {file_name}")]
    EmptyFile { file_name: String },

    #[error("Image file too large: {file_name} is {size_bytes} bytes (limit {limit_bytes})")]
    FileTooLarge {
        file_name: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Failed to decode image {name}: {reason}")]
    Decode { name: String, reason: String },

    // Record Errors
    #[error("Custom model not found: {name}")]
    RecordNotFound { name: String },

    #[error("Base model not found: {model_id}")]
    BaseModelNotFound { model_id: String },

    #[error("Overlay not found: {id}")]
    OverlayNotFound { id: String },

    #[error("Invalid custom model name: {name:?}")]
    InvalidName { name: String },

    // Schema Errors
    #[error("Invalid record schema version: {version}")]
    InvalidSchemaVersion { version: String },

    #[error("Migration failed from v{from} to v{to}: {reason}")]
    MigrationError { from: u32, to: u32, reason: String },

    #[error("Invalid export document: {reason}")]
    InvalidExport { reason: String },

    // Storage Errors
    #[error(transparent)]
    Store(#[from] StoreError),

    // Serialization Errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DecalError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            DecalError::Validation { .. } => "VALIDATION",
            DecalError::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            DecalError::EmptyFile { .. } => "EMPTY_FILE",
            DecalError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            DecalError::Decode { .. } => "DECODE_ERROR",
            DecalError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            DecalError::BaseModelNotFound { .. } => "BASE_MODEL_NOT_FOUND",
            DecalError::OverlayNotFound { .. } => "OVERLAY_NOT_FOUND",
            DecalError::InvalidName { .. } => "INVALID_NAME",
            DecalError::InvalidSchemaVersion { .. } => "INVALID_SCHEMA_VERSION",
            DecalError::MigrationError { .. } => "MIGRATION_ERROR",
            DecalError::InvalidExport { .. } => "INVALID_EXPORT",
            DecalError::Store(StoreError::QuotaExceeded { .. }) => "QUOTA_EXCEEDED",
            DecalError::Store(StoreError::NotFound { .. }) => "STORE_NOT_FOUND",
            DecalError::Store(_) => "STORAGE_ERROR",
            DecalError::Json(_) => "SERIALIZATION_ERROR",
            DecalError::Io(_) => "IO_ERROR",
            DecalError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for import-time problems the user can fix by picking another file.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DecalError::Validation { .. }
                | DecalError::UnsupportedFileType { .. }
                | DecalError::EmptyFile { .. }
                | DecalError::FileTooLarge { .. }
                | DecalError::Decode { .. }
        )
    }

    /// True when the underlying store ran out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, DecalError::Store(StoreError::QuotaExceeded { .. }))
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        self.is_validation()
            || matches!(
                self,
                DecalError::OverlayNotFound { .. }
                    | DecalError::InvalidName { .. }
                    | DecalError::Store(StoreError::NotFound { .. })
            )
    }

    /// Returns a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            DecalError::UnsupportedFileType { .. } => {
                Some("Supported images: PNG, JPEG, SVG, WebP, BMP, GIF.")
            }
            DecalError::FileTooLarge { .. } => Some("Downscale the image before importing it."),
            DecalError::EmptyFile { .. } | DecalError::Decode { .. } => {
                Some("The file may be corrupted. Try re-exporting it from its source.")
            }
            DecalError::Store(StoreError::QuotaExceeded { .. }) => {
                Some("Storage is full. Delete unused custom models or export and clear them.")
            }
            DecalError::BaseModelNotFound { .. } => {
                Some("The base model this record was built on is no longer available.")
            }
            DecalError::InvalidName { .. } => {
                Some("Use a non-empty name of at most 100 bytes.")
            }
            DecalError::MigrationError { .. } => {
                Some("The record was written by a newer version. Upgrade before loading it.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Namespace;

    #[test]
    fn test_error_codes() {
        let err = DecalError::RecordNotFound {
            name: "red car".to_string(),
        };
        assert_eq!(err.error_code(), "RECORD_NOT_FOUND");
    }

    #[test]
    fn test_quota_is_distinguishable() {
        let err: DecalError = StoreError::QuotaExceeded {
            namespace: Namespace::Blobs,
            key: "overlay:car:0".to_string(),
            needed_bytes: 10,
            available_bytes: 2,
        }
        .into();
        assert!(err.is_quota_exceeded());
        assert_eq!(err.error_code(), "QUOTA_EXCEEDED");
        assert!(err.recovery_suggestion().is_some());

        let other: DecalError = StoreError::Storage {
            namespace: Namespace::Records,
            key: "car".to_string(),
            reason: "disk on fire".to_string(),
        }
        .into();
        assert!(!other.is_quota_exceeded());
        assert_eq!(other.error_code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_validation_errors_are_recoverable() {
        let err = DecalError::UnsupportedFileType {
            file_name: "notes.txt".to_string(),
        };
        assert!(err.is_validation());
        assert!(err.is_recoverable());
        assert!(!DecalError::Internal("boom".into()).is_recoverable());
    }
}
