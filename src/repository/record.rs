//! Custom model records
//!
//! [`CustomModelRecord`] is the live, in-memory shape. [`RecordDocument`] is
//! what lands in the `records` namespace: transforms and blob keys, never
//! image bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::overlay::{OverlayLayer, Position, Size};
use crate::repository::migration::CURRENT_SCHEMA_VERSION;

/// Blob key of the overlay at `index` in record `name`.
pub fn blob_key(name: &str, index: usize) -> String {
    format!("overlay:{}:{}", name, index)
}

/// Index encoded in a blob key belonging to record `name`, if any.
pub fn blob_index(name: &str, key: &str) -> Option<usize> {
    key.strip_prefix("overlay:")?
        .strip_prefix(name)?
        .strip_prefix(':')?
        .parse()
        .ok()
}

/// Hex SHA-256 of a blob.
pub fn blob_checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A named variant of a base model with its overlays.
#[derive(Debug, Clone)]
pub struct CustomModelRecord {
    pub custom_name: String,
    /// Id in the external base-model registry.
    pub based_on: String,
    /// Opaque pass-through.
    pub material_preset: String,
    /// Opaque pass-through.
    pub material_properties: Value,
    /// Bottom first.
    pub overlays: Vec<OverlayLayer>,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl CustomModelRecord {
    pub fn new(custom_name: impl Into<String>, based_on: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            custom_name: custom_name.into(),
            based_on: based_on.into(),
            material_preset: String::new(),
            material_properties: Value::Object(Default::default()),
            overlays: Vec::new(),
            schema_version: CURRENT_SCHEMA_VERSION,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_material(mut self, preset: impl Into<String>, properties: Value) -> Self {
        self.material_preset = preset.into();
        self.material_properties = properties;
        self
    }

    pub fn with_overlays(mut self, overlays: Vec<OverlayLayer>) -> Self {
        self.overlays = overlays;
        self
    }
}

/// Transform metadata of one stored overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayMetadata {
    pub name: String,
    pub position: Position,
    pub size: Size,
    pub rotation: f64,
    pub aspect_ratio: f64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl OverlayMetadata {
    pub fn from_layer(layer: &OverlayLayer) -> Self {
        Self {
            name: layer.display_name.clone(),
            position: layer.position,
            size: layer.size,
            rotation: layer.rotation_degrees,
            aspect_ratio: layer.aspect_ratio,
            mime_type: layer.image.format().mime().to_string(),
            sha256: Some(blob_checksum(layer.image.bytes())),
        }
    }
}

/// Metadata document stored under the record's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDocument {
    pub schema_version: u32,
    pub custom_name: String,
    pub based_on: String,
    #[serde(default)]
    pub material_preset: String,
    #[serde(default)]
    pub material_properties: Value,
    /// Parallel to `overlays`.
    pub overlay_keys: Vec<String>,
    pub overlays: Vec<OverlayMetadata>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}
