//! Export / import document format
//!
//! A self-contained JSON file: images are embedded as `data:` URLs so the
//! document never refers to store-internal keys.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecalError, Result};
use crate::overlay::{ImageFormat, Position, Size};

/// Version written into export documents.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    pub export_date: DateTime<Utc>,
    /// Keyed by custom model name.
    pub models: BTreeMap<String, ExportedModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedModel {
    pub based_on: String,
    #[serde(default)]
    pub material_preset: String,
    #[serde(default)]
    pub material_properties: Value,
    #[serde(default)]
    pub overlay_images: Vec<ExportedOverlay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedOverlay {
    pub name: String,
    pub position: Position,
    pub size: Size,
    pub rotation: f64,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
    /// `data:<mime>;base64,<payload>`
    pub image_data: String,
}

fn default_aspect_ratio() -> f64 {
    1.0
}

impl ExportDocument {
    pub fn new() -> Self {
        Self {
            version: EXPORT_FORMAT_VERSION,
            export_date: Utc::now(),
            models: BTreeMap::new(),
        }
    }

    /// Parse and version-check an export file.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ExportDocument =
            serde_json::from_str(json).map_err(|e| DecalError::InvalidExport {
                reason: e.to_string(),
            })?;
        if doc.version == 0 || doc.version > EXPORT_FORMAT_VERSION {
            return Err(DecalError::InvalidExport {
                reason: format!("unsupported export version {}", doc.version),
            });
        }
        Ok(doc)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Default for ExportDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Embed image bytes as a data URL.
pub fn encode_data_url(format: ImageFormat, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime(), BASE64_STANDARD.encode(bytes))
}

/// Split a data URL into its image type and decoded bytes.
pub fn decode_data_url(url: &str) -> Result<(ImageFormat, Vec<u8>)> {
    let invalid = |reason: &str| DecalError::InvalidExport {
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| invalid("image data is not a data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("data URL has no payload"))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("data URL is not base64 encoded"))?;
    let format = ImageFormat::from_mime(mime).ok_or_else(|| DecalError::InvalidExport {
        reason: format!("unsupported image type {}", mime),
    })?;
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| DecalError::InvalidExport {
            reason: format!("bad base64 payload: {}", e),
        })?;
    if bytes.is_empty() {
        return Err(invalid("image payload is empty"));
    }
    Ok((format, bytes))
}

/// What to do when an imported name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Overwrite,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub name: String,
    pub reason: String,
}

/// Per-run outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: Vec<ImportFailure>,
}

impl ImportSummary {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}
