//! Overlay image import
//!
//! Validation happens before any decode is attempted: the extension must be
//! a supported raster type, the file must be non-empty and under the size
//! limit. Decoding itself runs on the blocking pool.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DecalError, Result};
use crate::render::{Raster, DEFAULT_MAX_IMAGE_PIXELS};

/// Default upper bound on an imported image file.
pub const DEFAULT_MAX_IMPORT_BYTES: u64 = 20 * 1024 * 1024;

/// Bounds applied to a picked file before and during decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportLimits {
    /// Encoded file size.
    pub max_bytes: u64,
    /// Declared width times height.
    pub max_pixels: u64,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_IMPORT_BYTES,
            max_pixels: DEFAULT_MAX_IMAGE_PIXELS,
        }
    }
}

/// Supported overlay image types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Svg,
    Webp,
    Bmp,
    Gif,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Svg,
        ImageFormat::Webp,
        ImageFormat::Bmp,
        ImageFormat::Gif,
    ];

    /// Detect from a file name's extension, case-insensitively.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "svg" => Some(ImageFormat::Svg),
            "webp" => Some(ImageFormat::Webp),
            "bmp" => Some(ImageFormat::Bmp),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.mime() == mime)
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Svg => "image/svg+xml",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Gif => "image/gif",
        }
    }

    /// Matching `image` crate decoder; `None` for vector formats.
    pub fn to_image_format(&self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Webp => Some(image::ImageFormat::WebP),
            ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
            ImageFormat::Gif => Some(image::ImageFormat::Gif),
            ImageFormat::Svg => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A user-picked file handed to `add_overlay`.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its file name.
    pub async fn read(path: &std::path::Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        Ok(Self { name, bytes })
    }
}

/// Encoded source bytes of an overlay plus their decoded raster, if any.
///
/// The encoded bytes are what gets persisted; the raster is rebuilt on load.
#[derive(Debug, Clone)]
pub struct OverlayImage {
    format: ImageFormat,
    bytes: Arc<Vec<u8>>,
    raster: Option<Raster>,
}

impl OverlayImage {
    pub fn decoded(format: ImageFormat, bytes: Vec<u8>, raster: Raster) -> Self {
        Self {
            format,
            bytes: Arc::new(bytes),
            raster: Some(raster),
        }
    }

    /// Source bytes whose decode failed or has not happened yet.
    pub fn undecoded(format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self {
            format,
            bytes: Arc::new(bytes),
            raster: None,
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }
}

/// Check type, emptiness and size without decoding.
pub fn validate_import(file: &ImageFile, max_bytes: u64) -> Result<ImageFormat> {
    let format =
        ImageFormat::from_file_name(&file.name).ok_or_else(|| DecalError::UnsupportedFileType {
            file_name: file.name.clone(),
        })?;

    if file.bytes.is_empty() {
        return Err(DecalError::EmptyFile {
            file_name: file.name.clone(),
        });
    }

    let size_bytes = file.bytes.len() as u64;
    if size_bytes > max_bytes {
        return Err(DecalError::FileTooLarge {
            file_name: file.name.clone(),
            size_bytes,
            limit_bytes: max_bytes,
        });
    }

    Ok(format)
}

/// Decode on the blocking pool so the caller's task only suspends.
pub async fn decode_image(
    name: &str,
    format: ImageFormat,
    bytes: Arc<Vec<u8>>,
    max_pixels: u64,
) -> Result<Raster> {
    let owned_name = name.to_string();
    tokio::task::spawn_blocking(move || {
        Raster::decode_with_limit(&owned_name, format, &bytes, max_pixels)
    })
        .await
        .map_err(|e| DecalError::Internal(format!("decode task failed: {}", e)))?
}

/// Validate and decode a picked file. Nothing is created on failure.
pub async fn import_image(file: ImageFile, limits: &ImportLimits) -> Result<OverlayImage> {
    let format = validate_import(&file, limits.max_bytes)?;
    let bytes = Arc::new(file.bytes);
    let raster = decode_image(&file.name, format, Arc::clone(&bytes), limits.max_pixels).await?;
    Ok(OverlayImage {
        format,
        bytes,
        raster: Some(raster),
    })
}

/// Rebuild an overlay image from stored bytes; decode failures are kept
/// as an undecoded image so the caller can decide to skip it. Stored
/// images are held to [`DEFAULT_MAX_IMAGE_PIXELS`].
pub async fn restore_image(name: &str, format: ImageFormat, bytes: Vec<u8>) -> (OverlayImage, Option<DecalError>) {
    let bytes = Arc::new(bytes);
    match decode_image(name, format, Arc::clone(&bytes), DEFAULT_MAX_IMAGE_PIXELS).await {
        Ok(raster) => (
            OverlayImage {
                format,
                bytes,
                raster: Some(raster),
            },
            None,
        ),
        Err(err) => (
            OverlayImage {
                format,
                bytes,
                raster: None,
            },
            Some(err),
        ),
    }
}
