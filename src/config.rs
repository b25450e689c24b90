//! Runtime settings
//!
//! Read from `decalkit.json` in the working directory (or an explicit
//! path). Every field has a default, so a missing file or a partial one is
//! fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DecalError, Result};
use crate::interaction::SessionOptions;
use crate::overlay::{DEFAULT_MAX_IMPORT_BYTES, DEFAULT_OVERLAY_WIDTH};
use crate::render::{DEFAULT_FALLBACK_COLOR, DEFAULT_MAX_IMAGE_PIXELS};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "decalkit.json";

/// Largest accepted composite edge.
pub const MAX_OUTPUT_SIZE: u32 = 8192;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory of the file store.
    pub store_dir: PathBuf,
    /// Byte quota over both namespaces. `None` = unbounded.
    pub quota_bytes: Option<u64>,
    /// Edge length of rendered composites, in pixels.
    pub output_size: u32,
    pub max_import_bytes: u64,
    /// Upper bound on an image's declared width times height.
    pub max_image_pixels: u64,
    /// RGBA painted when no base texture is available.
    pub fallback_color: [u8; 4],
    /// Width of newly added overlays, in percent.
    pub default_overlay_width: f64,
    /// Directory of `<model_id>.<ext>` base textures.
    pub base_models_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".decalkit"),
            quota_bytes: None,
            output_size: 2048,
            max_import_bytes: DEFAULT_MAX_IMPORT_BYTES,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            fallback_color: DEFAULT_FALLBACK_COLOR,
            default_overlay_width: DEFAULT_OVERLAY_WIDTH,
            base_models_dir: PathBuf::from("models"),
        }
    }
}

impl Settings {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when `path` is
    /// `None`. A missing default file yields defaults; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !explicit && !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let settings: Self = serde_json::from_str(&raw)?;
        settings.validate()?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_size == 0 || self.output_size > MAX_OUTPUT_SIZE {
            return Err(DecalError::Validation {
                reason: format!(
                    "output_size must be in 1..={}, got {}",
                    MAX_OUTPUT_SIZE, self.output_size
                ),
            });
        }
        if self.max_image_pixels == 0 || self.max_image_pixels > DEFAULT_MAX_IMAGE_PIXELS {
            return Err(DecalError::Validation {
                reason: format!(
                    "max_image_pixels must be in 1..={}, got {}",
                    DEFAULT_MAX_IMAGE_PIXELS, self.max_image_pixels
                ),
            });
        }
        if self.max_import_bytes == 0 {
            return Err(DecalError::Validation {
                reason: "max_import_bytes must be positive".to_string(),
            });
        }
        if !(self.default_overlay_width > 0.0 && self.default_overlay_width <= 100.0) {
            return Err(DecalError::Validation {
                reason: format!(
                    "default_overlay_width must be in (0, 100], got {}",
                    self.default_overlay_width
                ),
            });
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            output_size: self.output_size,
            max_import_bytes: self.max_import_bytes,
            max_image_pixels: self.max_image_pixels,
            default_overlay_width: self.default_overlay_width,
            fallback_color: self.fallback_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decalkit.json");
        std::fs::write(&path, r#"{"output_size": 512, "quota_bytes": 1000}"#).unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.output_size, 512);
        assert_eq!(settings.quota_bytes, Some(1000));
        assert_eq!(settings.store_dir, PathBuf::from(".decalkit"));
        assert_eq!(settings.fallback_color, [128, 128, 128, 255]);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decalkit.json");
        std::fs::write(&path, r#"{"output_size": 0}"#).unwrap();
        assert_eq!(
            Settings::load(Some(&path)).unwrap_err().error_code(),
            "VALIDATION"
        );

        let settings = Settings {
            default_overlay_width: 150.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_image_and_output_bounds_are_enforced() {
        let huge_output = Settings {
            output_size: 200_000,
            ..Settings::default()
        };
        assert_eq!(huge_output.validate().unwrap_err().error_code(), "VALIDATION");

        let no_pixels = Settings {
            max_image_pixels: 0,
            ..Settings::default()
        };
        assert!(no_pixels.validate().is_err());

        let tight = Settings {
            max_image_pixels: 1024,
            ..Settings::default()
        };
        assert!(tight.validate().is_ok());
        assert_eq!(tight.session_options().max_image_pixels, 1024);
    }

    #[test]
    fn test_session_options_follow_settings() {
        let settings = Settings {
            output_size: 256,
            fallback_color: [1, 2, 3, 4],
            ..Settings::default()
        };
        let options = settings.session_options();
        assert_eq!(options.output_size, 256);
        assert_eq!(options.fallback_color, [1, 2, 3, 4]);
    }
}
