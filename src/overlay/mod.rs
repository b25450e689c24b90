//! Overlay Module
//!
//! The overlay data model and image import.

pub mod import;
pub mod layer;

pub use import::{
    decode_image, import_image, restore_image, validate_import, ImageFile, ImageFormat,
    ImportLimits, OverlayImage, DEFAULT_MAX_IMPORT_BYTES,
};
pub use layer::{
    clamp_percent, normalize_rotation, OverlayId, OverlayLayer, Position, Size,
    DEFAULT_OVERLAY_WIDTH,
};
