//! Overlay layers
//!
//! Position and size live in percentage space: `[0, 100]` on both axes of
//! the composite surface, origin top-left, independent of pixel resolution.
//! `position` is the overlay's center.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::import::OverlayImage;

/// Width given to new overlays, in percent of the surface.
pub const DEFAULT_OVERLAY_WIDTH: f64 = 30.0;

/// Identifier of an overlay, unique within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OverlayId(Uuid);

impl OverlayId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OverlayId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub w: f64,
    pub h: f64,
}

/// Clamp a percentage into `[0, 100]`. NaN becomes 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Normalize degrees into `[0, 360)`. Non-finite input becomes 0.
pub fn normalize_rotation(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360.
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// One positioned, scaled and rotated image on the composite surface.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    pub id: OverlayId,
    /// Original file name, for listing only.
    pub display_name: String,
    pub position: Position,
    pub size: Size,
    /// Clockwise, about the overlay's center, in `[0, 360)`.
    pub rotation_degrees: f64,
    /// Source width / height at import. Advisory only.
    pub aspect_ratio: f64,
    pub image: OverlayImage,
}

impl OverlayLayer {
    /// A centered overlay `width` percent wide, with height following the
    /// source aspect ratio.
    pub fn new(display_name: impl Into<String>, image: OverlayImage, width: f64) -> Self {
        let aspect_ratio = image
            .raster()
            .map(|r| r.aspect_ratio())
            .filter(|a| a.is_finite() && *a > 0.0)
            .unwrap_or(1.0);
        let w = clamp_percent(width);
        Self {
            id: OverlayId::new(),
            display_name: display_name.into(),
            position: Position { x: 50.0, y: 50.0 },
            size: Size {
                w,
                h: clamp_percent(w / aspect_ratio),
            },
            rotation_degrees: 0.0,
            aspect_ratio,
            image,
        }
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.position = Position {
            x: clamp_percent(x),
            y: clamp_percent(y),
        };
    }

    /// Width and height are independent; the aspect ratio is not enforced.
    pub fn set_size(&mut self, w: f64, h: f64) {
        self.size = Size {
            w: clamp_percent(w),
            h: clamp_percent(h),
        };
    }

    pub fn set_rotation(&mut self, degrees: f64) {
        self.rotation_degrees = normalize_rotation(degrees);
    }

    /// Axis-aligned hit test in percentage space. Rotation is ignored.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let half_w = self.size.w / 2.0;
        let half_h = self.size.h / 2.0;
        x >= self.position.x - half_w
            && x <= self.position.x + half_w
            && y >= self.position.y - half_h
            && y <= self.position.y + half_h
    }
}
