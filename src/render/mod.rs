//! Rendering Module
//!
//! Raster buffers and the overlay compositor.

pub mod compositor;
pub mod raster;

pub use compositor::{composite, Compositor, PixelPlacement, DEFAULT_FALLBACK_COLOR};
pub use raster::{Raster, DEFAULT_MAX_IMAGE_PIXELS};
