//! Composite Renderer
//!
//! Pure function of (base raster, ordered overlays, output size). Overlays
//! are painted in list order, index 0 at the bottom. Each overlay is drawn
//! centered on its position, scaled to its size and rotated clockwise
//! about its own center.

use tiny_skia::{FilterQuality, PixmapPaint, Transform};
use tracing::{debug, warn};

use crate::error::Result;
use crate::overlay::OverlayLayer;
use crate::render::raster::{new_pixmap, Raster};

/// Color painted when no base texture is available.
pub const DEFAULT_FALLBACK_COLOR: [u8; 4] = [128, 128, 128, 255];

/// Pixel-space placement of an overlay on a square output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPlacement {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub rotation_degrees: f32,
}

impl PixelPlacement {
    /// Map an overlay's percentage transform onto an `output_size` square.
    pub fn for_layer(layer: &OverlayLayer, output_size: u32) -> Self {
        let size = output_size as f64;
        Self {
            center_x: (layer.position.x / 100.0 * size) as f32,
            center_y: (layer.position.y / 100.0 * size) as f32,
            width: (layer.size.w / 100.0 * size) as f32,
            height: (layer.size.h / 100.0 * size) as f32,
            rotation_degrees: layer.rotation_degrees as f32,
        }
    }

    /// Transform taking image space (`0..img_w`, `0..img_h`) to output space.
    pub fn transform(&self, image_width: u32, image_height: u32) -> Transform {
        Transform::from_translate(self.center_x, self.center_y)
            .pre_concat(Transform::from_rotate(self.rotation_degrees))
            .pre_translate(-self.width / 2.0, -self.height / 2.0)
            .pre_scale(
                self.width / image_width as f32,
                self.height / image_height as f32,
            )
    }
}

/// Renders overlay stacks onto a base texture.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    fallback_color: [u8; 4],
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_COLOR)
    }
}

impl Compositor {
    pub fn new(fallback_color: [u8; 4]) -> Self {
        Self { fallback_color }
    }

    pub fn fallback_color(&self) -> [u8; 4] {
        self.fallback_color
    }

    /// Produce an `output_size` x `output_size` composite.
    ///
    /// Overlays without a decoded image are skipped with a warning; one bad
    /// layer never aborts the composite.
    pub fn composite(
        &self,
        base: Option<&Raster>,
        overlays: &[OverlayLayer],
        output_size: u32,
    ) -> Result<Raster> {
        let mut canvas = new_pixmap(output_size, output_size)?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };

        match base {
            Some(base) => {
                let scale = Transform::from_scale(
                    output_size as f32 / base.width() as f32,
                    output_size as f32 / base.height() as f32,
                );
                canvas.draw_pixmap(0, 0, base.as_pixmap_ref(), &paint, scale, None);
            }
            None => {
                let [r, g, b, a] = self.fallback_color;
                canvas.fill(tiny_skia::Color::from_rgba8(r, g, b, a));
            }
        }

        for (index, layer) in overlays.iter().enumerate() {
            let Some(image) = layer.image.raster() else {
                warn!(
                    index,
                    name = %layer.display_name,
                    "overlay image not decoded, skipping"
                );
                continue;
            };

            let placement = PixelPlacement::for_layer(layer, output_size);
            if placement.width <= 0.0 || placement.height <= 0.0 {
                debug!(index, "overlay has zero extent, nothing to draw");
                continue;
            }

            canvas.draw_pixmap(
                0,
                0,
                image.as_pixmap_ref(),
                &paint,
                placement.transform(image.width(), image.height()),
                None,
            );
        }

        Ok(Raster::from_pixmap(canvas))
    }
}

/// Composite with the default fallback color.
pub fn composite(base: Option<&Raster>, overlays: &[OverlayLayer], output_size: u32) -> Result<Raster> {
    Compositor::default().composite(base, overlays, output_size)
}
