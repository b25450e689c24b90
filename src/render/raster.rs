//! Raster buffers
//!
//! A [`Raster`] is an immutable, cheaply clonable premultiplied RGBA pixel
//! buffer backed by a `tiny_skia::Pixmap`.

use std::io::Cursor;
use std::sync::Arc;

use image::{ImageReader, Limits};
use tiny_skia::{ColorU8, FilterQuality, Pixmap, PixmapPaint, PixmapRef, Transform};

use crate::error::{DecalError, Result};
use crate::overlay::ImageFormat;

/// Largest decoded image accepted by default: 8192 x 8192.
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 8192 * 8192;

/// Decoded image or composite output.
#[derive(Debug, Clone)]
pub struct Raster {
    pixmap: Arc<Pixmap>,
}

impl PartialEq for Raster {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.data() == other.data()
    }
}

impl Raster {
    /// Wrap a finished pixmap.
    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self {
            pixmap: Arc::new(pixmap),
        }
    }

    /// A raster filled with one straight-alpha RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let mut pixmap = new_pixmap(width, height)?;
        pixmap.fill(tiny_skia::Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
        Ok(Self::from_pixmap(pixmap))
    }

    /// Build from straight-alpha RGBA8 bytes, row-major.
    pub fn from_rgba8(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(DecalError::Internal(format!(
                "RGBA buffer has {} bytes, expected {}",
                rgba.len(),
                expected
            )));
        }
        let mut pixmap = new_pixmap(width, height)?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.chunks_exact(4)) {
            *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
        }
        Ok(Self::from_pixmap(pixmap))
    }

    /// Decode encoded image bytes under [`DEFAULT_MAX_IMAGE_PIXELS`].
    /// Runs synchronously; callers on an async runtime should go through
    /// [`crate::overlay::decode_image`].
    pub fn decode(name: &str, format: ImageFormat, bytes: &[u8]) -> Result<Self> {
        Self::decode_with_limit(name, format, bytes, DEFAULT_MAX_IMAGE_PIXELS)
    }

    /// Decode encoded image bytes, refusing images whose declared size
    /// exceeds `max_pixels` before any pixel buffer is allocated.
    pub fn decode_with_limit(
        name: &str,
        format: ImageFormat,
        bytes: &[u8],
        max_pixels: u64,
    ) -> Result<Self> {
        let decode_err = |reason: String| DecalError::Decode {
            name: name.to_string(),
            reason,
        };

        if format == ImageFormat::Svg {
            let tree = resvg::usvg::Tree::from_data(bytes, &resvg::usvg::Options::default())
                .map_err(|e| decode_err(e.to_string()))?;
            let declared = tree.size();
            check_pixel_budget(
                name,
                declared.width().ceil() as f64,
                declared.height().ceil() as f64,
                max_pixels,
            )?;
            let size = declared.to_int_size();
            if size.width() == 0 || size.height() == 0 {
                return Err(decode_err("SVG has empty dimensions".to_string()));
            }
            let mut pixmap = new_pixmap(size.width(), size.height())?;
            resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());
            return Ok(Self::from_pixmap(pixmap));
        }

        let image_format = format
            .to_image_format()
            .ok_or_else(|| decode_err(format!("no raster decoder for {}", format.mime())))?;

        // Header-only read; the full decode below happens only within budget.
        let (width, height) = ImageReader::with_format(Cursor::new(bytes), image_format)
            .into_dimensions()
            .map_err(|e| decode_err(e.to_string()))?;
        check_pixel_budget(name, width as f64, height as f64, max_pixels)?;

        let mut reader = ImageReader::with_format(Cursor::new(bytes), image_format);
        let mut limits = Limits::default();
        limits.max_image_width = Some(width);
        limits.max_image_height = Some(height);
        reader.limits(limits);
        let img = reader.decode().map_err(|e| decode_err(e.to_string()))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(decode_err("image has empty dimensions".to_string()));
        }
        Self::from_rgba8(width, height, rgba.as_raw())
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height() as f64
    }

    pub fn as_pixmap_ref(&self) -> PixmapRef<'_> {
        Pixmap::as_ref(&self.pixmap)
    }

    /// Premultiplied RGBA bytes.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    /// Straight-alpha RGBA of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.pixmap.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.pixmap
            .encode_png()
            .map_err(|e| DecalError::Internal(format!("PNG encoding failed: {}", e)))
    }

    /// Aspect-preserving downscale whose longer edge is `max_edge`.
    pub fn thumbnail(&self, max_edge: u32) -> Result<Self> {
        let max_edge = max_edge.max(1);
        let scale = (max_edge as f32 / self.width().max(self.height()) as f32).min(1.0);
        let width = ((self.width() as f32 * scale).round() as u32).max(1);
        let height = ((self.height() as f32 * scale).round() as u32).max(1);

        let mut pixmap = new_pixmap(width, height)?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(
            0,
            0,
            self.as_pixmap_ref(),
            &paint,
            Transform::from_scale(
                width as f32 / self.width() as f32,
                height as f32 / self.height() as f32,
            ),
            None,
        );
        Ok(Self::from_pixmap(pixmap))
    }
}

fn check_pixel_budget(name: &str, width: f64, height: f64, max_pixels: u64) -> Result<()> {
    if width * height > max_pixels as f64 {
        return Err(DecalError::Validation {
            reason: format!(
                "{} declares a {}x{} canvas, over the {} pixel limit",
                name, width, height, max_pixels
            ),
        });
    }
    Ok(())
}

pub(crate) fn new_pixmap(width: u32, height: u32) -> Result<Pixmap> {
    Pixmap::new(width, height).ok_or_else(|| DecalError::Validation {
        reason: format!("cannot allocate a {}x{} raster", width, height),
    })
}
