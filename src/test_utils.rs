//! Shared fixtures for unit tests.

use image::{ImageEncoder, Rgba, RgbaImage};

use crate::overlay::{ImageFile, ImageFormat, OverlayImage, OverlayLayer};
use crate::render::Raster;

/// Encode a solid-color PNG.
pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .expect("PNG encoding of a fixture cannot fail");
    out
}

pub fn png_file(name: &str, width: u32, height: u32, rgba: [u8; 4]) -> ImageFile {
    ImageFile::new(name, png_bytes(width, height, rgba))
}

/// A decoded solid-color overlay with the given transform.
pub fn solid_layer(
    name: &str,
    rgba: [u8; 4],
    (x, y): (f64, f64),
    (w, h): (f64, f64),
    rotation: f64,
) -> OverlayLayer {
    let bytes = png_bytes(8, 8, rgba);
    let raster = Raster::decode(name, ImageFormat::Png, &bytes).expect("fixture decodes");
    let mut layer = OverlayLayer::new(name, OverlayImage::decoded(ImageFormat::Png, bytes, raster), w);
    layer.set_position(x, y);
    layer.set_size(w, h);
    layer.set_rotation(rotation);
    layer
}
