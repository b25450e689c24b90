//! Decalkit - Decal Overlays for Textured Models
//!
//! Places raster image "decals" on a model's base texture and persists the
//! result as named custom models.
//!
//! # Architecture
//!
//! - [`overlay`]: overlay layers in resolution-independent percentage space
//! - [`render`]: the deterministic compositor
//! - [`interaction`]: pointer state machine and editing session
//! - [`store`]: async two-namespace key/value store (records + blobs)
//! - [`repository`]: save/load/delete/export/import of custom models

pub mod cli;
pub mod config;
pub mod error;
pub mod interaction;
pub mod overlay;
pub mod render;
pub mod repository;
pub mod store;

#[cfg(test)]
mod test_utils;

pub use error::{DecalError, Result};
