//! Editor session
//!
//! Ties one overlay stack to its base texture and keeps the latest composite
//! current. Composites run on the blocking pool. A finished composite is
//! applied only if no newer one has been started since.

use serde_json::Value;
use tracing::{debug, info};

use super::controller::{EditSeq, InteractionController, InteractionState, PointerEvent, Viewport};
use crate::error::{DecalError, Result};
use crate::overlay::{
    import_image, ImageFile, ImportLimits, OverlayId, OverlayLayer, DEFAULT_MAX_IMPORT_BYTES,
    DEFAULT_OVERLAY_WIDTH,
};
use crate::render::{Compositor, Raster, DEFAULT_FALLBACK_COLOR, DEFAULT_MAX_IMAGE_PIXELS};
use crate::repository::{validate_name, ConflictDecision, CustomModelRecord, ModelRepository};

/// Edge length of overlay list thumbnails.
pub const THUMBNAIL_EDGE: u32 = 64;

/// Knobs of an editing session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    pub output_size: u32,
    pub max_import_bytes: u64,
    /// Declared width times height of an imported image.
    pub max_image_pixels: u64,
    pub default_overlay_width: f64,
    pub fallback_color: [u8; 4],
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            output_size: 2048,
            max_import_bytes: DEFAULT_MAX_IMPORT_BYTES,
            max_image_pixels: DEFAULT_MAX_IMAGE_PIXELS,
            default_overlay_width: DEFAULT_OVERLAY_WIDTH,
            fallback_color: DEFAULT_FALLBACK_COLOR,
        }
    }
}

/// One row of the overlay list.
#[derive(Debug, Clone)]
pub struct OverlaySummary {
    /// Z-index, 0 = bottom.
    pub index: usize,
    pub id: OverlayId,
    pub name: String,
    /// PNG bytes, `None` when the overlay has no decoded image.
    pub thumbnail: Option<Vec<u8>>,
}

/// Result of [`EditorSession::save_as`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { name: String },
    /// The name prompt returned nothing.
    Cancelled,
    /// The name exists and the conflict policy chose to keep it.
    Kept { name: String },
}

/// A snapshot of everything one composite needs.
#[derive(Debug, Clone)]
pub struct CompositeJob {
    seq: EditSeq,
    base: Option<Raster>,
    layers: Vec<OverlayLayer>,
    output_size: u32,
    compositor: Compositor,
}

impl CompositeJob {
    pub fn seq(&self) -> EditSeq {
        self.seq
    }

    /// Render on the blocking pool.
    pub async fn run(self) -> Result<(EditSeq, Raster)> {
        let seq = self.seq;
        let raster = tokio::task::spawn_blocking(move || {
            self.compositor
                .composite(self.base.as_ref(), &self.layers, self.output_size)
        })
        .await
        .map_err(|e| DecalError::Internal(format!("composite task failed: {}", e)))??;
        Ok((seq, raster))
    }
}

/// Live editing state for one custom model.
pub struct EditorSession {
    name: Option<String>,
    based_on: String,
    material_preset: String,
    material_properties: Value,
    base: Option<Raster>,
    controller: InteractionController,
    compositor: Compositor,
    options: SessionOptions,
    requested_seq: EditSeq,
    composite: Option<(EditSeq, Raster)>,
}

impl EditorSession {
    /// A blank session over `base`. Without a base the fallback color is used.
    pub fn new(based_on: impl Into<String>, base: Option<Raster>, options: SessionOptions) -> Self {
        Self {
            name: None,
            based_on: based_on.into(),
            material_preset: String::new(),
            material_properties: Value::Object(Default::default()),
            base,
            controller: InteractionController::default(),
            compositor: Compositor::new(options.fallback_color),
            options,
            requested_seq: 0,
            composite: None,
        }
    }

    /// Load a saved record and render it once.
    ///
    /// The base texture comes from the repository's provider when one is
    /// attached.
    pub async fn open(repo: &ModelRepository, name: &str, options: SessionOptions) -> Result<Self> {
        let record = repo.load(name).await?;
        let base = match repo.provider() {
            Some(provider) => Some(provider.resolve_base_raster(&record.based_on).await?),
            None => None,
        };

        let mut session = Self::new(record.based_on, base, options);
        session.name = Some(record.custom_name);
        session.material_preset = record.material_preset;
        session.material_properties = record.material_properties;
        let seq = session.controller.replace_layers(record.overlays);
        session.refresh(seq).await?;
        info!(name, overlays = session.controller.layers().len(), "opened custom model");
        Ok(session)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn based_on(&self) -> &str {
        &self.based_on
    }

    pub fn set_material(&mut self, preset: impl Into<String>, properties: Value) {
        self.material_preset = preset.into();
        self.material_properties = properties;
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        self.controller.layers()
    }

    pub fn state(&self) -> InteractionState {
        self.controller.state()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.controller.set_viewport(viewport);
    }

    /// Overlays bottom first, with thumbnails.
    pub fn list_overlays(&self) -> Result<Vec<OverlaySummary>> {
        self.controller
            .layers()
            .iter()
            .enumerate()
            .map(|(index, layer)| {
                let thumbnail = match layer.image.raster() {
                    Some(raster) => Some(raster.thumbnail(THUMBNAIL_EDGE)?.encode_png()?),
                    None => None,
                };
                Ok(OverlaySummary {
                    index,
                    id: layer.id,
                    name: layer.display_name.clone(),
                    thumbnail,
                })
            })
            .collect()
    }

    /// Latest applied composite.
    pub fn current_composite(&self) -> Option<&Raster> {
        self.composite.as_ref().map(|(_, raster)| raster)
    }

    /// Edit number of the latest applied composite.
    pub fn composite_seq(&self) -> Option<EditSeq> {
        self.composite.as_ref().map(|(seq, _)| *seq)
    }

    /// Snapshot the current stack for rendering at edit number `seq`.
    pub fn start_composite(&mut self, seq: EditSeq) -> CompositeJob {
        self.requested_seq = self.requested_seq.max(seq);
        CompositeJob {
            seq,
            base: self.base.clone(),
            layers: self.controller.layers().to_vec(),
            output_size: self.options.output_size,
            compositor: self.compositor,
        }
    }

    /// Install a finished composite unless a newer one has been started.
    pub fn apply_composite(&mut self, seq: EditSeq, raster: Raster) -> bool {
        let applied = self.composite_seq().unwrap_or(0);
        if seq < self.requested_seq || (self.composite.is_some() && seq <= applied) {
            debug!(seq, latest = self.requested_seq, "discarding stale composite");
            return false;
        }
        self.composite = Some((seq, raster));
        true
    }

    /// Render edit `seq` and apply it.
    async fn refresh(&mut self, seq: EditSeq) -> Result<()> {
        let (seq, raster) = self.start_composite(seq).run().await?;
        self.apply_composite(seq, raster);
        Ok(())
    }

    /// Render the current stack, e.g. before anything has been edited.
    pub async fn render(&mut self) -> Result<&Raster> {
        let seq = self.controller.edit_seq();
        let (seq, raster) = self.start_composite(seq).run().await?;
        self.composite = Some((seq, raster));
        self.current_composite()
            .ok_or_else(|| DecalError::Internal("composite missing after render".to_string()))
    }

    /// Import a picked file as a new overlay on top of the stack.
    ///
    /// Nothing is added when validation or decoding fails.
    pub async fn add_overlay(&mut self, file: ImageFile) -> Result<OverlayId> {
        let name = file.name.clone();
        let limits = ImportLimits {
            max_bytes: self.options.max_import_bytes,
            max_pixels: self.options.max_image_pixels,
        };
        let image = import_image(file, &limits).await?;
        let layer = OverlayLayer::new(name, image, self.options.default_overlay_width);
        let id = layer.id;
        let seq = self.controller.add_layer(layer);
        self.refresh(seq).await?;
        Ok(id)
    }

    pub async fn move_overlay(&mut self, id: OverlayId, x: f64, y: f64) -> Result<()> {
        let seq = self.controller.move_overlay(id, x, y)?;
        self.refresh(seq).await
    }

    pub async fn resize_overlay(&mut self, id: OverlayId, w: f64, h: f64) -> Result<()> {
        let seq = self.controller.resize_overlay(id, w, h)?;
        self.refresh(seq).await
    }

    pub async fn rotate_overlay(&mut self, id: OverlayId, degrees: f64) -> Result<()> {
        let seq = self.controller.rotate_overlay(id, degrees)?;
        self.refresh(seq).await
    }

    pub async fn delete_overlay(&mut self, id: OverlayId) -> Result<()> {
        let seq = self.controller.delete_overlay(id)?;
        self.refresh(seq).await
    }

    pub async fn move_layer(&mut self, id: OverlayId, new_index: usize) -> Result<()> {
        let seq = self.controller.move_layer(id, new_index)?;
        self.refresh(seq).await
    }

    pub async fn bring_to_front(&mut self, id: OverlayId) -> Result<()> {
        let seq = self.controller.bring_to_front(id)?;
        self.refresh(seq).await
    }

    pub async fn send_to_back(&mut self, id: OverlayId) -> Result<()> {
        let seq = self.controller.send_to_back(id)?;
        self.refresh(seq).await
    }

    pub fn select(&mut self, id: OverlayId) -> Result<()> {
        self.controller.select(id)
    }

    pub fn deselect(&mut self) {
        self.controller.deselect();
    }

    /// Feed a pointer event, re-rendering when it moved an overlay.
    pub async fn handle_pointer(&mut self, event: PointerEvent) -> Result<()> {
        match self.controller.handle_pointer(event) {
            Some(seq) => self.refresh(seq).await,
            None => Ok(()),
        }
    }

    /// The live state as a record named `name`.
    pub fn to_record(&self, name: &str) -> CustomModelRecord {
        CustomModelRecord::new(name, self.based_on.clone())
            .with_material(self.material_preset.clone(), self.material_properties.clone())
            .with_overlays(self.controller.layers().to_vec())
    }

    /// Save under a name chosen by `name_prompt`.
    ///
    /// `name_prompt` receives the current name, if any. When the chosen name
    /// already exists `conflict_policy` decides whether to overwrite it.
    pub async fn save_as(
        &mut self,
        repo: &ModelRepository,
        name_prompt: impl FnOnce(Option<&str>) -> Option<String>,
        conflict_policy: impl Fn(&str) -> ConflictDecision,
    ) -> Result<SaveOutcome> {
        let Some(raw_name) = name_prompt(self.name.as_deref()) else {
            return Ok(SaveOutcome::Cancelled);
        };
        let name = validate_name(&raw_name)?.to_string();

        if repo.exists(&name).await? && conflict_policy(&name) == ConflictDecision::Skip {
            return Ok(SaveOutcome::Kept { name });
        }

        repo.save(&name, &self.to_record(&name)).await?;
        self.name = Some(name.clone());
        Ok(SaveOutcome::Saved { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::{png_file, solid_layer};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn small_options() -> SessionOptions {
        SessionOptions {
            output_size: 100,
            ..SessionOptions::default()
        }
    }

    fn session() -> EditorSession {
        let base = Raster::solid(10, 10, [255, 255, 255, 255]).unwrap();
        EditorSession::new("car", Some(base), small_options())
    }

    #[tokio::test]
    async fn test_add_overlay_renders_and_lists() {
        let mut session = session();
        let id = session
            .add_overlay(png_file("red.png", 20, 10, [255, 0, 0, 255]))
            .await
            .unwrap();

        let layer = &session.layers()[0];
        assert_eq!(layer.id, id);
        assert_relative_eq!(layer.size.w, 30.0);
        assert_relative_eq!(layer.size.h, 15.0);
        assert_eq!(session.state(), InteractionState::Selected { id });

        let composite = session.current_composite().unwrap();
        assert_eq!(composite.width(), 100);
        assert_eq!(composite.pixel(50, 50), Some([255, 0, 0, 255]));
        assert_eq!(composite.pixel(5, 5), Some([255, 255, 255, 255]));

        let listed = session.list_overlays().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "red.png");
        let thumb = image::load_from_memory(listed[0].thumbnail.as_ref().unwrap()).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_rejected_file_adds_nothing() {
        let mut session = session();
        let err = session
            .add_overlay(ImageFile::new("notes.txt", b"hello".to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(session.layers().is_empty());
        assert!(session.current_composite().is_none());
    }

    #[tokio::test]
    async fn test_svg_declaring_huge_canvas_adds_nothing() {
        let mut session = session();
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="200000" height="200000"><rect width="1" height="1"/></svg>"#;
        let err = session
            .add_overlay(ImageFile::new("bomb.svg", svg.to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION");
        assert!(session.layers().is_empty());
        assert!(session.current_composite().is_none());
    }

    #[tokio::test]
    async fn test_numeric_edits_rerender() {
        let mut session = session();
        let id = session
            .add_overlay(png_file("red.png", 10, 10, [255, 0, 0, 255]))
            .await
            .unwrap();
        let before = session.composite_seq().unwrap();

        session.move_overlay(id, 150.0, -3.0).await.unwrap();
        assert_eq!(session.layers()[0].position.x, 100.0);
        assert_eq!(session.layers()[0].position.y, 0.0);
        assert_eq!(session.composite_seq(), Some(before + 1));

        session.resize_overlay(id, 10.0, 10.0).await.unwrap();
        session.rotate_overlay(id, 400.0).await.unwrap();
        assert_relative_eq!(session.layers()[0].rotation_degrees, 40.0);
        assert_eq!(session.composite_seq(), Some(before + 3));

        session.delete_overlay(id).await.unwrap();
        assert!(session.layers().is_empty());
        assert_eq!(
            session.current_composite().unwrap().pixel(99, 0),
            Some([255, 255, 255, 255])
        );
    }

    #[tokio::test]
    async fn test_drag_moves_overlay_and_rerenders() {
        let mut session = session();
        let id = session
            .add_overlay(png_file("red.png", 10, 10, [255, 0, 0, 255]))
            .await
            .unwrap();
        session.set_viewport(Viewport {
            width: 200.0,
            height: 200.0,
        });

        session
            .handle_pointer(PointerEvent::Down { x: 100.0, y: 100.0 })
            .await
            .unwrap();
        assert!(matches!(session.state(), InteractionState::Dragging { .. }));
        session
            .handle_pointer(PointerEvent::Move { x: 40.0, y: 60.0 })
            .await
            .unwrap();
        session.handle_pointer(PointerEvent::Up).await.unwrap();

        assert_eq!(session.state(), InteractionState::Selected { id });
        assert_relative_eq!(session.layers()[0].position.x, 20.0);
        assert_relative_eq!(session.layers()[0].position.y, 30.0);
        assert_eq!(session.current_composite().unwrap().pixel(20, 30), Some([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_stale_composite_is_discarded() {
        let mut session = session();
        session.controller.add_layer(solid_layer(
            "a.png",
            [255, 0, 0, 255],
            (50.0, 50.0),
            (10.0, 10.0),
            0.0,
        ));
        let stale = session.start_composite(1);
        let fresh = session.start_composite(2);

        let (seq, raster) = fresh.run().await.unwrap();
        assert!(session.apply_composite(seq, raster));
        let (seq, raster) = stale.run().await.unwrap();
        assert!(!session.apply_composite(seq, raster));
        assert_eq!(session.composite_seq(), Some(2));
    }

    #[tokio::test]
    async fn test_save_as_and_open() {
        let repo = ModelRepository::new(Arc::new(MemoryStore::new()));
        let mut session = session();
        session.set_material("glossy", serde_json::json!({"roughness": 0.4}));
        let id = session
            .add_overlay(png_file("red.png", 10, 10, [255, 0, 0, 255]))
            .await
            .unwrap();
        session.move_overlay(id, 25.0, 75.0).await.unwrap();

        let outcome = session
            .save_as(&repo, |current| {
                assert_eq!(current, None);
                Some("  red car ".to_string())
            }, |_| ConflictDecision::Overwrite)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { name: "red car".to_string() });
        assert_eq!(session.name(), Some("red car"));

        let reopened = EditorSession::open(&repo, "red car", small_options())
            .await
            .unwrap();
        assert_eq!(reopened.based_on(), "car");
        assert_eq!(reopened.layers().len(), 1);
        assert_relative_eq!(reopened.layers()[0].position.x, 25.0);
        assert!(reopened.current_composite().is_some());
    }

    #[tokio::test]
    async fn test_save_as_cancel_and_keep() {
        let repo = ModelRepository::new(Arc::new(MemoryStore::new()));
        let mut session = session();

        let outcome = session
            .save_as(&repo, |_| None, |_| ConflictDecision::Overwrite)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Cancelled);
        assert!(repo.list_names().await.unwrap().is_empty());

        repo.save("taken", &CustomModelRecord::new("taken", "van"))
            .await
            .unwrap();
        let outcome = session
            .save_as(&repo, |_| Some("taken".to_string()), |_| ConflictDecision::Skip)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Kept { name: "taken".to_string() });
        assert_eq!(repo.based_on("taken").await.unwrap(), "van");
        assert_eq!(session.name(), None);
    }
}
