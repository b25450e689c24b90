//! Interaction Controller
//!
//! Translates pointer events and numeric edits into overlay mutations.
//!
//! ```text
//! Idle --down on overlay--> Selected --down inside selection--> Dragging
//!  ^                          |  ^                                  |
//!  +------down on nothing-----+  +----------up / leave--------------+
//! ```
//!
//! Every mutation bumps the edit sequence number and returns it. The caller
//! runs exactly one composite per returned number and drops composites
//! whose number has been superseded.

use tracing::debug;

use crate::error::{DecalError, Result};
use crate::overlay::{OverlayId, OverlayLayer};

/// Monotonic edit counter. Each value asks for one composite.
pub type EditSeq = u64;

/// Pointer input in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up,
    Leave,
}

/// On-screen size of the surface the pointer moves over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    /// One pixel per percent.
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
        }
    }
}

impl Viewport {
    /// Pixel coordinates to percentage space.
    pub fn to_percent(&self, x: f64, y: f64) -> (f64, f64) {
        let width = if self.width > 0.0 { self.width } else { 1.0 };
        let height = if self.height > 0.0 { self.height } else { 1.0 };
        (x / width * 100.0, y / height * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionState {
    Idle,
    Selected {
        id: OverlayId,
    },
    Dragging {
        id: OverlayId,
        /// Pointer minus overlay center at drag start, in percent.
        offset_x: f64,
        offset_y: f64,
    },
}

impl InteractionState {
    pub fn selected_id(&self) -> Option<OverlayId> {
        match self {
            InteractionState::Idle => None,
            InteractionState::Selected { id } | InteractionState::Dragging { id, .. } => Some(*id),
        }
    }
}

/// Owns the live overlay stack and the selection state.
#[derive(Debug, Clone)]
pub struct InteractionController {
    layers: Vec<OverlayLayer>,
    state: InteractionState,
    viewport: Viewport,
    edit_seq: EditSeq,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InteractionController {
    pub fn new(layers: Vec<OverlayLayer>) -> Self {
        Self {
            layers,
            state: InteractionState::Idle,
            viewport: Viewport::default(),
            edit_seq: 0,
        }
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        &self.layers
    }

    pub fn layer(&self, id: OverlayId) -> Option<&OverlayLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn selected(&self) -> Option<&OverlayLayer> {
        self.state.selected_id().and_then(|id| self.layer(id))
    }

    pub fn edit_seq(&self) -> EditSeq {
        self.edit_seq
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn bump(&mut self) -> EditSeq {
        self.edit_seq += 1;
        self.edit_seq
    }

    fn index_of(&self, id: OverlayId) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| DecalError::OverlayNotFound { id: id.to_string() })
    }

    /// Topmost overlay whose axis-aligned box contains the point.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<OverlayId> {
        self.layers
            .iter()
            .rev()
            .find(|l| l.contains(x, y))
            .map(|l| l.id)
    }

    /// Feed one pointer event. Returns an edit number when overlays moved.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Option<EditSeq> {
        match (self.state, event) {
            (InteractionState::Idle, PointerEvent::Down { x, y }) => {
                let (px, py) = self.viewport.to_percent(x, y);
                if let Some(id) = self.hit_test(px, py) {
                    self.state = InteractionState::Selected { id };
                }
                None
            }
            (InteractionState::Selected { id }, PointerEvent::Down { x, y }) => {
                let (px, py) = self.viewport.to_percent(x, y);
                let selected_center = self
                    .layer(id)
                    .filter(|layer| layer.contains(px, py))
                    .map(|layer| layer.position);
                match selected_center {
                    Some(center) => {
                        self.state = InteractionState::Dragging {
                            id,
                            offset_x: px - center.x,
                            offset_y: py - center.y,
                        };
                    }
                    None => {
                        self.state = match self.hit_test(px, py) {
                            Some(other) => InteractionState::Selected { id: other },
                            None => InteractionState::Idle,
                        };
                    }
                }
                None
            }
            (
                InteractionState::Dragging {
                    id,
                    offset_x,
                    offset_y,
                },
                PointerEvent::Move { x, y },
            ) => {
                let (px, py) = self.viewport.to_percent(x, y);
                let index = self.index_of(id).ok()?;
                self.layers[index].set_position(px - offset_x, py - offset_y);
                Some(self.bump())
            }
            (InteractionState::Dragging { id, .. }, PointerEvent::Up | PointerEvent::Leave) => {
                self.state = InteractionState::Selected { id };
                None
            }
            // Moves outside a drag, and releases outside a drag, change nothing.
            _ => None,
        }
    }

    /// Select directly, e.g. from a list. Cancels any drag in progress.
    pub fn select(&mut self, id: OverlayId) -> Result<()> {
        self.index_of(id)?;
        self.state = InteractionState::Selected { id };
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.state = InteractionState::Idle;
    }

    /// Append on top of the stack and select it.
    pub fn add_layer(&mut self, layer: OverlayLayer) -> EditSeq {
        let id = layer.id;
        debug!(%id, name = %layer.display_name, "overlay added");
        self.layers.push(layer);
        self.state = InteractionState::Selected { id };
        self.bump()
    }

    pub fn move_overlay(&mut self, id: OverlayId, x: f64, y: f64) -> Result<EditSeq> {
        let index = self.index_of(id)?;
        self.layers[index].set_position(x, y);
        Ok(self.bump())
    }

    pub fn resize_overlay(&mut self, id: OverlayId, w: f64, h: f64) -> Result<EditSeq> {
        let index = self.index_of(id)?;
        self.layers[index].set_size(w, h);
        Ok(self.bump())
    }

    pub fn rotate_overlay(&mut self, id: OverlayId, degrees: f64) -> Result<EditSeq> {
        let index = self.index_of(id)?;
        self.layers[index].set_rotation(degrees);
        Ok(self.bump())
    }

    pub fn delete_overlay(&mut self, id: OverlayId) -> Result<EditSeq> {
        let index = self.index_of(id)?;
        let removed = self.layers.remove(index);
        if self.state.selected_id() == Some(id) {
            self.state = InteractionState::Idle;
        }
        debug!(%id, name = %removed.display_name, "overlay deleted");
        Ok(self.bump())
    }

    /// Move an overlay to a new z-index (0 = bottom), clamped to the stack.
    pub fn move_layer(&mut self, id: OverlayId, new_index: usize) -> Result<EditSeq> {
        let index = self.index_of(id)?;
        let layer = self.layers.remove(index);
        let new_index = new_index.min(self.layers.len());
        self.layers.insert(new_index, layer);
        Ok(self.bump())
    }

    pub fn bring_to_front(&mut self, id: OverlayId) -> Result<EditSeq> {
        self.move_layer(id, usize::MAX)
    }

    pub fn send_to_back(&mut self, id: OverlayId) -> Result<EditSeq> {
        self.move_layer(id, 0)
    }

    /// Swap in a whole stack, e.g. after loading a record.
    pub fn replace_layers(&mut self, layers: Vec<OverlayLayer>) -> EditSeq {
        self.layers = layers;
        self.state = InteractionState::Idle;
        self.bump()
    }
}
