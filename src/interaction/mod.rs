//! Interaction Module
//!
//! The pointer state machine and the editing session built on it.

pub mod controller;
pub mod session;

pub use controller::{EditSeq, InteractionController, InteractionState, PointerEvent, Viewport};
pub use session::{
    CompositeJob, EditorSession, OverlaySummary, SaveOutcome, SessionOptions, THUMBNAIL_EDGE,
};
