//! Render surfaces and aspect handling.

use serde::{Deserialize, Serialize};

use crate::backend::{Rect, SurfaceKind, VideoGravity, VideoLayer};

/// A view supplied by the UI layer for video output.
///
/// The player checks [`kind`](Self::kind) against the engine's native view
/// kind before attaching anything, and never attaches to a disposed surface.
pub trait RenderSurface: Send + Sync {
    fn kind(&self) -> SurfaceKind;

    /// Current bounds. Read once, when a layer is attached.
    fn frame(&self) -> Rect;

    fn is_disposed(&self) -> bool;

    /// Host `layer` inside this surface.
    fn attach_layer(&self, layer: &dyn VideoLayer);

    /// Remove the layer previously attached. Called before the player drops
    /// that layer.
    fn detach_layer(&self);
}

/// How video is scaled into its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// Stretch to the surface bounds.
    None,
    /// Letterbox inside the bounds.
    #[default]
    AspectFit,
    /// Fill the bounds, cropping overflow.
    AspectFill,
}

impl AspectMode {
    /// The native gravity implementing this mode.
    pub fn gravity(self) -> VideoGravity {
        match self {
            Self::None => VideoGravity::Resize,
            Self::AspectFit => VideoGravity::ResizeAspect,
            Self::AspectFill => VideoGravity::ResizeAspectFill,
        }
    }
}
