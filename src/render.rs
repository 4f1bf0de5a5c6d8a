//! Frame composition: backgrounds, caption overlays and the parallel compositor.

pub mod background;
pub mod composite;
pub mod compositor;
pub mod frame;
pub mod overlay;

pub use background::{BackgroundSource, BackgroundStyle, GradientBackground, PulseBackground};
pub use compositor::{AudioTrack, FrameCompositor, FrameCompositorOpts, MediaArtifact};
pub use frame::FrameRGBA;
pub use overlay::{OverlayPainter, PreparedCaption};
