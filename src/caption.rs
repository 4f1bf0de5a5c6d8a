//! Caption wrapping, font fitting and timed rolling windows.

pub mod font;
pub mod layout;
pub mod metrics;

pub use font::{CaptionFont, PositionedGlyph, ShapedLine};
pub use layout::{
    CaptionFrame, CaptionLayoutEngine, CaptionLayoutOpts, CaptionTiming, UpcomingPreview,
};
pub use metrics::{FixedAdvanceMetrics, TextMetrics};
