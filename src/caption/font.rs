//! Font-backed text shaping for captions.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::caption::metrics::TextMetrics;
use crate::foundation::error::{TalkreelError, TalkreelResult};

/// One glyph positioned relative to the top-left of its line box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionedGlyph {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// A caption line shaped once and drawn on many frames.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapedLine {
    pub glyphs: Vec<PositionedGlyph>,
    pub font_size: f32,
    /// Advance width in pixels.
    pub width: f32,
    /// Line box height in pixels.
    pub height: f32,
}

/// Parley contexts plus the family registered from the caption font bytes.
struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext,
    family_name: String,
}

impl TextLayoutEngine {
    fn with_font(font_bytes: &[u8]) -> TalkreelResult<Self> {
        let mut font_ctx = parley::FontContext::default();
        let families = font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            TalkreelError::validation("no font families registered from caption font bytes")
        })?;
        let family_name = font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| TalkreelError::validation("registered font family has no name"))?
            .to_string();

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            family_name,
        })
    }

    fn layout_line(&mut self, text: &str, size_px: f32) -> parley::Layout<[u8; 4]> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.family_name.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));

        let mut layout: parley::Layout<[u8; 4]> = builder.build(text);
        layout.break_all_lines(None);
        layout
    }
}

/// The configured caption typeface: measures text for layout and shapes it for drawing.
pub struct CaptionFont {
    font_data: vello_cpu::peniko::FontData,
    engine: Mutex<TextLayoutEngine>,
}

impl std::fmt::Debug for CaptionFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptionFont").finish_non_exhaustive()
    }
}

impl CaptionFont {
    pub fn from_bytes(font_bytes: Vec<u8>) -> TalkreelResult<Self> {
        let engine = TextLayoutEngine::with_font(&font_bytes)?;
        let font_data =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes), 0);
        Ok(Self {
            font_data,
            engine: Mutex::new(engine),
        })
    }

    pub fn load(path: &Path) -> TalkreelResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            TalkreelError::config(format!(
                "failed to read caption font '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_bytes(bytes)
    }

    pub fn family_name(&self) -> String {
        self.engine().family_name.clone()
    }

    /// Font handle for `vello_cpu` glyph runs.
    pub fn font_data(&self) -> &vello_cpu::peniko::FontData {
        &self.font_data
    }

    // Shaping never panics while holding the lock, so a poisoned lock still holds valid contexts.
    fn engine(&self) -> MutexGuard<'_, TextLayoutEngine> {
        self.engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shape a single unwrapped line.
    pub fn shape_line(&self, text: &str, font_size: u32) -> ShapedLine {
        let size_px = font_size as f32;
        let layout = self.engine().layout_line(text, size_px);

        let mut glyphs = Vec::new();
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                glyphs.extend(run.positioned_glyphs().map(|g| PositionedGlyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                }));
            }
        }

        ShapedLine {
            glyphs,
            font_size: size_px,
            width: layout.width(),
            height: layout.height(),
        }
    }
}

impl TextMetrics for CaptionFont {
    fn line_width(&self, text: &str, font_size: u32) -> f32 {
        self.engine().layout_line(text, font_size as f32).width()
    }

    fn line_height(&self, font_size: u32) -> f32 {
        self.engine().layout_line("Ag", font_size as f32).height()
    }
}
