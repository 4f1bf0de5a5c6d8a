use std::sync::Arc;

/// Horizontal and vertical text measurement at a given font size.
///
/// Implementations must be deterministic: the same text and size always measure the same.
pub trait TextMetrics {
    /// Rendered advance width of a single line of `text`, in pixels.
    fn line_width(&self, text: &str, font_size: u32) -> f32;

    /// Baseline-to-baseline distance for one line, in pixels.
    fn line_height(&self, font_size: u32) -> f32;
}

impl<M: TextMetrics + ?Sized> TextMetrics for &M {
    fn line_width(&self, text: &str, font_size: u32) -> f32 {
        (**self).line_width(text, font_size)
    }

    fn line_height(&self, font_size: u32) -> f32 {
        (**self).line_height(font_size)
    }
}

impl<M: TextMetrics + ?Sized> TextMetrics for Arc<M> {
    fn line_width(&self, text: &str, font_size: u32) -> f32 {
        (**self).line_width(text, font_size)
    }

    fn line_height(&self, font_size: u32) -> f32 {
        (**self).line_height(font_size)
    }
}

/// Monospace approximation: every character advances by `advance_em × font_size`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedAdvanceMetrics {
    pub advance_em: f32,
    pub line_height_em: f32,
}

impl Default for FixedAdvanceMetrics {
    fn default() -> Self {
        Self {
            advance_em: 0.6,
            line_height_em: 1.2,
        }
    }
}

impl TextMetrics for FixedAdvanceMetrics {
    fn line_width(&self, text: &str, font_size: u32) -> f32 {
        text.chars().count() as f32 * self.advance_em * font_size as f32
    }

    fn line_height(&self, font_size: u32) -> f32 {
        self.line_height_em * font_size as f32
    }
}
