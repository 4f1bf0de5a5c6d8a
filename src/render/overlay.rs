//! Caption overlay drawing with `vello_cpu`.

use vello_cpu::kurbo::{Affine, RoundedRect, Shape as _};
use vello_cpu::peniko::Color;

use crate::caption::font::{CaptionFont, ShapedLine};
use crate::caption::layout::CaptionFrame;
use crate::foundation::core::Canvas;
use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::render::frame::FrameRGBA;

const PANEL_PAD_X: f64 = 15.0;
const PANEL_PAD_Y: f64 = 6.0;
const PANEL_RADIUS: f64 = 12.0;
const LINE_GAP: f64 = 15.0;
const PREVIEW_GAP: f64 = 24.0;
const SHADOW_OFFSET: f64 = 2.0;

const PANEL_RGBA: [u8; 4] = [0, 0, 0, 160];
const PREVIEW_PANEL_RGBA: [u8; 4] = [0, 0, 0, 110];
const SHADOW_RGBA: [u8; 4] = [0, 0, 0, 200];
const TEXT_RGBA: [u8; 4] = [255, 255, 255, 255];
const PREVIEW_TEXT_RGBA: [u8; 4] = [255, 255, 255, 170];

/// A caption frame with every line shaped, ready to be drawn on many video frames.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedCaption {
    pub lines: Vec<ShapedLine>,
    pub upcoming: Vec<ShapedLine>,
}

impl PreparedCaption {
    pub fn shape(caption: &CaptionFrame, font: &CaptionFont) -> Self {
        let lines = caption
            .lines
            .iter()
            .map(|l| font.shape_line(l, caption.font_size))
            .collect();
        let upcoming = caption
            .upcoming
            .iter()
            .flat_map(|u| u.lines.iter().map(|l| font.shape_line(l, u.font_size)))
            .collect();
        Self { lines, upcoming }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.upcoming.is_empty()
    }

    fn block_height(&self) -> f64 {
        let stack = |lines: &[ShapedLine]| -> f64 {
            let h: f64 = lines.iter().map(|l| f64::from(l.height)).sum();
            h + LINE_GAP * lines.len().saturating_sub(1) as f64
        };
        let mut total = stack(&self.lines);
        if !self.upcoming.is_empty() {
            if !self.lines.is_empty() {
                total += PREVIEW_GAP;
            }
            total += stack(&self.upcoming);
        }
        total
    }
}

/// Per-worker drawing state. One painter is created per rayon worker.
pub struct OverlayPainter {
    ctx: vello_cpu::RenderContext,
    canvas: Canvas,
}

impl OverlayPainter {
    pub fn new(canvas: Canvas) -> TalkreelResult<Self> {
        let (w, h) = canvas_u16(canvas)?;
        Ok(Self {
            ctx: vello_cpu::RenderContext::new(w, h),
            canvas,
        })
    }

    /// Draw `caption` centered on a transparent frame.
    ///
    /// Each line gets a rounded translucent panel, a drop shadow and white glyphs; the upcoming
    /// preview is stacked below in a fainter style.
    pub fn paint(
        &mut self,
        caption: &PreparedCaption,
        font: &vello_cpu::peniko::FontData,
    ) -> TalkreelResult<FrameRGBA> {
        if caption.is_empty() {
            return Ok(FrameRGBA::transparent(self.canvas));
        }
        let (w, h) = canvas_u16(self.canvas)?;
        self.ctx.reset();

        let mut y = (f64::from(self.canvas.height) - caption.block_height()) / 2.0;
        for line in &caption.lines {
            self.draw_line(line, y, font, PANEL_RGBA, TEXT_RGBA);
            y += f64::from(line.height) + LINE_GAP;
        }
        if !caption.upcoming.is_empty() && !caption.lines.is_empty() {
            y += PREVIEW_GAP - LINE_GAP;
        }
        for line in &caption.upcoming {
            self.draw_line(line, y, font, PREVIEW_PANEL_RGBA, PREVIEW_TEXT_RGBA);
            y += f64::from(line.height) + LINE_GAP;
        }

        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut pixmap);
        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: pixmap.data_as_u8_slice().to_vec(),
        })
    }

    fn draw_line(
        &mut self,
        line: &ShapedLine,
        top: f64,
        font: &vello_cpu::peniko::FontData,
        panel: [u8; 4],
        text: [u8; 4],
    ) {
        let width = f64::from(line.width);
        let x = (f64::from(self.canvas.width) - width) / 2.0;

        let rr = RoundedRect::new(
            x - PANEL_PAD_X,
            top - PANEL_PAD_Y,
            x + width + PANEL_PAD_X,
            top + f64::from(line.height) + PANEL_PAD_Y,
            PANEL_RADIUS,
        );
        self.ctx.set_transform(Affine::IDENTITY);
        self.ctx.set_paint(rgba(panel));
        self.ctx.fill_path(&rr.to_path(0.1));

        if line.glyphs.is_empty() {
            return;
        }
        for (offset, color) in [(SHADOW_OFFSET, SHADOW_RGBA), (0.0, text)] {
            self.ctx
                .set_transform(Affine::translate((x + offset, top + offset)));
            self.ctx.set_paint(rgba(color));
            let glyphs = line.glyphs.iter().map(|g| vello_cpu::Glyph {
                id: g.id,
                x: g.x,
                y: g.y,
            });
            self.ctx
                .glyph_run(font)
                .font_size(line.font_size)
                .fill_glyphs(glyphs);
        }
    }
}

fn rgba(c: [u8; 4]) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn canvas_u16(canvas: Canvas) -> TalkreelResult<(u16, u16)> {
    let w = u16::try_from(canvas.width)
        .map_err(|_| TalkreelError::render("canvas width exceeds u16"))?;
    let h = u16::try_from(canvas.height)
        .map_err(|_| TalkreelError::render("canvas height exceeds u16"))?;
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::font::PositionedGlyph;

    fn line(width: f32, height: f32) -> ShapedLine {
        ShapedLine {
            glyphs: Vec::<PositionedGlyph>::new(),
            font_size: 24.0,
            width,
            height,
        }
    }

    fn empty_font() -> vello_cpu::peniko::FontData {
        vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(Vec::<u8>::new()), 0)
    }

    #[test]
    fn block_height_includes_gaps_and_preview() {
        let caption = PreparedCaption {
            lines: vec![line(100.0, 30.0), line(80.0, 30.0)],
            upcoming: vec![line(50.0, 20.0)],
        };
        assert_eq!(caption.block_height(), 30.0 + 15.0 + 30.0 + 24.0 + 20.0);
    }

    #[test]
    fn empty_caption_paints_nothing() {
        let canvas = Canvas::square(32);
        let mut painter = OverlayPainter::new(canvas).unwrap();
        let caption = PreparedCaption {
            lines: vec![],
            upcoming: vec![],
        };
        let frame = painter.paint(&caption, &empty_font()).unwrap();
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn panel_is_centered_and_translucent() {
        let canvas = Canvas::square(64);
        let mut painter = OverlayPainter::new(canvas).unwrap();
        let caption = PreparedCaption {
            lines: vec![line(20.0, 10.0)],
            upcoming: vec![],
        };
        let frame = painter.paint(&caption, &empty_font()).unwrap();

        let center = frame.pixel(32, 32).unwrap();
        assert!((158..=162).contains(&center[3]), "alpha {}", center[3]);
        assert_eq!(&center[..3], &[0, 0, 0]);
        assert_eq!(frame.pixel(1, 1).unwrap()[3], 0);
        assert_eq!(frame.pixel(32, 2).unwrap()[3], 0);
    }
}
