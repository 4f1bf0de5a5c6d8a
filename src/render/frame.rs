use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::{TalkreelError, TalkreelResult};

/// A composed frame as premultiplied RGBA8 pixels, row-major and tightly packed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl FrameRGBA {
    pub fn solid(canvas: Canvas, color: Rgba8Premul) -> Self {
        let px = color.to_array();
        Self {
            width: canvas.width,
            height: canvas.height,
            data: px.repeat((canvas.width as usize) * (canvas.height as usize)),
        }
    }

    pub fn transparent(canvas: Canvas) -> Self {
        Self::solid(canvas, Rgba8Premul::transparent())
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Check that the buffer matches `canvas` exactly.
    pub fn ensure_matches(&self, canvas: Canvas) -> TalkreelResult<()> {
        if self.width != canvas.width || self.height != canvas.height {
            return Err(TalkreelError::render(format!(
                "frame is {}x{}, expected {}x{}",
                self.width, self.height, canvas.width, canvas.height
            )));
        }
        if self.data.len() != canvas.byte_len() {
            return Err(TalkreelError::render(
                "frame data length does not match width*height*4",
            ));
        }
        Ok(())
    }

    /// Straight-alpha image for PNG export.
    pub fn to_rgba_image(&self) -> TalkreelResult<image::RgbaImage> {
        let mut straight = self.data.clone();
        for px in straight.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 0 || a == 255 {
                continue;
            }
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
            }
        }
        image::RgbaImage::from_raw(self.width, self.height, straight)
            .ok_or_else(|| TalkreelError::render("frame buffer does not match its dimensions"))
    }
}
