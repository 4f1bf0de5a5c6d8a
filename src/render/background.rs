//! Animated backgrounds.

use std::f64::consts::TAU;

use crate::foundation::core::Canvas;
use crate::render::frame::FrameRGBA;

/// Produces the opaque background for `frame_index` of `total_frames`.
///
/// Any `Fn(u64, u64) -> FrameRGBA + Send + Sync` is a background source.
pub trait BackgroundSource: Send + Sync {
    fn frame(&self, frame_index: u64, total_frames: u64) -> FrameRGBA;
}

impl<F> BackgroundSource for F
where
    F: Fn(u64, u64) -> FrameRGBA + Send + Sync,
{
    fn frame(&self, frame_index: u64, total_frames: u64) -> FrameRGBA {
        self(frame_index, total_frames)
    }
}

/// Selectable rendering style.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackgroundStyle {
    /// Vertical blue to violet gradient with a slow wave.
    #[default]
    Gradient,
    /// Dark grayscale that brightens and dims once per clip.
    Pulse,
}

impl BackgroundStyle {
    pub fn source(self, canvas: Canvas) -> Box<dyn BackgroundSource> {
        match self {
            Self::Gradient => Box::new(GradientBackground { canvas }),
            Self::Pulse => Box::new(PulseBackground { canvas }),
        }
    }
}

fn loop_phase(frame_index: u64, total_frames: u64) -> f64 {
    frame_index as f64 / total_frames.max(1) as f64 * TAU
}

/// Fill each row with one color; rows are independent of x.
fn fill_rows(canvas: Canvas, mut row_color: impl FnMut(u32) -> [u8; 4]) -> FrameRGBA {
    let row_len = (canvas.width as usize) * 4;
    let mut data = Vec::with_capacity(canvas.byte_len());
    for y in 0..canvas.height {
        let px = row_color(y);
        let start = data.len();
        data.resize(start + row_len, 0);
        for chunk in data[start..].chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }
    FrameRGBA {
        width: canvas.width,
        height: canvas.height,
        data,
    }
}

fn channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Clone, Copy, Debug)]
pub struct GradientBackground {
    pub canvas: Canvas,
}

impl BackgroundSource for GradientBackground {
    fn frame(&self, frame_index: u64, total_frames: u64) -> FrameRGBA {
        let phase = loop_phase(frame_index, total_frames);
        let height = f64::from(self.canvas.height.max(1));
        fill_rows(self.canvas, |y| {
            let ratio = f64::from(y) / height;
            let t = ratio + 0.1 * (phase + ratio * TAU).sin();
            [
                channel(50.0 + 100.0 * t),
                channel(100.0 + 50.0 * t),
                channel(200.0 + 55.0 * (1.0 - t)),
                255,
            ]
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PulseBackground {
    pub canvas: Canvas,
}

impl BackgroundSource for PulseBackground {
    fn frame(&self, frame_index: u64, total_frames: u64) -> FrameRGBA {
        let pulse = 0.5 - 0.5 * loop_phase(frame_index, total_frames).cos();
        let height = f64::from(self.canvas.height.max(1));
        fill_rows(self.canvas, |y| {
            // Slightly darker towards the bottom edge.
            let shade = 1.0 - 0.25 * (f64::from(y) / height);
            let v = channel((30.0 + 45.0 * pulse) * shade);
            [v, v, v, 255]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_is_opaque_and_varies_vertically() {
        let canvas = Canvas::square(16);
        let f = GradientBackground { canvas }.frame(0, 10);
        assert_eq!(f.data.len(), canvas.byte_len());
        assert!(f.data.chunks_exact(4).all(|px| px[3] == 255));
        assert_ne!(f.pixel(0, 0), f.pixel(0, 15));
        assert_eq!(f.pixel(0, 5), f.pixel(15, 5));
    }

    #[test]
    fn gradient_animates_over_time() {
        let bg = GradientBackground {
            canvas: Canvas::square(8),
        };
        assert_ne!(bg.frame(0, 40), bg.frame(10, 40));
        assert_eq!(bg.frame(3, 40), bg.frame(3, 40));
    }

    #[test]
    fn pulse_is_grayscale_and_peaks_mid_clip() {
        let bg = PulseBackground {
            canvas: Canvas::square(4),
        };
        let start = bg.frame(0, 100).pixel(0, 0).unwrap();
        let mid = bg.frame(50, 100).pixel(0, 0).unwrap();
        assert_eq!(start[0], start[1]);
        assert_eq!(start[1], start[2]);
        assert!(mid[0] > start[0]);
    }

    #[test]
    fn closures_are_background_sources() {
        let canvas = Canvas::square(2);
        let src = move |_: u64, _: u64| FrameRGBA::transparent(canvas);
        assert_eq!(src.frame(0, 1).data, vec![0u8; 16]);
    }
}
