use std::sync::Arc;

use tracing::debug;

use crate::caption::font::CaptionFont;
use crate::caption::layout::{CaptionFrame, CaptionLayoutEngine, CaptionTiming};
use crate::foundation::core::Fps;
use crate::foundation::error::TalkreelResult;
use crate::render::background::BackgroundStyle;
use crate::render::compositor::{AudioTrack, FrameCompositor, MediaArtifact};
use crate::speech::SynthesizedSpeech;

/// Turns a reply and its synthesized speech into a video. Called from a blocking worker.
pub trait ReplyRenderer: Send + Sync {
    fn render_reply(&self, text: &str, speech: &SynthesizedSpeech) -> TalkreelResult<MediaArtifact>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollingCaptions {
    pub window_words: usize,
    pub preview_words: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptionStyle {
    pub max_lines: usize,
    pub base_font_size: u32,
    /// Word-synchronized captions; `None` shows the whole reply at once.
    pub rolling: Option<RollingCaptions>,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            max_lines: 4,
            base_font_size: 32,
            rolling: None,
        }
    }
}

/// Caption layout, background and compositor wired together.
pub struct ReelRenderer {
    compositor: FrameCompositor,
    layout: CaptionLayoutEngine<Arc<CaptionFont>>,
    background: BackgroundStyle,
    fps: Fps,
    style: CaptionStyle,
}

impl ReelRenderer {
    pub fn new(
        compositor: FrameCompositor,
        background: BackgroundStyle,
        fps: Fps,
        style: CaptionStyle,
    ) -> Self {
        let layout = CaptionLayoutEngine::new(Arc::clone(compositor.font()));
        Self {
            compositor,
            layout,
            background,
            fps,
            style,
        }
    }

    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    pub fn fps(&self) -> Fps {
        self.fps
    }

    pub fn background(&self) -> BackgroundStyle {
        self.background
    }

    pub fn style(&self) -> CaptionStyle {
        self.style
    }

    /// Caption frames for `text` spoken over `duration_secs`.
    pub fn captions(&self, text: &str, duration_secs: f64) -> Vec<CaptionFrame> {
        let width = self.compositor.canvas().width;
        match self.style.rolling {
            Some(rolling) => self.layout.layout_timed(
                text,
                width,
                self.style.max_lines,
                self.style.base_font_size,
                CaptionTiming {
                    window_words: rolling.window_words,
                    preview_words: rolling.preview_words,
                    duration_secs,
                    fps: self.fps,
                },
            ),
            None => self
                .layout
                .layout(text, width, self.style.max_lines, self.style.base_font_size),
        }
    }
}

impl ReplyRenderer for ReelRenderer {
    fn render_reply(&self, text: &str, speech: &SynthesizedSpeech) -> TalkreelResult<MediaArtifact> {
        let captions = self.captions(text, speech.duration_secs);
        debug!(
            captions = captions.len(),
            duration = speech.duration_secs,
            source = ?speech.duration_source,
            "captions laid out"
        );
        let background = self.background.source(self.compositor.canvas());
        self.compositor.render(
            background.as_ref(),
            &captions,
            AudioTrack {
                bytes: &speech.audio,
                format: speech.format,
                duration_secs: speech.duration_secs,
            },
            self.fps,
        )
    }
}
