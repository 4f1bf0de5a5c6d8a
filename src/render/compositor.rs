//! Background + caption + audio to an encoded MP4.

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::caption::font::CaptionFont;
use crate::caption::layout::{CaptionFrame, active_caption_index};
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::{AudioInput, FrameSink, SinkConfig};
use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::foundation::math::smoothstep;
use crate::render::background::BackgroundSource;
use crate::render::composite::over_in_place;
use crate::render::frame::FrameRGBA;
use crate::render::overlay::{OverlayPainter, PreparedCaption};
use crate::speech::AudioFormat;

/// The encoded reply video.
#[derive(Clone, Debug)]
pub struct MediaArtifact {
    pub audio_duration_seconds: f64,
    pub video_bytes: Vec<u8>,
    pub frame_count: u64,
    pub fps: Fps,
}

/// Encoded audio handed to the compositor.
#[derive(Clone, Copy, Debug)]
pub struct AudioTrack<'a> {
    pub bytes: &'a [u8],
    pub format: AudioFormat,
    pub duration_secs: f64,
}

#[derive(Clone, Debug)]
pub struct FrameCompositorOpts {
    pub canvas: Canvas,
    /// Worker threads for frame composition; `None` uses rayon's default.
    pub threads: Option<usize>,
    /// Frames composed per parallel batch before being pushed to the encoder.
    pub chunk_size: usize,
    /// Caption fade-in length at the start of the clip.
    pub fade_in_secs: f64,
    /// Upper bound on the rendered length.
    pub max_video_secs: f64,
}

impl Default for FrameCompositorOpts {
    fn default() -> Self {
        Self {
            canvas: Canvas::square(480),
            threads: None,
            chunk_size: 64,
            fade_in_secs: 0.5,
            max_video_secs: 60.0,
        }
    }
}

/// Composes caption overlays over a background on a dedicated rayon pool and streams the
/// frames, in order, to a [`FrameSink`].
pub struct FrameCompositor {
    opts: FrameCompositorOpts,
    font: Arc<CaptionFont>,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for FrameCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCompositor")
            .field("opts", &self.opts)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl FrameCompositor {
    pub fn new(opts: FrameCompositorOpts, font: Arc<CaptionFont>) -> TalkreelResult<Self> {
        opts.canvas.validate()?;
        if !opts.canvas.is_square() {
            return Err(TalkreelError::validation(
                "video notes require a square canvas",
            ));
        }
        if !(opts.max_video_secs.is_finite() && opts.max_video_secs > 0.0) {
            return Err(TalkreelError::validation("max_video_secs must be > 0"));
        }
        let pool = build_thread_pool(opts.threads)?;
        Ok(Self { opts, font, pool })
    }

    pub fn opts(&self) -> &FrameCompositorOpts {
        &self.opts
    }

    pub fn canvas(&self) -> Canvas {
        self.opts.canvas
    }

    pub fn font(&self) -> &Arc<CaptionFont> {
        &self.font
    }

    pub fn total_frames(&self, audio_duration_secs: f64, fps: Fps) -> u64 {
        total_frames_for(audio_duration_secs, fps, self.opts.max_video_secs)
    }

    pub fn caption_opacity(&self, frame: u64, fps: Fps) -> f32 {
        fade_in_opacity(frame, fps, self.opts.fade_in_secs)
    }

    /// Render the clip and mux `audio` into an MP4.
    ///
    /// All intermediate files live in a temp directory that is removed on every exit path.
    #[instrument(skip_all, fields(captions = captions.len(), audio_secs = audio.duration_secs))]
    pub fn render(
        &self,
        background: &dyn BackgroundSource,
        captions: &[CaptionFrame],
        audio: AudioTrack<'_>,
        fps: Fps,
    ) -> TalkreelResult<MediaArtifact> {
        if audio.bytes.is_empty() {
            return Err(TalkreelError::render("audio track is empty"));
        }
        let scratch = tempfile::Builder::new()
            .prefix("talkreel-render-")
            .tempdir()
            .map_err(|e| TalkreelError::render(format!("failed to create temp dir: {e}")))?;
        let audio_path = scratch
            .path()
            .join(format!("speech.{}", audio.format.extension()));
        std::fs::write(&audio_path, audio.bytes)
            .map_err(|e| TalkreelError::render(format!("failed to write audio track: {e}")))?;
        let out_path = scratch.path().join("reply.mp4");

        let total_frames = self.total_frames(audio.duration_secs, fps);
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out_path));
        self.compose_into(
            background,
            captions,
            fps,
            total_frames,
            Some(AudioInput { path: audio_path }),
            &mut sink,
        )?;
        drop(sink);

        let video_bytes = std::fs::read(&out_path)
            .map_err(|e| TalkreelError::render(format!("failed to read encoded video: {e}")))?;
        info!(
            frames = total_frames,
            bytes = video_bytes.len(),
            "reply video encoded"
        );
        Ok(MediaArtifact {
            audio_duration_seconds: audio.duration_secs,
            video_bytes,
            frame_count: total_frames,
            fps,
        })
    }

    /// Compose `total_frames` frames and push them to `sink` in timeline order.
    pub fn compose_into(
        &self,
        background: &dyn BackgroundSource,
        captions: &[CaptionFrame],
        fps: Fps,
        total_frames: u64,
        audio: Option<AudioInput>,
        sink: &mut dyn FrameSink,
    ) -> TalkreelResult<()> {
        let prepared: Vec<PreparedCaption> = captions
            .iter()
            .map(|c| PreparedCaption::shape(c, &self.font))
            .collect();

        sink.begin(SinkConfig {
            width: self.opts.canvas.width,
            height: self.opts.canvas.height,
            fps,
            audio,
        })?;

        let chunk_size = self.opts.chunk_size.max(1) as u64;
        let mut chunk_start = 0;
        while chunk_start < total_frames {
            let chunk_end = (chunk_start + chunk_size).min(total_frames);
            let frames = self.compose_chunk(
                background,
                captions,
                &prepared,
                chunk_start..chunk_end,
                total_frames,
                fps,
            )?;
            for (idx, frame) in (chunk_start..chunk_end).zip(&frames) {
                sink.push_frame(FrameIndex(idx), frame)?;
            }
            debug!(chunk_start, chunk_end, total_frames, "chunk encoded");
            chunk_start = chunk_end;
        }

        sink.end()
    }

    /// Compose a single frame (used for previews).
    pub fn compose_frame(
        &self,
        background: &dyn BackgroundSource,
        captions: &[CaptionFrame],
        frame: u64,
        total_frames: u64,
        fps: Fps,
    ) -> TalkreelResult<FrameRGBA> {
        let prepared: Vec<PreparedCaption> = captions
            .iter()
            .map(|c| PreparedCaption::shape(c, &self.font))
            .collect();
        let mut frames = self.compose_chunk(
            background,
            captions,
            &prepared,
            frame..frame + 1,
            total_frames,
            fps,
        )?;
        frames
            .pop()
            .ok_or_else(|| TalkreelError::render("no frame composed"))
    }

    /// Overlays are painted once per distinct caption active in the chunk, then every frame is
    /// composed in parallel.
    fn compose_chunk(
        &self,
        background: &dyn BackgroundSource,
        captions: &[CaptionFrame],
        prepared: &[PreparedCaption],
        range: Range<u64>,
        total_frames: u64,
        fps: Fps,
    ) -> TalkreelResult<Vec<FrameRGBA>> {
        let active: Vec<Option<usize>> = range
            .clone()
            .map(|f| active_caption_index(captions, f))
            .collect();
        let mut unique: Vec<usize> = active.iter().flatten().copied().collect();
        unique.dedup();

        let canvas = self.opts.canvas;
        let font_data = self.font.font_data();
        let painted = self.pool.install(|| {
            unique
                .par_iter()
                .map_init(
                    || OverlayPainter::new(canvas),
                    |painter, &ci| -> TalkreelResult<(usize, FrameRGBA)> {
                        let painter = painter.as_mut().map_err(|e| {
                            TalkreelError::render(format!("overlay painter unavailable: {e}"))
                        })?;
                        Ok((ci, painter.paint(&prepared[ci], font_data)?))
                    },
                )
                .collect::<Vec<_>>()
        });
        let overlays = painted.into_iter().collect::<TalkreelResult<Vec<_>>>()?;
        let overlay_for = |ci: usize| {
            overlays
                .iter()
                .find(|(i, _)| *i == ci)
                .map(|(_, frame)| frame)
        };

        let start = range.start;
        let composed = self.pool.install(|| {
            range
                .into_par_iter()
                .map(|f| -> TalkreelResult<FrameRGBA> {
                    let mut frame = background.frame(f, total_frames);
                    frame.ensure_matches(canvas)?;
                    if let Some(overlay) = active[(f - start) as usize].and_then(overlay_for) {
                        over_in_place(&mut frame.data, &overlay.data, self.caption_opacity(f, fps))?;
                    }
                    Ok(frame)
                })
                .collect::<Vec<_>>()
        });
        composed.into_iter().collect()
    }
}

/// `max(1, ceil(min(audio, max_video_secs) × fps))`: the video always covers the audio.
pub fn total_frames_for(audio_duration_secs: f64, fps: Fps, max_video_secs: f64) -> u64 {
    let secs = audio_duration_secs.clamp(0.0, max_video_secs);
    fps.secs_to_frames_ceil(secs).max(1)
}

/// Caption opacity at `frame`, eased from 0 to 1 over the first `fade_in_secs`.
pub fn fade_in_opacity(frame: u64, fps: Fps, fade_in_secs: f64) -> f32 {
    let fade_frames = fps.secs_to_frames_floor(fade_in_secs);
    if fade_frames == 0 {
        return 1.0;
    }
    smoothstep(0.0, fade_frames as f32, frame as f32)
}

fn build_thread_pool(threads: Option<usize>) -> TalkreelResult<rayon::ThreadPool> {
    if threads == Some(0) {
        return Err(TalkreelError::validation(
            "render threads must be >= 1 when set",
        ));
    }
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("talkreel-render-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| TalkreelError::render(format!("failed to build rayon thread pool: {e}")))
}
