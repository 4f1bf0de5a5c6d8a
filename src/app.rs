//! Process-wide wiring, built once from [`AppConfig`] and shared by every handler.

use std::sync::Arc;

use tracing::info;

use crate::caption::font::CaptionFont;
use crate::completion::{CompletionClient, OpenAiCompletionClient};
use crate::config::{AppConfig, RenderConfig};
use crate::foundation::error::TalkreelResult;
use crate::pipeline::{ConversationPipeline, ReelRenderer};
use crate::render::compositor::{FrameCompositor, FrameCompositorOpts};
use crate::retry::RetryPolicy;
use crate::session::SessionStore;
use crate::speech::{HttpSpeechSynthesizer, SpeechSynthesizer};
use crate::transcription::{HttpVoiceTranscriber, VoiceTranscriber};

pub struct AppContext {
    config: AppConfig,
    pipeline: ConversationPipeline,
    transcriber: Arc<dyn VoiceTranscriber>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        pipeline: ConversationPipeline,
        transcriber: Arc<dyn VoiceTranscriber>,
    ) -> Self {
        Self {
            config,
            pipeline,
            transcriber,
        }
    }

    /// Construct the HTTP backends, the renderer and an empty session store.
    pub fn build(config: AppConfig) -> TalkreelResult<Self> {
        let completion: Arc<dyn CompletionClient> = Arc::new(OpenAiCompletionClient::new(
            config.completion.clone(),
            RetryPolicy::default(),
        )?);
        let speech: Arc<dyn SpeechSynthesizer> =
            Arc::new(HttpSpeechSynthesizer::new(config.speech.clone())?);
        let transcriber: Arc<dyn VoiceTranscriber> =
            Arc::new(HttpVoiceTranscriber::new(config.transcription.clone())?);
        let renderer = Arc::new(build_renderer(&config.render)?);
        let sessions = Arc::new(SessionStore::new(config.sessions));

        info!(
            completion_model = %config.completion.model,
            speech_model = %config.speech.model,
            language = config.pipeline.language.code(),
            delivery = ?config.delivery,
            "application context ready"
        );
        let pipeline = ConversationPipeline::new(
            completion,
            speech,
            renderer,
            sessions,
            config.pipeline.clone(),
        );
        Ok(Self::new(config, pipeline, transcriber))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &ConversationPipeline {
        &self.pipeline
    }

    pub fn transcriber(&self) -> &dyn VoiceTranscriber {
        self.transcriber.as_ref()
    }
}

/// Load the caption font and assemble the compositor for `cfg`.
pub fn build_renderer(cfg: &RenderConfig) -> TalkreelResult<ReelRenderer> {
    let font = Arc::new(CaptionFont::load(&cfg.font_path)?);
    info!(font = %font.family_name(), path = %cfg.font_path.display(), "caption font loaded");
    let compositor = FrameCompositor::new(
        FrameCompositorOpts {
            canvas: cfg.canvas,
            threads: cfg.threads,
            max_video_secs: cfg.max_video_secs,
            ..FrameCompositorOpts::default()
        },
        font,
    )?;
    Ok(ReelRenderer::new(compositor, cfg.background, cfg.fps, cfg.caption))
}
