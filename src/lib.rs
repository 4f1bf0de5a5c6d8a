#![forbid(unsafe_code)]

//! Telegram bot that answers each message with a captioned, voiced video note.
//!
//! A reply moves through [`ConversationPipeline`]: text completion, speech synthesis, caption
//! layout and frame composition, then hand-off to the transport. Rendering is CPU-only
//! (`vello_cpu` + `parley`) and encoding shells out to the system `ffmpeg`.

pub mod app;
pub mod caption;
pub mod completion;
pub mod config;
pub mod encode;
pub mod foundation;
pub mod media;
pub mod pipeline;
pub mod render;
pub mod retry;
pub mod session;
pub mod speech;
pub mod telemetry;
pub mod transcription;
pub mod transport;

pub use app::{AppContext, build_renderer};
pub use caption::{
    CaptionFont, CaptionFrame, CaptionLayoutEngine, CaptionLayoutOpts, CaptionTiming,
    FixedAdvanceMetrics, TextMetrics,
};
pub use completion::{CompletionClient, CompletionConfig, OpenAiCompletionClient};
pub use config::{AppConfig, RawConfig, RenderArgs, RenderConfig};
pub use encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, InMemorySink, SinkConfig};
pub use foundation::core::{Canvas, Fps, FrameIndex, Rgba8Premul};
pub use foundation::error::{TalkreelError, TalkreelResult};
pub use pipeline::{
    CaptionStyle, ConversationPipeline, FailureReason, PipelineReport, PipelineSettings,
    PipelineState, ReelRenderer, ReplyRenderer, ReplySink, RollingCaptions, StateTrace,
};
pub use render::{
    AudioTrack, BackgroundSource, BackgroundStyle, FrameCompositor, FrameCompositorOpts,
    FrameRGBA, MediaArtifact,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{ConversationTurn, Role, Session, SessionStore, SessionStoreOpts, UserId};
pub use speech::{
    AudioFormat, DurationSource, HttpSpeechSynthesizer, Language, SpeechConfig,
    SpeechSynthesizer, SynthesizedSpeech,
};
pub use transcription::{HttpVoiceTranscriber, TranscriptionConfig, VoiceTranscriber};
pub use transport::{DeliveryMode, InboundMessage};
