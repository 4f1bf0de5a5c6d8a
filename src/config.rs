//! Process configuration: raw clap arguments (with env fallbacks) validated into [`AppConfig`].

use std::path::PathBuf;
use std::time::Duration;

use crate::completion::CompletionConfig;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::pipeline::{CaptionStyle, PipelineSettings, RollingCaptions};
use crate::render::background::BackgroundStyle;
use crate::session::SessionStoreOpts;
use crate::speech::{Language, SpeechConfig};
use crate::transcription::TranscriptionConfig;
use crate::transport::telegram::DeliveryMode;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

/// Video and caption settings, shared by the bot and the offline CLI commands.
#[derive(clap::Args, Clone, Debug)]
pub struct RenderArgs {
    /// Side of the square video, in pixels.
    #[arg(long, env = "CANVAS_SIZE", default_value_t = 480)]
    pub canvas_size: u32,

    #[arg(long, env = "FPS", default_value_t = 25)]
    pub fps: u32,

    /// TTF/OTF file used for captions.
    #[arg(long, env = "CAPTION_FONT", default_value = DEFAULT_FONT_PATH)]
    pub caption_font: PathBuf,

    #[arg(long, env = "CAPTION_MAX_LINES", default_value_t = 4)]
    pub caption_max_lines: usize,

    #[arg(long, env = "CAPTION_FONT_SIZE", default_value_t = 32)]
    pub caption_font_size: u32,

    /// Words per rolling caption window; unset shows the whole reply at once.
    #[arg(long, env = "CAPTION_WINDOW_WORDS")]
    pub caption_window_words: Option<usize>,

    /// Upcoming words previewed under a rolling caption.
    #[arg(long, env = "CAPTION_PREVIEW_WORDS", default_value_t = 3)]
    pub caption_preview_words: usize,

    #[arg(long, env = "BACKGROUND_STYLE", value_enum, default_value_t = BackgroundStyle::Gradient)]
    pub background_style: BackgroundStyle,

    #[arg(long, env = "MAX_VIDEO_SECS", default_value_t = 60.0)]
    pub max_video_secs: f64,

    /// Frame composition threads; defaults to one per core.
    #[arg(long, env = "RENDER_THREADS")]
    pub render_threads: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    pub font_path: PathBuf,
    pub caption: CaptionStyle,
    pub background: BackgroundStyle,
    pub max_video_secs: f64,
    pub threads: Option<usize>,
}

impl RenderArgs {
    pub fn validate(&self) -> TalkreelResult<RenderConfig> {
        let canvas = Canvas::square(self.canvas_size);
        canvas
            .validate()
            .map_err(|e| TalkreelError::config(format!("CANVAS_SIZE: {e}")))?;
        let fps = Fps::whole(self.fps).map_err(|e| TalkreelError::config(format!("FPS: {e}")))?;
        if self.caption_max_lines == 0 {
            return Err(TalkreelError::config("CAPTION_MAX_LINES must be >= 1"));
        }
        if self.caption_font_size == 0 {
            return Err(TalkreelError::config("CAPTION_FONT_SIZE must be >= 1"));
        }
        if !(self.max_video_secs.is_finite() && self.max_video_secs > 0.0) {
            return Err(TalkreelError::config("MAX_VIDEO_SECS must be > 0"));
        }
        if self.render_threads == Some(0) {
            return Err(TalkreelError::config("RENDER_THREADS must be >= 1 when set"));
        }
        let rolling = match self.caption_window_words {
            Some(0) => return Err(TalkreelError::config("CAPTION_WINDOW_WORDS must be >= 1")),
            Some(window_words) => Some(RollingCaptions {
                window_words,
                preview_words: self.caption_preview_words,
            }),
            None => None,
        };

        Ok(RenderConfig {
            canvas,
            fps,
            font_path: self.caption_font.clone(),
            caption: CaptionStyle {
                max_lines: self.caption_max_lines,
                base_font_size: self.caption_font_size,
                rolling,
            },
            background: self.background_style,
            max_video_secs: self.max_video_secs,
            threads: self.render_threads,
        })
    }
}

/// Everything the bot reads from flags or the environment.
#[derive(clap::Args, Clone, Debug)]
pub struct RawConfig {
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    #[arg(long, env = "COMPLETION_API_KEY", hide_env_values = true)]
    pub completion_api_key: Option<String>,

    #[arg(long, env = "COMPLETION_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub completion_base_url: String,

    #[arg(long, env = "COMPLETION_MODEL", default_value = "openai/gpt-4o-mini")]
    pub completion_model: String,

    #[arg(long, env = "MAX_TOKENS", default_value_t = 300)]
    pub max_tokens: u32,

    #[arg(long, env = "TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    #[arg(long, env = "SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Falls back to the completion key.
    #[arg(long, env = "SPEECH_API_KEY", hide_env_values = true)]
    pub speech_api_key: Option<String>,

    #[arg(long, env = "SPEECH_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub speech_base_url: String,

    #[arg(long, env = "SPEECH_MODEL", default_value = "tts-1")]
    pub speech_model: String,

    #[arg(long, env = "SPEECH_VOICE", default_value = "alloy")]
    pub speech_voice: String,

    #[arg(long, env = "SPEECH_LANGUAGE", value_enum, default_value_t = Language::English)]
    pub speech_language: Language,

    /// Pass the language to the speech backend; only for backends that accept the extra field.
    #[arg(long, env = "SPEECH_LANGUAGE_HINT", default_value_t = false)]
    pub speech_language_hint: bool,

    #[arg(long, env = "TRANSCRIPTION_MODEL", default_value = "whisper-1")]
    pub transcription_model: String,

    /// Timeout for each backend HTTP request, in seconds.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 60)]
    pub http_timeout_secs: u64,

    #[arg(long, env = "DELIVERY", value_enum, default_value_t = DeliveryMode::Polling)]
    pub delivery: DeliveryMode,

    /// Public HTTPS root the webhook is registered under.
    #[arg(long, env = "WEBHOOK_BASE_URL")]
    pub webhook_base_url: Option<String>,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "HISTORY_LIMIT", default_value_t = 20)]
    pub history_limit: usize,

    #[arg(long, env = "STARTING_CREDITS", default_value_t = 5)]
    pub starting_credits: u64,

    #[command(flatten)]
    pub render: RenderArgs,
}

/// Validated configuration, built once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram_token: String,
    pub delivery: DeliveryMode,
    pub webhook_base_url: Option<String>,
    pub port: u16,
    pub completion: CompletionConfig,
    pub speech: SpeechConfig,
    pub transcription: TranscriptionConfig,
    pub pipeline: PipelineSettings,
    pub sessions: SessionStoreOpts,
    pub render: RenderConfig,
}

impl AppConfig {
    pub fn from_raw(raw: RawConfig) -> TalkreelResult<Self> {
        let telegram_token = required(raw.telegram_token, "TELEGRAM_TOKEN")?;
        let completion_api_key = required(raw.completion_api_key, "COMPLETION_API_KEY")?;
        let speech_api_key = non_blank(raw.speech_api_key).unwrap_or_else(|| completion_api_key.clone());

        let webhook_base_url = non_blank(raw.webhook_base_url);
        if raw.delivery == DeliveryMode::Webhook && webhook_base_url.is_none() {
            return Err(TalkreelError::config(
                "WEBHOOK_BASE_URL is required when DELIVERY=webhook",
            ));
        }
        if raw.max_tokens == 0 {
            return Err(TalkreelError::config("MAX_TOKENS must be >= 1"));
        }
        if !(0.0..=2.0).contains(&raw.temperature) {
            return Err(TalkreelError::config("TEMPERATURE must be within 0..=2"));
        }
        if raw.history_limit == 0 {
            return Err(TalkreelError::config("HISTORY_LIMIT must be >= 1"));
        }
        let timeout = Duration::from_secs(raw.http_timeout_secs.max(1));
        let render = raw.render.validate()?;

        let mut pipeline = PipelineSettings {
            max_tokens: raw.max_tokens,
            language: raw.speech_language,
            ..PipelineSettings::default()
        };
        if let Some(prompt) = raw.system_prompt {
            pipeline.system_prompt = prompt;
        }

        Ok(Self {
            telegram_token,
            delivery: raw.delivery,
            webhook_base_url,
            port: raw.port,
            completion: CompletionConfig {
                base_url: raw.completion_base_url,
                api_key: completion_api_key,
                model: raw.completion_model,
                temperature: raw.temperature,
                timeout,
            },
            speech: SpeechConfig {
                base_url: raw.speech_base_url.clone(),
                api_key: speech_api_key.clone(),
                model: raw.speech_model,
                voice: raw.speech_voice,
                language_hint: raw.speech_language_hint,
                timeout,
            },
            transcription: TranscriptionConfig {
                base_url: raw.speech_base_url,
                api_key: speech_api_key,
                model: raw.transcription_model,
                timeout,
            },
            pipeline,
            sessions: SessionStoreOpts {
                starting_credits: raw.starting_credits,
                history_limit: raw.history_limit,
            },
            render,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> TalkreelResult<String> {
    non_blank(value).ok_or_else(|| TalkreelError::config(format!("{name} is not set")))
}
