//! Text-to-speech: opaque synthesis backend plus duration resolution.

use std::io::Write as _;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::foundation::error::{TalkreelError, TalkreelResult};

/// Minimum duration used when only an estimate is available.
pub const MIN_ESTIMATED_SECS: f64 = 3.0;
/// Estimated speaking time per word.
pub const SECS_PER_WORD: f64 = 0.4;

/// Synthesis language. Selects the placeholder phrase and is passed to the backend as a hint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Language {
    #[default]
    English,
    Russian,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Russian => "ru",
        }
    }

    /// Spoken instead of an empty reply.
    pub fn placeholder_phrase(self) -> &'static str {
        match self {
            Self::English => "Sorry, I have nothing to say about that.",
            Self::Russian => "Извините, мне нечего на это ответить.",
        }
    }
}

impl FromStr for Language {
    type Err = TalkreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "ru" | "russian" => Ok(Self::Russian),
            other => Err(TalkreelError::validation(format!(
                "unsupported speech language '{other}'"
            ))),
        }
    }
}

/// Container of synthesized audio bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp3" => Some(Self::Mp3),
            "wav" => Some(Self::Wav),
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            _ => None,
        }
    }
}

/// How a [`SynthesizedSpeech::duration_secs`] value was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurationSource {
    /// Measured from the decoded audio.
    Decoded,
    /// Word-count estimate (`max(3.0, words * 0.4)`).
    Estimated,
}

#[derive(Clone, Debug)]
pub struct SynthesizedSpeech {
    pub audio: Vec<u8>,
    pub format: AudioFormat,
    pub duration_secs: f64,
    pub duration_source: DurationSource,
}

/// Opaque text-to-audio service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, language: Language)
    -> TalkreelResult<SynthesizedSpeech>;
}

/// Deterministic fallback duration for `text`.
pub fn estimate_duration_secs(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words * SECS_PER_WORD).max(MIN_ESTIMATED_SECS)
}

/// Text actually sent to the backend: empty input becomes the placeholder phrase.
pub fn speakable_text(text: &str, language: Language) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        language.placeholder_phrase()
    } else {
        trimmed
    }
}

/// Measure decoded audio length, falling back to the word-count estimate.
///
/// Blocking: writes `audio` to a scoped temp file and runs `ffprobe`.
pub fn resolve_duration(audio: &[u8], format: AudioFormat, text: &str) -> (f64, DurationSource) {
    match probe_audio_bytes(audio, format) {
        Ok(secs) if secs > 0.0 => (secs, DurationSource::Decoded),
        Ok(_) => {
            warn!("decoded audio reported zero duration, using estimate");
            (estimate_duration_secs(text), DurationSource::Estimated)
        }
        Err(e) => {
            debug!(error = %e, "audio duration probe unavailable, using estimate");
            (estimate_duration_secs(text), DurationSource::Estimated)
        }
    }
}

fn probe_audio_bytes(audio: &[u8], format: AudioFormat) -> TalkreelResult<f64> {
    if !crate::media::is_ffprobe_on_path() {
        return Err(TalkreelError::validation("ffprobe not found on PATH"));
    }
    let mut tmp = tempfile::Builder::new()
        .prefix("talkreel-speech-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile()
        .map_err(|e| TalkreelError::synthesis(format!("failed to create temp audio file: {e}")))?;
    tmp.write_all(audio)
        .and_then(|_| tmp.flush())
        .map_err(|e| TalkreelError::synthesis(format!("failed to write temp audio file: {e}")))?;
    crate::media::probe_duration_secs(tmp.path())
}

#[derive(Clone, Debug)]
pub struct SpeechConfig {
    /// API root, e.g. `https://api.openai.com/v1`. `/audio/speech` is appended.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    /// Send the synthesis language as a `language` field. Off for strict OpenAI-schema backends.
    pub language_hint: bool,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'static str>,
}

/// HTTP client for OpenAI-compatible `audio/speech` endpoints.
#[derive(Clone)]
pub struct HttpSpeechSynthesizer {
    http: reqwest::Client,
    cfg: SpeechConfig,
}

impl HttpSpeechSynthesizer {
    pub fn new(cfg: SpeechConfig) -> TalkreelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| TalkreelError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.cfg.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    #[instrument(skip_all, fields(model = %self.cfg.model, language = language.code()))]
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
    ) -> TalkreelResult<SynthesizedSpeech> {
        let input = speakable_text(text, language).to_string();
        let body = SpeechRequest {
            model: &self.cfg.model,
            input: &input,
            voice: &self.cfg.voice,
            response_format: "mp3",
            language: self.cfg.language_hint.then_some(language.code()),
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TalkreelError::synthesis(format!("speech request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TalkreelError::synthesis(format!(
                "speech backend returned HTTP {status}: {body}"
            )));
        }
        let audio = resp
            .bytes()
            .await
            .map_err(|e| TalkreelError::synthesis(format!("speech body read failed: {e}")))?
            .to_vec();
        if audio.is_empty() {
            return Err(TalkreelError::synthesis("speech backend returned no audio"));
        }

        let format = AudioFormat::Mp3;
        let (audio, duration_secs, duration_source) = tokio::task::spawn_blocking(move || {
            let (secs, source) = resolve_duration(&audio, format, &input);
            (audio, secs, source)
        })
        .await
        .map_err(|e| TalkreelError::synthesis(format!("duration probe task failed: {e}")))?;

        debug!(
            bytes = audio.len(),
            duration_secs,
            ?duration_source,
            "speech synthesized"
        );
        Ok(SynthesizedSpeech {
            audio,
            format,
            duration_secs,
            duration_source,
        })
    }
}
