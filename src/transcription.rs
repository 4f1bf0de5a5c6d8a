//! Voice note transcription (OpenAI-compatible `audio/transcriptions`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::foundation::error::{TalkreelError, TalkreelResult};

/// Opaque speech-to-text service.
#[async_trait]
pub trait VoiceTranscriber: Send + Sync {
    /// Transcribe `audio`; `file_name` carries the container extension the backend sniffs.
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> TalkreelResult<String>;
}

#[derive(Clone, Debug)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: String,
    /// Defaults to `whisper-1`.
    pub model: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Clone)]
pub struct HttpVoiceTranscriber {
    http: reqwest::Client,
    cfg: TranscriptionConfig,
}

impl HttpVoiceTranscriber {
    pub fn new(cfg: TranscriptionConfig) -> TalkreelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| TalkreelError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }
}

fn mime_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("ogg" | "oga" | "opus") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl VoiceTranscriber for HttpVoiceTranscriber {
    #[instrument(skip_all, fields(model = %self.cfg.model, bytes = audio.len()))]
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> TalkreelResult<String> {
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| TalkreelError::transcription(format!("invalid mime type: {e}")))?;
        let form = Form::new()
            .text("model", self.cfg.model.clone())
            .part("file", part);

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TalkreelError::transcription(format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TalkreelError::transcription(format!(
                "backend returned HTTP {status}: {body}"
            )));
        }
        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| TalkreelError::transcription(format!("malformed response: {e}")))?;

        let text = parsed.text.trim().to_string();
        debug!(chars = text.chars().count(), "voice transcribed");
        Ok(text)
    }
}
