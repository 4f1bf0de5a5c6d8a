pub type TalkreelResult<T> = Result<T, TalkreelError>;

#[derive(thiserror::Error, Debug)]
pub enum TalkreelError {
    /// The completion backend failed after retries (or with a permanent status).
    #[error("completion backend error (status {}): {body}", status_label(*.status))]
    Backend { status: Option<u16>, body: String },

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("voice transcription error: {0}")]
    Transcription(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("insufficient credit")]
    InsufficientCredit,

    #[error("empty input")]
    EmptyInput,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TalkreelError {
    pub fn backend(status: Option<u16>, body: impl Into<String>) -> Self {
        Self::Backend {
            status,
            body: body.into(),
        }
    }

    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

fn status_label(status: Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}
