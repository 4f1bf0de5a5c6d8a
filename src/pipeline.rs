//! Message-to-reply orchestration.
//!
//! One run per inbound message: completion, speech synthesis, video rendering, then hand-off to
//! the transport. The user's session stays locked for the whole run, so runs for the same user
//! are serialized while different users proceed concurrently.

pub mod renderer;
pub mod state;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::completion::CompletionClient;
use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::render::compositor::MediaArtifact;
use crate::session::{ConversationTurn, SessionStore};
use crate::speech::{Language, SpeechSynthesizer, SynthesizedSpeech};
use crate::transport::inbound::InboundMessage;

pub use renderer::{CaptionStyle, ReelRenderer, ReplyRenderer, RollingCaptions};
pub use state::{FailureReason, PipelineState, StateTrace};

/// Transport-side receiver of finished replies.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Hand the rendered video and the reply text to the user.
    async fn deliver(&self, reply_text: &str, video: &MediaArtifact) -> TalkreelResult<()>;
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub language: Language,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You are a friendly assistant. Answer briefly, in two or three sentences."
                .to_string(),
            max_tokens: 300,
            language: Language::English,
        }
    }
}

/// Result of one pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub trace: StateTrace,
    /// Assistant reply, when completion succeeded.
    pub reply_text: Option<String>,
    /// Balance after the run.
    pub balance: u64,
}

impl PipelineReport {
    pub fn final_state(&self) -> PipelineState {
        self.trace.current()
    }

    pub fn failure(&self) -> Option<FailureReason> {
        match self.final_state() {
            PipelineState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.final_state() == PipelineState::Delivered
    }
}

pub struct ConversationPipeline {
    completion: Arc<dyn CompletionClient>,
    speech: Arc<dyn SpeechSynthesizer>,
    renderer: Arc<dyn ReplyRenderer>,
    sessions: Arc<SessionStore>,
    settings: PipelineSettings,
}

impl ConversationPipeline {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        speech: Arc<dyn SpeechSynthesizer>,
        renderer: Arc<dyn ReplyRenderer>,
        sessions: Arc<SessionStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            completion,
            speech,
            renderer,
            sessions,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(user = %inbound.user_id, message_id = inbound.message_id))]
    pub async fn run(&self, inbound: &InboundMessage, sink: &dyn ReplySink) -> PipelineReport {
        let mut session = self.sessions.lock(inbound.user_id).await;
        let mut trace = StateTrace::default();
        let text = inbound.text.trim();

        let precheck = if text.is_empty() {
            Err(TalkreelError::EmptyInput)
        } else if session.balance() == 0 {
            Err(TalkreelError::InsufficientCredit)
        } else {
            Ok(())
        };
        if let Err(e) = precheck {
            fail(&mut trace, &e);
            return PipelineReport {
                trace,
                reply_text: None,
                balance: session.balance(),
            };
        }

        let mut history = Vec::with_capacity(session.history_len() + 2);
        if !self.settings.system_prompt.trim().is_empty() {
            history.push(ConversationTurn::system(self.settings.system_prompt.clone()));
        }
        history.extend(session.history().cloned());
        history.push(ConversationTurn::user(text));

        let outcome = self.produce_and_deliver(&mut trace, &history, sink).await;
        let reply_text = match outcome {
            Ok(reply) => {
                // The balance was checked under this same lock, so the decrement cannot fail.
                if let Err(e) = session.decrement_balance() {
                    warn!(error = %e, "balance changed under session lock");
                }
                session.append_turn(ConversationTurn::user(text));
                session.append_turn(ConversationTurn::assistant(reply.clone()));
                info!(balance = session.balance(), "reply delivered");
                Some(reply)
            }
            Err((e, reply)) => {
                fail(&mut trace, &e);
                reply
            }
        };

        PipelineReport {
            trace,
            reply_text,
            balance: session.balance(),
        }
    }

    /// COMPLETING through DELIVERED. On error, returns the reply text if one was produced.
    async fn produce_and_deliver(
        &self,
        trace: &mut StateTrace,
        history: &[ConversationTurn],
        sink: &dyn ReplySink,
    ) -> Result<String, (TalkreelError, Option<String>)> {
        trace.advance(PipelineState::Completing).map_err(|e| (e, None))?;
        let reply = self
            .completion
            .complete(history, self.settings.max_tokens)
            .await
            .map_err(|e| (e, None))?;

        let with_reply = |e: TalkreelError| (e, Some(reply.clone()));

        trace.advance(PipelineState::Synthesizing).map_err(with_reply)?;
        let speech = self
            .speech
            .synthesize(&reply, self.settings.language)
            .await
            .map_err(with_reply)?;

        trace.advance(PipelineState::Rendering).map_err(with_reply)?;
        let video = self.render(&reply, speech).await.map_err(with_reply)?;
        sink.deliver(&reply, &video).await.map_err(with_reply)?;

        trace.advance(PipelineState::Delivered).map_err(with_reply)?;
        Ok(reply)
    }

    /// Rendering is CPU-bound and runs on the blocking pool.
    async fn render(&self, reply: &str, speech: SynthesizedSpeech) -> TalkreelResult<MediaArtifact> {
        let renderer = Arc::clone(&self.renderer);
        let text = reply.to_string();
        tokio::task::spawn_blocking(move || renderer.render_reply(&text, &speech))
            .await
            .map_err(|e| TalkreelError::render(format!("render task failed: {e}")))?
    }
}

fn fail(trace: &mut StateTrace, err: &TalkreelError) {
    let from = trace.current();
    let reason = from.failure_for(err);
    error!(state = ?from, %reason, error = %err, "pipeline run failed");
    if trace.advance(PipelineState::Failed(reason)).is_err() {
        warn!(state = ?from, "failure reported from a terminal state");
    }
}
