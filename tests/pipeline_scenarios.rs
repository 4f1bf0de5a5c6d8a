use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use talkreel::{
    AudioFormat, CompletionClient, ConversationPipeline, ConversationTurn, DurationSource,
    FailureReason, Fps, InboundMessage, Language, MediaArtifact, PipelineSettings, PipelineState,
    ReplyRenderer, ReplySink, Role, SessionStore, SessionStoreOpts, SpeechSynthesizer,
    SynthesizedSpeech, TalkreelError, TalkreelResult, UserId,
};

#[derive(Default)]
struct FakeCompletion {
    calls: AtomicUsize,
    fail: bool,
    seen: Mutex<Vec<Vec<ConversationTurn>>>,
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, history: &[ConversationTurn], _max_tokens: u32) -> TalkreelResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(history.to_vec());
        if self.fail {
            return Err(TalkreelError::backend(Some(500), "upstream down"));
        }
        let last = history.last().map(|t| t.content.clone()).unwrap_or_default();
        Ok(format!("You said: {last}"))
    }
}

#[derive(Default)]
struct FakeSpeech {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, text: &str, _language: Language) -> TalkreelResult<SynthesizedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TalkreelError::synthesis("voice backend returned HTTP 500"));
        }
        Ok(SynthesizedSpeech {
            audio: text.as_bytes().to_vec(),
            format: AudioFormat::Mp3,
            duration_secs: 2.0,
            duration_source: DurationSource::Estimated,
        })
    }
}

#[derive(Default)]
struct FakeRenderer {
    fail: bool,
}

impl ReplyRenderer for FakeRenderer {
    fn render_reply(&self, _text: &str, speech: &SynthesizedSpeech) -> TalkreelResult<MediaArtifact> {
        if self.fail {
            return Err(TalkreelError::render("ffmpeg exited with status 1"));
        }
        let fps = Fps::whole(25)?;
        Ok(MediaArtifact {
            audio_duration_seconds: speech.duration_secs,
            video_bytes: b"mp4".to_vec(),
            frame_count: fps.secs_to_frames_ceil(speech.duration_secs),
            fps,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<String>>,
    reject: bool,
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn deliver(&self, reply_text: &str, video: &MediaArtifact) -> TalkreelResult<()> {
        if self.reject {
            return Err(TalkreelError::delivery("chat not found"));
        }
        assert!(!video.video_bytes.is_empty());
        self.delivered.lock().unwrap().push(reply_text.to_string());
        Ok(())
    }
}

struct Harness {
    completion: Arc<FakeCompletion>,
    speech: Arc<FakeSpeech>,
    pipeline: ConversationPipeline,
}

fn harness(starting_credits: u64, completion: FakeCompletion) -> Harness {
    harness_with(
        starting_credits,
        completion,
        FakeSpeech::default(),
        FakeRenderer::default(),
    )
}

fn harness_with(
    starting_credits: u64,
    completion: FakeCompletion,
    speech: FakeSpeech,
    renderer: FakeRenderer,
) -> Harness {
    let completion = Arc::new(completion);
    let speech = Arc::new(speech);
    let sessions = Arc::new(SessionStore::new(SessionStoreOpts {
        starting_credits,
        history_limit: 20,
    }));
    let pipeline = ConversationPipeline::new(
        completion.clone(),
        speech.clone(),
        Arc::new(renderer),
        sessions,
        PipelineSettings::default(),
    );
    Harness {
        completion,
        speech,
        pipeline,
    }
}

const USER: UserId = UserId(42);

fn message(text: &str) -> InboundMessage {
    InboundMessage::new(USER, 42, 1, text)
}

#[tokio::test]
async fn hello_is_delivered_and_charged() {
    let h = harness(1, FakeCompletion::default());
    let sink = RecordingSink::default();

    let report = h.pipeline.run(&message("Hello"), &sink).await;

    assert!(report.is_delivered());
    assert_eq!(
        report.trace.states(),
        &[
            PipelineState::Received,
            PipelineState::Completing,
            PipelineState::Synthesizing,
            PipelineState::Rendering,
            PipelineState::Delivered,
        ]
    );
    assert_eq!(report.balance, 0);
    assert_eq!(report.reply_text.as_deref(), Some("You said: Hello"));
    assert_eq!(*sink.delivered.lock().unwrap(), vec!["You said: Hello".to_string()]);

    let session = h.pipeline.sessions().get_or_create(USER).await;
    let turns: Vec<(Role, String)> = session.history().map(|t| (t.role, t.content.clone())).collect();
    assert_eq!(
        turns,
        vec![
            (Role::User, "Hello".to_string()),
            (Role::Assistant, "You said: Hello".to_string()),
        ]
    );
}

#[tokio::test]
async fn zero_balance_fails_without_backend_calls() {
    let h = harness(0, FakeCompletion::default());
    let sink = RecordingSink::default();

    let report = h.pipeline.run(&message("Hello"), &sink).await;

    assert_eq!(report.failure(), Some(FailureReason::NoCredit));
    assert_eq!(report.balance, 0);
    assert_eq!(h.completion.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    assert!(sink.delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn blank_message_is_empty_input() {
    let h = harness(3, FakeCompletion::default());
    let report = h.pipeline.run(&message("   \n"), &RecordingSink::default()).await;

    assert_eq!(report.failure(), Some(FailureReason::EmptyInput));
    assert_eq!(report.balance, 3);
    assert_eq!(h.completion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn backend_failure_does_not_charge() {
    let h = harness(
        2,
        FakeCompletion {
            fail: true,
            ..Default::default()
        },
    );
    let report = h.pipeline.run(&message("Hello"), &RecordingSink::default()).await;

    assert_eq!(report.failure(), Some(FailureReason::Backend));
    assert_eq!(report.balance, 2);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    let session = h.pipeline.sessions().get_or_create(USER).await;
    assert_eq!(session.history_len(), 0);
}

#[tokio::test]
async fn synthesis_failure_does_not_charge() {
    let h = harness_with(
        2,
        FakeCompletion::default(),
        FakeSpeech {
            fail: true,
            ..Default::default()
        },
        FakeRenderer::default(),
    );
    let sink = RecordingSink::default();
    let report = h.pipeline.run(&message("Hello"), &sink).await;

    assert_eq!(report.failure(), Some(FailureReason::Synthesis));
    assert_eq!(
        report.trace.states(),
        &[
            PipelineState::Received,
            PipelineState::Completing,
            PipelineState::Synthesizing,
            PipelineState::Failed(FailureReason::Synthesis),
        ]
    );
    assert_eq!(report.balance, 2);
    assert_eq!(h.speech.calls.load(Ordering::SeqCst), 1);
    assert!(sink.delivered.lock().unwrap().is_empty());
    let session = h.pipeline.sessions().get_or_create(USER).await;
    assert_eq!(session.history_len(), 0);
}

#[tokio::test]
async fn render_failure_does_not_charge() {
    let h = harness_with(
        2,
        FakeCompletion::default(),
        FakeSpeech::default(),
        FakeRenderer { fail: true },
    );
    let sink = RecordingSink::default();
    let report = h.pipeline.run(&message("Hello"), &sink).await;

    assert_eq!(report.failure(), Some(FailureReason::Render));
    assert_eq!(report.trace.states().last(), Some(&PipelineState::Failed(FailureReason::Render)));
    assert_eq!(report.balance, 2);
    assert!(sink.delivered.lock().unwrap().is_empty());
    let session = h.pipeline.sessions().get_or_create(USER).await;
    assert_eq!(session.history_len(), 0);
}

#[tokio::test]
async fn rejected_delivery_does_not_charge() {
    let h = harness(1, FakeCompletion::default());
    let sink = RecordingSink {
        reject: true,
        ..Default::default()
    };
    let report = h.pipeline.run(&message("Hello"), &sink).await;

    assert_eq!(report.failure(), Some(FailureReason::Delivery));
    assert_eq!(report.balance, 1);
    assert_eq!(report.reply_text.as_deref(), Some("You said: Hello"));
}

#[tokio::test]
async fn history_is_sent_with_system_prompt_first() {
    let h = harness(5, FakeCompletion::default());
    let sink = RecordingSink::default();
    h.pipeline.run(&message("first"), &sink).await;
    h.pipeline.run(&message("second"), &sink).await;

    let seen = h.completion.seen.lock().unwrap();
    let second = &seen[1];
    let roles: Vec<Role> = second.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(second[3].content, "second");
}

#[tokio::test]
async fn concurrent_runs_for_one_user_never_overspend() {
    let h = Arc::new(harness(2, FakeCompletion::default()));
    let sink = Arc::new(RecordingSink::default());

    let runs: Vec<_> = (0..5)
        .map(|i| {
            let h = Arc::clone(&h);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                h.pipeline
                    .run(&InboundMessage::new(USER, 42, i, "Hello"), sink.as_ref())
                    .await
            })
        })
        .collect();

    let mut delivered = 0;
    for run in runs {
        if run.await.unwrap().is_delivered() {
            delivered += 1;
        }
    }
    assert_eq!(delivered, 2);
    assert_eq!(h.pipeline.sessions().get_balance(USER).await, 0);
}
