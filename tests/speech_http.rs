use std::time::Duration;

use serde_json::json;
use talkreel::{
    HttpSpeechSynthesizer, HttpVoiceTranscriber, Language, SpeechConfig, SpeechSynthesizer,
    TalkreelError, TranscriptionConfig, VoiceTranscriber,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn synthesizer(server: &MockServer) -> HttpSpeechSynthesizer {
    synthesizer_with_hint(server, false)
}

fn synthesizer_with_hint(server: &MockServer, language_hint: bool) -> HttpSpeechSynthesizer {
    HttpSpeechSynthesizer::new(SpeechConfig {
        base_url: server.uri(),
        api_key: "k".into(),
        model: "tts-1".into(),
        voice: "alloy".into(),
        language_hint,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

#[tokio::test]
async fn empty_text_is_voiced_as_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .and(body_partial_json(json!({
            "input": Language::English.placeholder_phrase(),
            "voice": "alloy",
            "response_format": "mp3",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not-really-mp3".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let speech = synthesizer(&server)
        .synthesize("   ", Language::English)
        .await
        .unwrap();
    assert!(!speech.audio.is_empty());
    assert!(speech.duration_secs >= 3.0);
}

#[tokio::test]
async fn request_body_matches_openai_schema_unless_hinted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/speech"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    synthesizer(&server)
        .synthesize("Привет", Language::Russian)
        .await
        .unwrap();
    synthesizer_with_hint(&server, true)
        .synthesize("Привет", Language::Russian)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let plain: serde_json::Value = requests[0].body_json().unwrap();
    let hinted: serde_json::Value = requests[1].body_json().unwrap();
    let mut keys: Vec<_> = plain.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["input", "model", "response_format", "voice"]);
    assert_eq!(hinted["language"], "ru");
}

#[tokio::test]
async fn backend_failure_is_a_synthesis_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("tts down"))
        .mount(&server)
        .await;

    let err = synthesizer(&server)
        .synthesize("Hello", Language::Russian)
        .await
        .unwrap_err();
    assert!(matches!(err, TalkreelError::Synthesis(ref m) if m.contains("tts down")));
}

#[tokio::test]
async fn empty_audio_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = synthesizer(&server)
        .synthesize("Hello", Language::English)
        .await
        .unwrap_err();
    assert!(matches!(err, TalkreelError::Synthesis(_)));
}

#[tokio::test]
async fn transcript_is_trimmed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/audio/transcriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  hi there \n"})))
        .expect(1)
        .mount(&server)
        .await;

    let transcriber = HttpVoiceTranscriber::new(TranscriptionConfig {
        base_url: server.uri(),
        api_key: "k".into(),
        model: "whisper-1".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    let text = transcriber
        .transcribe(b"OggS".to_vec(), "voice.ogg")
        .await
        .unwrap();
    assert_eq!(text, "hi there");
}
