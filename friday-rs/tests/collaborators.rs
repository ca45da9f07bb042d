//! Gemini and Azure speech clients against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use friday_rs::config::{GeminiConfig, TtsConfig};
use friday_rs::gemini::GeminiBackend;
use friday_rs::session::{ChatBackend, Message};
use friday_rs::speech::{AzureSpeech, SpeechSynthesizer};
use friday_rs::Error;

const GENERATE_PATH: &str = "/models/gemini-test:generateContent";

fn gemini_config(server: &MockServer, api_key: &str) -> GeminiConfig {
    GeminiConfig {
        api_key: api_key.into(),
        model: "gemini-test".into(),
        api_base: server.uri(),
        ..Default::default()
    }
}

fn tts_config(server: &MockServer, api_key: &str) -> TtsConfig {
    TtsConfig {
        api_key: api_key.into(),
        endpoint: format!("{}/cognitiveservices/v1", server.uri()),
        ..Default::default()
    }
}

#[tokio::test]
async fn gemini_sends_history_and_system_instruction() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "systemInstruction": { "parts": [{ "text": "Be brief." }] },
            "contents": [
                { "role": "user", "parts": [{ "text": "hi" }] },
                { "role": "model", "parts": [{ "text": "hello" }] },
                { "role": "user", "parts": [{ "text": "weather?" }] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Sunny " }, { "text": "all day." }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(&gemini_config(&server, "test-key")).unwrap();
    let mut chat = backend.start_session("Be brief.").await.unwrap();
    let history = vec![
        Message::user("hi"),
        Message::assistant("hello"),
        Message::user("weather?"),
    ];

    let reply = chat.send("weather?", &history).await.unwrap();
    assert_eq!(reply, "Sunny all day.");
}

#[tokio::test]
async fn gemini_error_status_maps_to_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(&gemini_config(&server, "test-key")).unwrap();
    let mut chat = backend.start_session("sys").await.unwrap();

    match chat.send("hello", &[Message::user("hello")]).await {
        Err(Error::Generation(message)) => {
            assert!(message.contains("RESOURCE_EXHAUSTED"), "{message}");
            assert!(message.contains("Quota exceeded"), "{message}");
        }
        other => panic!("expected generation error, got {other:?}"),
    }
}

#[tokio::test]
async fn gemini_empty_candidates_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(&gemini_config(&server, "test-key")).unwrap();
    let mut chat = backend.start_session("sys").await.unwrap();

    assert!(matches!(
        chat.send("hello", &[]).await,
        Err(Error::Generation(_))
    ));
}

#[tokio::test]
async fn gemini_without_key_refuses_to_start() {
    let server = MockServer::start().await;
    let backend = GeminiBackend::new(&gemini_config(&server, "")).unwrap();

    assert!(matches!(
        backend.start_session("sys").await,
        Err(Error::Config(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn azure_returns_audio_for_ssml_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cognitiveservices/v1"))
        .and(header("Ocp-Apim-Subscription-Key", "speech-key"))
        .and(header("Content-Type", "application/ssml+xml"))
        .and(header(
            "X-Microsoft-OutputFormat",
            "audio-24khz-48kbitrate-mono-mp3",
        ))
        .and(body_string_contains("name='en-US-JennyNeural'"))
        .and(body_string_contains("Tom &amp; Jerry"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3mp3-bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let speech = AzureSpeech::new(&tts_config(&server, "speech-key")).unwrap();
    let audio = speech
        .synthesize("Tom & Jerry", "en-US-JennyNeural")
        .await
        .unwrap();

    assert_eq!(audio, b"ID3mp3-bytes");
}

#[tokio::test]
async fn azure_rejection_maps_to_synthesis_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cognitiveservices/v1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let speech = AzureSpeech::new(&tts_config(&server, "bad-key")).unwrap();

    match speech.synthesize("hello", "en-US-AriaNeural").await {
        Err(Error::Synthesis(message)) => assert!(message.contains("401"), "{message}"),
        other => panic!("expected synthesis error, got {other:?}"),
    }
}

#[tokio::test]
async fn azure_empty_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/cognitiveservices/v1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let speech = AzureSpeech::new(&tts_config(&server, "speech-key")).unwrap();

    assert!(matches!(
        speech.synthesize("hello", "en-US-AriaNeural").await,
        Err(Error::Synthesis(_))
    ));
}
