//! tts-check: smoke test for the speech endpoint of a running server.
//!
//! Posts sample text to `/api/text-to-speech`, saves the returned MP3 and
//! checks that the audio survives the base64 encoding used on the socket.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use clap::Parser;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SAMPLE_TEXT: &str = "Hello! This is a test of the text to speech system. \
If you can hear this, the text to speech is working correctly.";

#[derive(Parser, Debug)]
#[command(name = "tts-check", about = "Check text-to-speech on a running FRIDAY server")]
struct Args {
    /// Base URL of the server
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    /// Text to synthesize
    #[arg(long, default_value = SAMPLE_TEXT)]
    text: String,

    /// Emotion label selecting the voice (cheerful, empathetic, friendly, serious, chat)
    #[arg(long)]
    emotion: Option<String>,

    /// Where to write the audio
    #[arg(long, default_value = "test_output.mp3")]
    out: PathBuf,
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    emotion: Option<&'a str>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    println!("Testing text-to-speech via {}", args.server);
    println!("Text: {}", args.text);

    let client = Client::builder()
        .connect_timeout(Duration::from_secs(2))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new());

    let t0 = Instant::now();
    let resp = match client
        .post(format!("{}/api/text-to-speech", args.server.trim_end_matches('/')))
        .json(&SpeakRequest {
            text: &args.text,
            emotion: args.emotion.as_deref(),
        })
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => {
            eprintln!("✗ Request failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let detail = resp
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| "no detail".into());
        eprintln!("✗ Server returned {status}: {detail}");
        return ExitCode::FAILURE;
    }

    let audio = match resp.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            eprintln!("✗ Failed to read audio: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!(
        "Audio generated: {} bytes in {}ms",
        audio.len(),
        t0.elapsed().as_millis()
    );

    if let Err(e) = std::fs::write(&args.out, &audio) {
        eprintln!("✗ Failed to write {}: {e}", args.out.display());
        return ExitCode::FAILURE;
    }
    println!("Audio saved to {}", args.out.display());

    let encoded = BASE64_STANDARD.encode(&audio);
    println!("Base64 encoded length: {} characters", encoded.len());
    match BASE64_STANDARD.decode(&encoded) {
        Ok(decoded) if decoded == audio => {
            println!("✓ Base64 encoding/decoding verified");
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("✗ Base64 encoding/decoding mismatch!");
            ExitCode::FAILURE
        }
    }
}
