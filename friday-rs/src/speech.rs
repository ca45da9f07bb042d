//! Text-to-speech through the Azure neural voice REST endpoint.
//!
//! Voices are the `en-US-*Neural` family; the response body is the encoded
//! audio in the configured output format (MP3 by default).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::TtsConfig;
use crate::error::{Error, Result};

/// Anything that can turn text into encoded audio bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

pub struct AzureSpeech {
    client: Client,
    endpoint: String,
    api_key: String,
    output_format: String,
}

impl AzureSpeech {
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url(),
            api_key: config.api_key.clone(),
            output_format: config.output_format.clone(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("AZURE_SPEECH_KEY is not set".into()));
        }

        let ssml = build_ssml(text, voice);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.output_format)
            .header("User-Agent", "friday-rs")
            .body(ssml)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("{status}: {}", body.trim())));
        }

        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(Error::Synthesis("empty audio response".into()));
        }
        debug!("Synthesized {} bytes with {voice}", audio.len());
        Ok(audio)
    }
}

/// `en-US-AriaNeural` → `en-US`.
fn voice_locale(voice: &str) -> &str {
    let mut dashes = voice.match_indices('-').map(|(i, _)| i);
    match (dashes.next(), dashes.next()) {
        (Some(_), Some(second)) => &voice[..second],
        _ => "en-US",
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn build_ssml(text: &str, voice: &str) -> String {
    let locale = escape_xml(voice_locale(voice));
    format!(
        "<speak version='1.0' xml:lang='{locale}'><voice xml:lang='{locale}' name='{}'>{}</voice></speak>",
        escape_xml(voice),
        escape_xml(text)
    )
}
