//! Per-message orchestration.
//!
//! text → session reply → sanitize → classify → pick voice → synthesize.
//! Only empty input is an error; a synthesis failure still yields the
//! reply text and emotion, with [`Speech::Unavailable`] in place of audio.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::emotion::{classify, Emotion, VoiceTable};
use crate::error::{Error, Result};
use crate::sanitize::sanitize;
use crate::session::ConversationSession;
use crate::speech::SpeechSynthesizer;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No text received")]
    EmptyInput,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of the synthesis step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speech {
    Audio(Vec<u8>),
    /// Synthesis failed, timed out, or had nothing to say; reason attached.
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct AssistantReply {
    /// Unsanitized reply, for display.
    pub text: String,
    pub emotion: Emotion,
    pub voice: String,
    pub speech: Speech,
}

impl AssistantReply {
    pub fn audio(&self) -> Option<&[u8]> {
        match &self.speech {
            Speech::Audio(bytes) => Some(bytes),
            Speech::Unavailable(_) => None,
        }
    }

    pub fn audio_base64(&self) -> Option<String> {
        self.audio().map(|bytes| BASE64_STANDARD.encode(bytes))
    }
}

pub struct Pipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voices: VoiceTable,
    synthesis_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voices: VoiceTable,
        synthesis_timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            voices,
            synthesis_timeout,
        }
    }

    pub fn voices(&self) -> &VoiceTable {
        &self.voices
    }

    /// Run one inbound message through the full pipeline.
    ///
    /// The session lock is held only while the model answers; synthesis runs
    /// after it is released.
    pub async fn handle_message(
        &self,
        session: &Mutex<ConversationSession>,
        text: &str,
    ) -> std::result::Result<AssistantReply, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let t_total = Instant::now();
        let reply = session.lock().await.respond(text).await;

        let speech_text = sanitize(&reply);
        let emotion = classify(&reply);
        let voice = self.voices.select_voice(emotion).to_string();
        info!("Detected emotion: {emotion} (voice {voice})");

        let speech = if speech_text.is_empty() {
            Speech::Unavailable("nothing to speak".into())
        } else {
            match self.synthesize(&speech_text, &voice).await {
                Ok(audio) => {
                    info!("Text-to-speech succeeded with {emotion} style ({} bytes)", audio.len());
                    Speech::Audio(audio)
                }
                Err(e) => {
                    warn!("Text-to-speech failed: {e}");
                    Speech::Unavailable(e.to_string())
                }
            }
        };

        info!("Message handled in {:.0}ms", t_total.elapsed().as_secs_f64() * 1000.0);

        Ok(AssistantReply {
            text: reply,
            emotion,
            voice,
            speech,
        })
    }

    /// Speak arbitrary text. The voice follows `emotion`, or the text's own
    /// classification when none is given.
    pub async fn speak(&self, text: &str, emotion: Option<Emotion>) -> Result<Vec<u8>> {
        let speech_text = sanitize(text);
        if speech_text.is_empty() {
            return Err(Error::Synthesis("nothing to speak".into()));
        }
        let emotion = emotion.unwrap_or_else(|| classify(text));
        self.synthesize(&speech_text, self.voices.select_voice(emotion)).await
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.synthesis_timeout, self.synthesizer.synthesize(text, voice)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SynthesisTimeout(self.synthesis_timeout)),
        }
    }
}
