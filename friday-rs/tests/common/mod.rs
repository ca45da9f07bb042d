//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use friday_rs::api::ApiState;
use friday_rs::emotion::VoiceTable;
use friday_rs::pipeline::Pipeline;
use friday_rs::session::{ChatBackend, ChatHandle, Message, SessionFactory, SessionRegistry};
use friday_rs::speech::SpeechSynthesizer;
use friday_rs::{Error, Result};

/// Chat backend replaying scripted replies; `None` entries fail.
#[derive(Clone, Default)]
pub struct ScriptedChat {
    replies: Arc<Mutex<VecDeque<Option<String>>>>,
    pub started: Arc<AtomicUsize>,
}

impl ScriptedChat {
    pub fn new(replies: &[Option<&str>]) -> Self {
        Self {
            replies: Arc::new(Mutex::new(
                replies.iter().map(|r| r.map(str::to_string)).collect(),
            )),
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct ScriptedHandle {
    replies: Arc<Mutex<VecDeque<Option<String>>>>,
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn start_session(&self, _system_prompt: &str) -> Result<Box<dyn ChatHandle>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedHandle {
            replies: self.replies.clone(),
        }))
    }
}

#[async_trait]
impl ChatHandle for ScriptedHandle {
    async fn send(&mut self, text: &str, _history: &[Message]) -> Result<String> {
        match self.replies.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(Error::Generation("scripted failure".into())),
            None => Ok(format!("You said: {text}")),
        }
    }
}

/// Synthesizer returning fixed bytes, or failing when `fail` is set.
#[derive(Default)]
pub struct FakeSpeech {
    pub fail: bool,
    pub voices: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str, voice: &str) -> Result<Vec<u8>> {
        self.voices.lock().unwrap().push(voice.to_string());
        if self.fail {
            Err(Error::Synthesis("speech service unavailable".into()))
        } else {
            Ok(b"ID3fake-mp3".to_vec())
        }
    }
}

pub fn state(chat: ScriptedChat, speech: Arc<FakeSpeech>) -> ApiState {
    let factory = SessionFactory::new(Arc::new(chat), "You are a test assistant.", 10);
    ApiState {
        pipeline: Arc::new(Pipeline::new(
            speech,
            VoiceTable::standard("en-US-AriaNeural"),
            Duration::from_secs(5),
        )),
        sessions: Arc::new(SessionRegistry::new(factory)),
        gemini_configured: true,
    }
}
