//! Gemini `generateContent` client.
//!
//! The REST API is stateless, so a "chat" is just the system instruction
//! plus whatever rolling history the session hands over on each call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::session::{ChatBackend, ChatHandle, Message, Role};

#[derive(Clone)]
pub struct GeminiBackend {
    inner: Arc<GeminiClient>,
}

struct GeminiClient {
    client: Client,
    api_key: String,
    url: String,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let url = format!(
            "{}/models/{}:generateContent",
            config.api_base.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            inner: Arc::new(GeminiClient {
                client,
                api_key: config.api_key.clone(),
                url,
            }),
        })
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn start_session(&self, system_prompt: &str) -> Result<Box<dyn ChatHandle>> {
        if self.inner.api_key.trim().is_empty() {
            return Err(Error::Config("GEMINI_API_KEY is not set".into()));
        }
        Ok(Box::new(GeminiChat {
            client: self.inner.clone(),
            system_prompt: system_prompt.to_string(),
        }))
    }
}

struct GeminiChat {
    client: Arc<GeminiClient>,
    system_prompt: String,
}

#[async_trait]
impl ChatHandle for GeminiChat {
    async fn send(&mut self, text: &str, history: &[Message]) -> Result<String> {
        let request = GenerateContentRequest {
            contents: build_contents(text, history),
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: self.system_prompt.clone(),
                }],
            }),
        };

        debug!("Sending {} turns to Gemini", request.contents.len());

        let response = self
            .client
            .client
            .post(&self.client.url)
            .header("x-goog-api-key", &self.client.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(describe_error(status, &body)));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        extract_text(parsed)
    }
}

/// Map the rolling history to Gemini contents: the conversation must open
/// with a user turn and roles must alternate, so leading model turns are
/// dropped and consecutive same-role turns merge into one content.
fn build_contents(text: &str, history: &[Message]) -> Vec<Content> {
    let fallback = Message::user(text);
    let mut turns: Vec<&Message> = history
        .iter()
        .skip_while(|m| m.role == Role::Assistant)
        .collect();

    if turns.last().map(|m| (m.role, m.content.as_str())) != Some((Role::User, text)) {
        turns.push(&fallback);
    }

    let mut contents: Vec<Content> = Vec::with_capacity(turns.len());
    for message in turns {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let part = Part {
            text: message.content.clone(),
        };
        match contents.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts: vec![part],
            }),
        }
    }
    contents
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let text: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .find_map(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        Err(Error::Generation("Gemini returned no text".into()))
    } else {
        Ok(text.to_string())
    }
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(wrapper) => {
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(s) if !s.is_empty() => format!("{status} {s}: {message}"),
                _ => format!("{status}: {message}"),
            }
        }
        Err(_) => format!("{status}: {body}"),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}
