//! Conversation sessions: bounded rolling history plus a lazily created
//! chat handle on the language model backend.
//!
//! A failed generation call throws the handle away, starts a fresh one and
//! retries once. If that also fails the caller gets [`FALLBACK_REPLY`]
//! instead of an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::ConversationLog;

pub const FALLBACK_REPLY: &str =
    "I'm sorry, I encountered an error processing your request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Language model service able to open chat sessions.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open a fresh chat primed with `system_prompt`.
    async fn start_session(&self, system_prompt: &str) -> Result<Box<dyn ChatHandle>>;
}

/// A live chat on the backend.
#[async_trait]
pub trait ChatHandle: Send {
    /// Send `text` with the session's rolling `history` (which already ends
    /// with `text` as a user message) and return the model's reply.
    async fn send(&mut self, text: &str, history: &[Message]) -> Result<String>;
}

struct ActiveChat {
    id: u64,
    handle: Box<dyn ChatHandle>,
}

pub struct ConversationSession {
    id: String,
    backend: Arc<dyn ChatBackend>,
    system_prompt: String,
    history_limit: usize,
    history: Vec<Message>,
    chat: Option<ActiveChat>,
    handles_started: u64,
    log: Option<Arc<ConversationLog>>,
}

impl ConversationSession {
    pub fn new(
        id: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
        system_prompt: impl Into<String>,
        history_limit: usize,
    ) -> Self {
        Self {
            id: id.into(),
            backend,
            system_prompt: system_prompt.into(),
            history_limit: history_limit.max(1),
            history: Vec::new(),
            chat: None,
            handles_started: 0,
            log: None,
        }
    }

    pub fn with_log(mut self, log: Arc<ConversationLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Id of the current chat handle, `None` before first use or after reset.
    /// Ids grow by one for every handle the session starts.
    pub fn handle_id(&self) -> Option<u64> {
        self.chat.as_ref().map(|c| c.id)
    }

    /// Send one user turn and return the assistant's reply. Never fails.
    pub async fn respond(&mut self, user_input: &str) -> String {
        self.push(Message::user(user_input));
        self.log_turn(Role::User, user_input);
        info!("[{}] User: {user_input}", self.id);

        let reply = match self.send(user_input).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{}] Generation failed, restarting chat: {e}", self.id);
                self.chat = None;
                match self.send(user_input).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!("[{}] Generation failed after retry: {e}", self.id);
                        self.log_turn(Role::Assistant, FALLBACK_REPLY);
                        return FALLBACK_REPLY.to_string();
                    }
                }
            }
        };

        self.push(Message::assistant(reply.clone()));
        self.log_turn(Role::Assistant, &reply);
        info!("[{}] Assistant: {reply}", self.id);
        reply
    }

    /// Clear the history and drop the chat handle.
    pub fn reset(&mut self) {
        self.history.clear();
        self.chat = None;
        info!("[{}] Conversation reset", self.id);
    }

    async fn send(&mut self, text: &str) -> Result<String> {
        if self.chat.is_none() {
            let handle = self.backend.start_session(&self.system_prompt).await?;
            self.handles_started += 1;
            self.chat = Some(ActiveChat {
                id: self.handles_started,
                handle,
            });
            info!("[{}] New chat session started (#{})", self.id, self.handles_started);
        }

        let Some(chat) = self.chat.as_mut() else {
            return Err(Error::Generation("chat handle unavailable".into()));
        };
        chat.handle.send(text, &self.history).await
    }

    fn push(&mut self, message: Message) {
        self.history.push(message);
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            self.history.drain(..excess);
        }
    }

    fn log_turn(&self, role: Role, content: &str) {
        if let Some(log) = &self.log {
            log.record(&self.id, role, content);
        }
    }
}

pub type SharedSession = Arc<Mutex<ConversationSession>>;

/// Everything needed to build sessions with identical settings.
#[derive(Clone)]
pub struct SessionFactory {
    backend: Arc<dyn ChatBackend>,
    system_prompt: String,
    history_limit: usize,
    log: Option<Arc<ConversationLog>>,
}

impl SessionFactory {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        system_prompt: impl Into<String>,
        history_limit: usize,
    ) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
            history_limit,
            log: None,
        }
    }

    /// Factory for the server: settings from `config.session`, turns logged
    /// under `config.history`.
    pub fn from_config(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        let log = ConversationLog::new(config.history.resolved_dir());
        Self::new(
            backend,
            config.session.system_prompt.clone(),
            config.session.history_limit,
        )
        .with_log(Arc::new(log))
    }

    pub fn with_log(mut self, log: Arc<ConversationLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn log(&self) -> Option<&ConversationLog> {
        self.log.as_deref()
    }

    pub fn create(&self, id: impl Into<String>) -> ConversationSession {
        let session = ConversationSession::new(
            id,
            self.backend.clone(),
            self.system_prompt.clone(),
            self.history_limit,
        );
        match &self.log {
            Some(log) => session.with_log(log.clone()),
            None => session,
        }
    }

    pub fn create_shared(&self, id: impl Into<String>) -> SharedSession {
        Arc::new(Mutex::new(self.create(id)))
    }
}

/// Idle named sessions are dropped after this long.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Hard cap on named sessions; the least recently used one is evicted.
pub const DEFAULT_MAX_SESSIONS: usize = 256;

struct NamedSession {
    session: SharedSession,
    last_used: Instant,
}

/// Named sessions for callers without a connection of their own (REST).
///
/// Ids come from clients, so the map is bounded: entries idle past the TTL
/// are pruned and the oldest entry is evicted when the cap is reached.
pub struct SessionRegistry {
    factory: SessionFactory,
    sessions: Mutex<HashMap<String, NamedSession>>,
    ttl: Duration,
    max_sessions: usize,
    next_connection: AtomicU64,
    open_connections: AtomicUsize,
}

impl SessionRegistry {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
            ttl: DEFAULT_SESSION_TTL,
            max_sessions: DEFAULT_MAX_SESSIONS,
            next_connection: AtomicU64::new(1),
            open_connections: AtomicUsize::new(0),
        }
    }

    pub fn with_limits(mut self, ttl: Duration, max_sessions: usize) -> Self {
        self.ttl = ttl;
        self.max_sessions = max_sessions.max(1);
        self
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    /// A new unregistered session for one socket connection.
    pub fn connection_session(&self) -> SharedSession {
        let n = self.next_connection.fetch_add(1, Ordering::Relaxed);
        self.factory.create_shared(format!("ws-{n}"))
    }

    pub fn connection_opened(&self) {
        self.open_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn connection_closed(&self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }

    /// Sockets currently being served.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    pub async fn get_or_create(&self, id: &str) -> SharedSession {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;

        if let Some(entry) = sessions.get_mut(id) {
            entry.last_used = now;
            return entry.session.clone();
        }

        let ttl = self.ttl;
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < ttl);

        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!("Evicting session [{oldest}]");
            sessions.remove(&oldest);
        }

        let session = self.factory.create_shared(id);
        sessions.insert(
            id.to_string(),
            NamedSession {
                session: session.clone(),
                last_used: now,
            },
        );
        session
    }

    /// Reset a named session and drop it from the registry. Returns whether
    /// it existed.
    pub async fn reset(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id);
        match removed {
            Some(entry) => {
                entry.session.lock().await.reset();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
