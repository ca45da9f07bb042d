//! Configuration management for friday-rs.
//!
//! Loads config from YAML files in standard locations, then applies
//! environment overrides for API keys so secrets can stay out of the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::emotion::Emotion;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are FRIDAY, a helpful AI assistant. Keep your responses concise and conversational. \
Respond in a friendly, natural way. Feel free to express appropriate emotions in your responses - \
be enthusiastic when sharing good news, empathetic when someone seems troubled, and cheerful in general conversation.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            timeout_secs: 30,
        }
    }
}

impl GeminiConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub history_limit: usize,
    pub system_prompt: String,
    /// Named REST sessions idle this long are dropped.
    pub idle_ttl_secs: u64,
    pub max_named_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            idle_ttl_secs: 30 * 60,
            max_named_sessions: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub api_key: String,
    pub region: String,
    /// Full synthesis URL; derived from `region` when empty.
    pub endpoint: String,
    pub default_voice: String,
    pub output_format: String,
    pub timeout_secs: u64,
    /// Per-emotion voice overrides, keyed by label ("cheerful", "serious", ...).
    pub voices: HashMap<Emotion, String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            region: "eastus".into(),
            endpoint: String::new(),
            default_voice: "en-US-AriaNeural".into(),
            output_format: "audio-24khz-48kbitrate-mono-mp3".into(),
            timeout_secs: 15,
            voices: HashMap::new(),
        }
    }
}

impl TtsConfig {
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.is_empty() {
            format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                self.region
            )
        } else {
            self.endpoint.clone()
        }
    }
}

/// The conversation log is always written; only its location is configurable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Log directory; `~/.friday-history` when empty. A leading `~` is
    /// expanded to the home directory.
    pub dir: String,
}

impl HistoryConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        let dir = self.dir.trim();
        if dir.is_empty() {
            return home().join(".friday-history");
        }
        expand_tilde(dir)
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        home()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home().join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub session: SessionConfig,
    pub tts: TtsConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file and apply environment overrides.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/friday/config.yaml
    /// 3. /etc/friday/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::load_file(path);
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn load_file(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/friday/config.yaml")),
                Some(PathBuf::from("/etc/friday/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    /// Overlay values from the environment. `lookup` is injected so tests
    /// don't have to mutate the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Some(model) = non_empty("GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Some(key) = non_empty("AZURE_SPEECH_KEY") {
            self.tts.api_key = key;
        }
        if let Some(region) = non_empty("AZURE_SPEECH_REGION") {
            self.tts.region = region;
        }
        if let Some(port) = non_empty("FRIDAY_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(e) => tracing::warn!("Ignoring FRIDAY_PORT={port}: {e}"),
            }
        }
    }
}
