//! Keyword-based emotion detection and emotion → voice mapping.
//!
//! The classifier is an ordered rule list: the first rule whose predicate
//! matches the lowercased text decides the label, so "What a wonderful day!"
//! is cheerful even though it also asks a question.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Cheerful,
    Empathetic,
    Friendly,
    Serious,
    Chat,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Self::Cheerful,
        Self::Empathetic,
        Self::Friendly,
        Self::Serious,
        Self::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cheerful => "cheerful",
            Self::Empathetic => "empathetic",
            Self::Friendly => "friendly",
            Self::Serious => "serious",
            Self::Chat => "chat",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the classifier: if any needle occurs in the text, `label` wins.
struct Rule {
    needles: &'static [&'static str],
    label: Emotion,
}

impl Rule {
    fn matches(&self, lowered: &str) -> bool {
        self.needles.iter().any(|needle| lowered.contains(needle))
    }
}

// Evaluated top to bottom.
const RULES: &[Rule] = &[
    Rule {
        needles: &["excited", "amazing", "wonderful", "fantastic", "great news", "!"],
        label: Emotion::Cheerful,
    },
    Rule {
        needles: &["sorry", "unfortunately", "sad", "difficult"],
        label: Emotion::Empathetic,
    },
    Rule {
        needles: &["?", "how", "what", "why", "when", "where"],
        label: Emotion::Friendly,
    },
    Rule {
        needles: &["urgent", "important", "warning", "alert"],
        label: Emotion::Serious,
    },
];

/// Classify reply text into an emotion label. Plain substring matching,
/// case-insensitive; falls through to [`Emotion::Chat`].
pub fn classify(text: &str) -> Emotion {
    let lowered = text.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map_or(Emotion::Chat, |rule| rule.label)
}

/// Static emotion → voice table with a default for unmapped labels.
#[derive(Debug, Clone)]
pub struct VoiceTable {
    voices: HashMap<Emotion, String>,
    default_voice: String,
}

impl VoiceTable {
    pub fn new(default_voice: impl Into<String>) -> Self {
        Self {
            voices: HashMap::new(),
            default_voice: default_voice.into(),
        }
    }

    /// The stock Azure neural voice assignments.
    pub fn standard(default_voice: impl Into<String>) -> Self {
        Self::new(default_voice)
            .with_voice(Emotion::Cheerful, "en-US-AriaNeural")
            .with_voice(Emotion::Empathetic, "en-US-JennyNeural")
            .with_voice(Emotion::Friendly, "en-US-AriaNeural")
            .with_voice(Emotion::Serious, "en-US-SaraNeural")
            .with_voice(Emotion::Chat, "en-US-AriaNeural")
    }

    /// Standard table with per-emotion overrides from config applied on top.
    pub fn from_config(config: &crate::config::TtsConfig) -> Self {
        let mut table = Self::standard(config.default_voice.clone());
        for (emotion, voice) in &config.voices {
            table = table.with_voice(*emotion, voice.clone());
        }
        table
    }

    pub fn with_voice(mut self, emotion: Emotion, voice: impl Into<String>) -> Self {
        self.voices.insert(emotion, voice.into());
        self
    }

    pub fn select_voice(&self, emotion: Emotion) -> &str {
        self.voices
            .get(&emotion)
            .map_or(self.default_voice.as_str(), String::as_str)
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }
}
