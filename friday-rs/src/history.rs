//! Conversation log and daily reporting.
//!
//! Every user request and assistant reply is appended as one JSON line to
//! `<dir>/<YYYY-MM-DD>.jsonl`. Files are only ever appended to.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::Result;
use crate::session::Role;

/// One logged conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub timestamp: String,
    pub session: String,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ConversationLog {
    dir: PathBuf,
}

impl ConversationLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, date: &str) -> PathBuf {
        let date_str = if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        };
        self.dir.join(format!("{date_str}.jsonl"))
    }

    /// Append a turn to today's file. Failures are logged, never raised:
    /// a broken log must not break the conversation.
    pub fn record(&self, session: &str, role: Role, content: &str) {
        let record = ConversationRecord {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            session: session.to_string(),
            role,
            content: content.to_string(),
        };
        if let Err(e) = self.append(&record) {
            error!("Failed to write conversation record: {e}");
        }
    }

    pub fn append(&self, record: &ConversationRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for("today");
        let json = serde_json::to_string(record)?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{json}")?;
        debug!("Logged {} turn to {}", record.role, path.display());
        Ok(())
    }

    /// Load all records for a date (`"today"` or `YYYY-MM-DD`).
    pub fn load_records(&self, date: &str) -> Vec<ConversationRecord> {
        let path = self.file_for(date);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        std::io::BufReader::new(file)
            .lines()
            .map_while(std::result::Result::ok)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(&line) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed log line: {e}");
                    None
                }
            })
            .collect()
    }

    /// List all dates with records (newest first).
    pub fn list_available_dates(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut dates: Vec<String> = entries
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(str::to_string)
            })
            .collect();

        dates.sort_by(|a, b| b.cmp(a));
        dates
    }

    /// Markdown report of one day's conversations.
    pub fn generate_report(&self, date: &str) -> String {
        let records = self.load_records(date);

        let display_date = if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        };

        if records.is_empty() {
            return format!("# FRIDAY Conversations - {display_date}\n\nNo conversations recorded.");
        }

        let user_turns = records.iter().filter(|r| r.role == Role::User).count();
        let assistant_turns = records.len() - user_turns;
        let mut sessions: Vec<&str> = records.iter().map(|r| r.session.as_str()).collect();
        sessions.sort_unstable();
        sessions.dedup();

        let mut lines = vec![
            format!("# FRIDAY Conversations - {display_date}"),
            String::new(),
            "## Summary".to_string(),
            format!("- **Sessions**: {}", sessions.len()),
            format!("- **User messages**: {user_turns}"),
            format!("- **Assistant replies**: {assistant_turns}"),
            String::new(),
            "## Log".to_string(),
            String::new(),
            "| Time | Session | Role | Message |".to_string(),
            "|------|---------|------|---------|".to_string(),
        ];

        for r in &records {
            // HH:MM:SS out of the ISO timestamp
            let time_str = r.timestamp.get(11..19).unwrap_or(&r.timestamp);
            lines.push(format!(
                "| {time_str} | {} | {} | {} |",
                r.session,
                r.role,
                truncate(&r.content.replace('\n', " "), 60)
            ));
        }

        lines.join("\n")
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_append_and_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());

        log.record("ws-1", Role::User, "hello");
        log.record("ws-1", Role::Assistant, "Hi there!");

        let records = log.load_records("today");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[0].content, "hello");
        assert_eq!(records[1].role, Role::Assistant);
        assert_eq!(records[1].session, "ws-1");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());
        log.record("s", Role::User, "one");

        let path = log.file_for("today");
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);
        log.record("s", Role::Assistant, "two");

        let contents: Vec<String> = log.load_records("today").into_iter().map(|r| r.content).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }

    #[test]
    fn dates_are_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["2026-01-02.jsonl", "2026-03-01.jsonl", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let log = ConversationLog::new(dir.path());
        assert_eq!(log.list_available_dates(), vec!["2026-03-01", "2026-01-02"]);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let log = ConversationLog::new("/nonexistent/friday-history-test");
        assert!(log.load_records("2026-01-01").is_empty());
        assert!(log.list_available_dates().is_empty());
    }

    #[test]
    fn report_counts_turns() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());
        log.record("a", Role::User, "hello");
        log.record("a", Role::Assistant, "hi");
        log.record("b", Role::User, "what time is it?");

        let report = log.generate_report("today");
        assert!(report.contains("- **Sessions**: 2"));
        assert!(report.contains("- **User messages**: 2"));
        assert!(report.contains("- **Assistant replies**: 1"));
        assert!(report.contains("what time is it?"));
    }

    #[test]
    fn empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let log = ConversationLog::new(dir.path());
        let report = log.generate_report("2026-01-01");
        assert!(report.contains("No conversations recorded."));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
