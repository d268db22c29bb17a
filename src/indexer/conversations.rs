//! JSONL conversation import.
//!
//! Each line holds either one message object or an array of message objects
//! (one conversation). Messages become `[role]: content` chunks of a single
//! document keyed by the log's file name, so re-importing a log replaces
//! everything it contributed.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::IndexHandle;
use crate::store::Chunk;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationReport {
    pub source: String,
    pub conversations: usize,
    pub messages: usize,
    pub invalid_lines: usize,
    /// The log was unchanged since its last import.
    pub skipped: bool,
}

/// A parsed conversation log.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    pub source: String,
    pub modified_at: DateTime<Utc>,
    pub messages: Vec<String>,
    pub conversations: usize,
    pub invalid_lines: usize,
}

fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        // Multi-part content: keep the text parts
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn format_message(message: &Map<String, Value>) -> String {
    let role = message
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    format!("[{role}]: {}", content_text(message.get("content")))
}

impl ConversationLog {
    /// Read and parse a JSONL file. Fails if it holds no message at all.
    pub fn read(path: &Path) -> Result<Self> {
        anyhow::ensure!(path.is_file(), "file not found: {}", path.display());

        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a document name from {}", path.display()))?;
        let modified_at: DateTime<Utc> = fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("no mtime for {}", path.display()))?
            .into();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let log = Self::parse(&source, modified_at, &text);
        anyhow::ensure!(
            !log.messages.is_empty(),
            "no valid messages found in {}",
            path.display()
        );
        Ok(log)
    }

    /// Parse JSONL text. Blank lines are ignored; lines that are not a JSON
    /// object or array are counted as invalid and skipped.
    pub fn parse(source: &str, modified_at: DateTime<Utc>, text: &str) -> Self {
        let mut log = Self {
            source: source.to_string(),
            modified_at,
            messages: Vec::new(),
            conversations: 0,
            invalid_lines: 0,
        };

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(message)) => log.messages.push(format_message(&message)),
                Ok(Value::Array(turns)) => {
                    log.conversations += 1;
                    for turn in turns.iter().filter_map(Value::as_object) {
                        log.messages.push(format_message(turn));
                    }
                }
                Ok(_) => {
                    warn!("{source}:{}: not a message or conversation", idx + 1);
                    log.invalid_lines += 1;
                }
                Err(e) => {
                    warn!("{source}:{}: skipping invalid JSON: {e}", idx + 1);
                    log.invalid_lines += 1;
                }
            }
        }
        log
    }

    /// Embed the log into `handle`'s collection. An unchanged log (same
    /// mtime as the stored document) is skipped unless `force` is set.
    pub fn index_into(&self, handle: &IndexHandle, force: bool) -> Result<ConversationReport> {
        let mut report = ConversationReport {
            source: self.source.clone(),
            ..ConversationReport::default()
        };

        let unchanged = handle
            .documents()?
            .get(&self.source)
            .is_some_and(|stored| stored.timestamp() == self.modified_at.timestamp());
        if unchanged && !force {
            debug!("unchanged: {}", self.source);
            report.skipped = true;
            return Ok(report);
        }

        let chunks: Vec<Chunk<'_>> = self
            .messages
            .iter()
            .enumerate()
            .map(|(position, content)| Chunk {
                position,
                content: content.as_str(),
            })
            .collect();
        handle.upsert(&self.source, self.modified_at, &chunks)?;

        report.conversations = self.conversations;
        report.messages = self.messages.len();
        report.invalid_lines = self.invalid_lines;
        info!(
            "Imported {} into {}: {} messages in {} conversations, {} invalid lines",
            self.source,
            handle.name(),
            report.messages,
            report.conversations,
            report.invalid_lines
        );
        Ok(report)
    }
}
