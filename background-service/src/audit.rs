use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Main,
    Quoted,
}

/// One topic score that pushed a post over its threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicTrigger {
    pub source: ContentSource,
    pub topic: String,
    pub score: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HiddenPost {
    pub identifier: String,
    pub permalink: String,
    pub text: String,
    pub quoted_text: Option<String>,
    pub triggers: Vec<TopicTrigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AuditRecord {
    Hidden(HiddenPost),
    Passed { identifier: String, preview: String },
    Skipped { identifier: String, reason: String },
}

impl AuditRecord {
    pub fn identifier(&self) -> &str {
        match self {
            AuditRecord::Hidden(post) => &post.identifier,
            AuditRecord::Passed { identifier, .. } | AuditRecord::Skipped { identifier, .. } => {
                identifier
            }
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, AuditRecord::Hidden(_))
    }
}

/// First 50 characters of the text, with `...` when the text reaches 50.
pub fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if head.chars().count() >= PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

pub trait AuditSink {
    fn record(&self, record: AuditRecord);
}

/// Writes audit records to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match record {
            AuditRecord::Hidden(post) => {
                for source in [ContentSource::Main, ContentSource::Quoted] {
                    let mut triggers = post
                        .triggers
                        .iter()
                        .filter(|t| t.source == source)
                        .peekable();
                    if triggers.peek().is_none() {
                        continue;
                    }
                    let label = match source {
                        ContentSource::Main => "main",
                        ContentSource::Quoted => "quoted",
                    };
                    warn!("Post {} hidden due to {} tweet scores:", post.identifier, label);
                    for trigger in triggers {
                        warn!(
                            "  {}: {} (threshold {})",
                            trigger.topic, trigger.score, trigger.threshold
                        );
                    }
                }
                warn!("Tweet URL: {}", post.permalink);
                warn!("Tweet Text: {}", post.text);
            }
            AuditRecord::Passed {
                identifier,
                preview,
            } => {
                info!("Post {} passed filter checks: \"{}\"", identifier, preview);
            }
            AuditRecord::Skipped { identifier, reason } => {
                info!("Skipping post {} due to {}", identifier, reason);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: AuditRecord,
}

/// Keeps every record in memory and forwards it to the log.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.entries.lock().iter().map(|e| e.record.clone()).collect()
    }

    pub fn hidden_count(&self) -> usize {
        self.entries.lock().iter().filter(|e| e.record.is_hidden()).count()
    }

    pub fn find(&self, identifier: &str) -> Option<AuditRecord> {
        self.entries
            .lock()
            .iter()
            .rev()
            .find(|e| e.record.identifier() == identifier)
            .map(|e| e.record.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl AuditSink for AuditLog {
    fn record(&self, record: AuditRecord) {
        TracingAuditSink.record(record.clone());
        self.entries.lock().push(AuditEntry {
            recorded_at: Utc::now(),
            record,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("Look at my cat"), "Look at my cat");

        let exactly_fifty = "a".repeat(50);
        assert_eq!(preview(&exactly_fifty), format!("{}...", exactly_fifty));

        let long = "b".repeat(80);
        assert_eq!(preview(&long), format!("{}...", "b".repeat(50)));

        // Counted in characters, not bytes
        let wide = "é".repeat(49);
        assert_eq!(preview(&wide), wide);
    }

    #[test]
    fn test_audit_log_counts_hidden() {
        let log = AuditLog::new();
        log.record(AuditRecord::Passed {
            identifier: "67890".to_string(),
            preview: "Look at my cat".to_string(),
        });
        log.record(AuditRecord::Hidden(HiddenPost {
            identifier: "12345".to_string(),
            permalink: "https://x.com/user/status/12345".to_string(),
            text: "Election results".to_string(),
            quoted_text: None,
            triggers: vec![TopicTrigger {
                source: ContentSource::Main,
                topic: "politics".to_string(),
                score: 0.95,
                threshold: 0.8,
            }],
        }));

        assert_eq!(log.len(), 2);
        assert_eq!(log.hidden_count(), 1);
        assert!(log.find("12345").unwrap().is_hidden());
        assert!(log.find("00000").is_none());
    }

    #[test]
    fn test_record_serialization() {
        let record = AuditRecord::Skipped {
            identifier: "1".to_string(),
            reason: "invalid analysis result".to_string(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["outcome"], "skipped");
        assert_eq!(value["identifier"], "1");
    }
}
