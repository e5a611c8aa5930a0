//! In-memory rolling session log
//!
//! Holds the recent transcript/status entries plus the citation list for
//! display. Nothing here is persisted; the log is bounded and conversation
//! history is discarded with it.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::wire::WebSource;

/// Default number of entries retained
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Kind of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Connection lifecycle and status notes
    Status,
    /// Model transcript fragment
    Model,
    /// Classified session error
    Error,
}

/// One entry in the rolling log
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Bounded rolling log of session activity and deduplicated citations
#[derive(Debug)]
pub struct SessionLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    citations: Vec<WebSource>,
    seen_uris: HashSet<String>,
}

impl SessionLog {
    /// Create a log retaining at most `capacity` entries
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity: capacity.max(1),
            citations: Vec::new(),
            seen_uris: HashSet::new(),
        }
    }

    /// Append an entry, evicting the oldest when full
    pub fn push(&mut self, kind: LogKind, text: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            kind,
            text: text.into(),
            at: Utc::now(),
        });
    }

    /// Record citations, deduplicating by URI
    pub fn add_citations(&mut self, sources: Vec<WebSource>) {
        for source in sources {
            if source.uri.is_empty() || !self.seen_uris.insert(source.uri.clone()) {
                continue;
            }
            tracing::debug!(uri = %source.uri, title = ?source.title, "citation");
            self.citations.push(source);
        }
    }

    /// Reset for a fresh session
    pub fn clear(&mut self) {
        self.entries.clear();
        self.citations.clear();
        self.seen_uris.clear();
    }

    /// Retained entries, oldest first
    #[must_use]
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Deduplicated citation list in arrival order
    #[must_use]
    pub fn citations(&self) -> &[WebSource] {
        &self.citations
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web(uri: &str) -> WebSource {
        WebSource {
            uri: uri.to_string(),
            title: None,
        }
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = SessionLog::new(3);
        for i in 0..5 {
            log.push(LogKind::Status, format!("entry {i}"));
        }

        assert_eq!(log.len(), 3);
        let first = log.entries().next().unwrap();
        assert_eq!(first.text, "entry 2");
    }

    #[test]
    fn test_citations_deduplicated_by_uri() {
        let mut log = SessionLog::default();
        log.add_citations(vec![web("https://a"), web("https://b"), web("https://a")]);
        log.add_citations(vec![web("https://b"), web("https://c")]);

        let uris: Vec<_> = log.citations().iter().map(|c| c.uri.as_str()).collect();
        assert_eq!(uris, vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn test_empty_uri_skipped() {
        let mut log = SessionLog::default();
        log.add_citations(vec![web("")]);
        assert!(log.citations().is_empty());
    }

    #[test]
    fn test_clear_resets_dedup() {
        let mut log = SessionLog::default();
        log.add_citations(vec![web("https://a")]);
        log.clear();
        log.add_citations(vec![web("https://a")]);
        assert_eq!(log.citations().len(), 1);
    }
}
