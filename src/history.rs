//! In-memory conversation log.
//!
//! Records one entry per classification or text-to-sign request. Entries
//! are immutable once written and can only be removed all at once.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Default number of entries returned by a listing.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Default number of entries retained before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Direction of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A hand pose was classified into a gesture.
    SignToText,
    /// A phrase was looked up for its animation.
    TextToSign,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignToText => "sign-to-text",
            Self::TextToSign => "text-to-sign",
        }
    }
}

/// One recorded exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub id: u64,
    pub message: String,
    pub kind: EntryKind,
    pub confidence: Option<f32>,
    /// Unix time in milliseconds.
    pub timestamp_ms: u64,
}

impl ConversationEntry {
    /// Format as an s-expression plist.
    pub fn to_sexp(&self) -> String {
        let confidence = self
            .confidence
            .map(|c| format!("{:.2}", c))
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:id {} :message \"{}\" :kind :{} :confidence {} :timestamp {})",
            self.id,
            escape(&self.message),
            self.kind.as_str(),
            confidence,
            self.timestamp_ms,
        )
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Bounded, append-only conversation log.
#[derive(Debug)]
pub struct ConversationLog {
    entries: VecDeque<ConversationEntry>,
    capacity: usize,
    next_id: u64,
}

impl ConversationLog {
    /// Create a log retaining at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Append an entry and return its id.
    pub fn record(&mut self, kind: EntryKind, message: &str, confidence: Option<f32>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ConversationEntry {
            id,
            message: message.to_string(),
            kind,
            confidence,
            timestamp_ms: unix_millis(),
        });
        debug!(id, kind = kind.as_str(), "conversation entry recorded");
        id
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.iter().rev().take(limit)
    }

    /// Remove every entry, returning how many were removed.
    ///
    /// Ids keep increasing across clears.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Current Unix time in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
