//! Text-to-sign lookup.
//!
//! Maps a free-text phrase to the animation clip that signs it. Exact
//! matches win; otherwise the catalog is scanned in order for the first
//! phrase that contains, or is contained in, the input.

use tracing::debug;

/// Animation key returned when nothing matches.
pub const NOT_SUPPORTED_KEY: &str = "not_supported.gif";

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseEntry {
    /// Normalized phrase (lower-case, trimmed).
    pub phrase: &'static str,
    /// Animation clip identifier.
    pub animation_key: &'static str,
}

const fn entry(phrase: &'static str, animation_key: &'static str) -> PhraseEntry {
    PhraseEntry {
        phrase,
        animation_key,
    }
}

/// The phrase catalog, in scan order.
pub static PHRASE_CATALOG: [PhraseEntry; 14] = [
    entry("hello", "wave_hello.gif"),
    entry("thank you", "thank_you.gif"),
    entry("yes", "thumbs_up.gif"),
    entry("no", "shake_no.gif"),
    entry("help", "help_gesture.gif"),
    entry("stop", "stop_hand.gif"),
    entry("please", "please_gesture.gif"),
    entry("water", "water_drink.gif"),
    entry("more", "more_gesture.gif"),
    entry("finished", "finished_gesture.gif"),
    entry("good morning", "good_morning.gif"),
    entry("how are you", "how_are_you.gif"),
    entry("i am fine", "i_am_fine.gif"),
    entry("nice to meet you", "nice_to_meet.gif"),
];

/// How a lookup was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    /// Substring match in either direction.
    Partial,
    Unmatched,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Partial => "partial",
            Self::Unmatched => "none",
        }
    }
}

/// Result of a phrase lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseMatch {
    pub animation_key: &'static str,
    /// Catalog phrase that matched, if any.
    pub phrase: Option<&'static str>,
    pub kind: MatchKind,
}

impl PhraseMatch {
    fn found(entry: &PhraseEntry, kind: MatchKind) -> Self {
        Self {
            animation_key: entry.animation_key,
            phrase: Some(entry.phrase),
            kind,
        }
    }

    fn unmatched() -> Self {
        Self {
            animation_key: NOT_SUPPORTED_KEY,
            phrase: None,
            kind: MatchKind::Unmatched,
        }
    }

    /// Whether an animation exists for the input.
    pub fn supported(&self) -> bool {
        self.kind != MatchKind::Unmatched
    }
}

/// Read-only view over a phrase catalog.
#[derive(Debug, Clone, Copy)]
pub struct PhraseCatalog {
    entries: &'static [PhraseEntry],
}

impl PhraseCatalog {
    /// The standard catalog.
    pub const fn new() -> Self {
        Self {
            entries: &PHRASE_CATALOG,
        }
    }

    /// Catalog phrases in scan order.
    pub fn phrases(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|e| e.phrase)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the animation for `text`.
    ///
    /// Blank input never matches, even though the empty string is a
    /// substring of every phrase.
    pub fn lookup(&self, text: &str) -> PhraseMatch {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return PhraseMatch::unmatched();
        }

        let result = if let Some(e) = self.entries.iter().find(|e| e.phrase == normalized) {
            PhraseMatch::found(e, MatchKind::Exact)
        } else if let Some(e) = self.entries.iter().find(|e| {
            normalized.contains(e.phrase) || e.phrase.contains(normalized.as_str())
        }) {
            PhraseMatch::found(e, MatchKind::Partial)
        } else {
            PhraseMatch::unmatched()
        };

        debug!(
            text = normalized.as_str(),
            animation_key = result.animation_key,
            kind = result.kind.as_str(),
            "phrase lookup"
        );
        result
    }
}

impl Default for PhraseCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim and lower-case a phrase.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Look up `text` in the standard catalog.
pub fn lookup(text: &str) -> PhraseMatch {
    PhraseCatalog::new().lookup(text)
}

/// Catalog phrases in scan order.
pub fn catalog_phrases() -> impl Iterator<Item = &'static str> {
    PhraseCatalog::new().phrases()
}
