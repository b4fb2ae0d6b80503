//! Host objects visible to native code
//!
//! Senders, players, events and suggestion sinks are owned by the host
//! runtime. Native callbacks receive them as trait objects for the duration
//! of a single call and never retain them.

use std::any::Any;

// ============================================================================
// Senders and players
// ============================================================================

/// Something that can run commands (a player, the console, ...).
pub trait CommandSender: Send + Sync {
    /// Display name of the sender
    fn name(&self) -> String;

    /// Send a chat/console message to the sender
    fn send_message(&self, message: &str);

    /// Check a permission node
    fn has_permission(&self, _permission: &str) -> bool {
        false
    }

    /// The player behind this sender, if it is one
    fn as_player(&self) -> Option<&dyn Player> {
        None
    }
}

/// A connected player.
pub trait Player: Send + Sync {
    /// Stable unique id of the player
    fn uuid(&self) -> String;

    /// Player's username
    fn username(&self) -> String;

    /// Send a chat message to the player
    fn send_message(&self, message: &str);
}

// ============================================================================
// Events
// ============================================================================

/// An event fired on the host event bus.
pub trait Event: Send + Sync {
    /// Host name of the event type (e.g. `PlayerSpawnEvent`)
    fn event_type(&self) -> &str;

    /// Downcast support for typed listeners
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// Suggestions
// ============================================================================

/// One completion entry offered to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionEntry {
    /// Text inserted on completion
    pub text: String,
    /// Optional hover text
    pub tooltip: Option<String>,
}

impl SuggestionEntry {
    /// Create an entry without tooltip
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tooltip: None,
        }
    }

    /// Create an entry with a tooltip
    pub fn with_tooltip(text: impl Into<String>, tooltip: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tooltip: Some(tooltip.into()),
        }
    }
}

/// Mutable sink a suggestion provider fills in place.
pub trait SuggestionSink {
    /// Start offset of the replaced range in the input
    fn set_start(&mut self, start: usize);

    /// Length of the replaced range
    fn set_length(&mut self, length: usize);

    /// Offer a completion
    fn add_entry(&mut self, entry: SuggestionEntry);
}

/// In-memory suggestion sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestion {
    /// Start offset of the replaced range
    pub start: usize,
    /// Length of the replaced range
    pub length: usize,
    /// Offered completions, in insertion order
    pub entries: Vec<SuggestionEntry>,
}

impl Suggestion {
    /// Create an empty suggestion covering `start..start + length`
    pub fn new(start: usize, length: usize) -> Self {
        Self {
            start,
            length,
            entries: Vec::new(),
        }
    }

    /// Texts of all entries
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }
}

impl SuggestionSink for Suggestion {
    fn set_start(&mut self, start: usize) {
        self.start = start;
    }

    fn set_length(&mut self, length: usize) {
        self.length = length;
    }

    fn add_entry(&mut self, entry: SuggestionEntry) {
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggestion_sink() {
        let mut suggestion = Suggestion::new(0, 0);
        {
            let sink: &mut dyn SuggestionSink = &mut suggestion;
            sink.set_start(5);
            sink.set_length(2);
            sink.add_entry(SuggestionEntry::new("alice"));
            sink.add_entry(SuggestionEntry::with_tooltip("bob", "online"));
        }
        assert_eq!(suggestion.start, 5);
        assert_eq!(suggestion.length, 2);
        assert_eq!(suggestion.texts(), vec!["alice", "bob"]);
        assert_eq!(suggestion.entries[1].tooltip.as_deref(), Some("online"));
    }
}
