//! Append-only transcript of one voice session.
//!
//! Entries are appended strictly in arrival order and never mutated or
//! reordered afterwards.  The session event loop is the only writer; the
//! front-end reads snapshots.  Transcripts live and die with the session —
//! nothing is persisted across process restarts.

use std::time::SystemTime;

use crate::session::protocol::SpeakerRole;

// ---------------------------------------------------------------------------
// TranscriptEntry
// ---------------------------------------------------------------------------

/// One immutable transcript line.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Who said it.
    pub role: SpeakerRole,
    /// The transcribed text (never empty — empty lines are dropped before
    /// insertion).
    pub text: String,
    /// Wall-clock time the line arrived.
    pub timestamp: SystemTime,
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Ordered, append-only sequence of transcript entries.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line stamped with the current wall-clock time.
    ///
    /// Empty and whitespace-only text is dropped without appending.
    pub fn push(&mut self, role: SpeakerRole, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.entries.push(TranscriptEntry {
            role,
            text,
            timestamp: SystemTime::now(),
        });
    }

    /// Snapshot of all entries in arrival order.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries (front-end "clear transcript" command).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_arrival_order() {
        let mut transcript = Transcript::new();
        transcript.push(SpeakerRole::User, "first");
        transcript.push(SpeakerRole::Assistant, "second");
        transcript.push(SpeakerRole::User, "third");

        let texts: Vec<&str> = transcript.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn roles_are_recorded() {
        let mut transcript = Transcript::new();
        transcript.push(SpeakerRole::User, "hello");
        transcript.push(SpeakerRole::Assistant, "hi there");

        assert_eq!(transcript.entries()[0].role, SpeakerRole::User);
        assert_eq!(transcript.entries()[1].role, SpeakerRole::Assistant);
    }

    #[test]
    fn empty_text_is_dropped() {
        let mut transcript = Transcript::new();
        transcript.push(SpeakerRole::User, "");
        transcript.push(SpeakerRole::Assistant, "   ");
        assert!(transcript.is_empty());
    }

    #[test]
    fn timestamps_are_non_decreasing() {
        let mut transcript = Transcript::new();
        transcript.push(SpeakerRole::User, "a");
        transcript.push(SpeakerRole::User, "b");

        let entries = transcript.entries();
        assert!(entries[1].timestamp >= entries[0].timestamp);
    }

    #[test]
    fn clear_empties_the_sequence() {
        let mut transcript = Transcript::new();
        transcript.push(SpeakerRole::User, "line");
        assert_eq!(transcript.len(), 1);

        transcript.clear();
        assert!(transcript.is_empty());

        // Still usable after clear.
        transcript.push(SpeakerRole::Assistant, "again");
        assert_eq!(transcript.len(), 1);
    }
}
