//! Wire message types for the agent session protocol.
//!
//! Every frame on the socket is one JSON object with a `type` discriminator.
//!
//! ## Server → client
//!
//! | type | payload |
//! |------|---------|
//! | `audio` | `audio`: base64 PCM16 |
//! | `transcript` | `role`: `user`/`assistant`, `text` |
//! | `thinking` | — |
//! | `clear` | — |
//! | `error` | `message` |
//! | `state` | `state`: `listening`/`thinking`/`speaking` |
//!
//! ## Client → server
//!
//! | type | payload |
//! |------|---------|
//! | `audio` | `audio`: base64 PCM16, `sampleRate` |
//!
//! Unknown message kinds fail to parse; callers treat that as
//! ignore-and-continue, never as a fatal error.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SpeakerRole
// ---------------------------------------------------------------------------

/// Who produced a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Assistant,
}

// ---------------------------------------------------------------------------
// AssertedState
// ---------------------------------------------------------------------------

/// The subset of voice states the server may assert directly.
///
/// Idle and Error are never server-asserted — they come from connection
/// lifecycle events only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertedState {
    Listening,
    Thinking,
    Speaking,
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Inbound messages, tagged by the `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// A chunk of synthesized speech.
    Audio { audio: String },

    /// One transcript line for either speaker.
    Transcript { role: SpeakerRole, text: String },

    /// The agent started working on a response.
    Thinking,

    /// Flush any scheduled playback (barge-in).
    Clear,

    /// The server reports an error; the interaction is over.
    Error { message: String },

    /// The server asserts the session state directly.
    State { state: AssertedState },
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Outbound messages, tagged by the `type` field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// One encoded microphone frame.
    Audio {
        audio: String,
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
