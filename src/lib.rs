//! Real-time voice session client.
//!
//! Captures microphone audio, streams it to a remote conversational agent
//! over a persistent duplex WebSocket, and plays the synthesized speech that
//! comes back — gaplessly, in arrival order — while tracking transcript and
//! session state.
//!
//! # Architecture
//!
//! ```text
//! Microphone → cpal callback → resample/downmix → FrameChunker
//!            → encode (PCM16 + base64) → guarded WebSocket send
//!
//! WebSocket  → inbound dispatch → PlaybackScheduler → rodio sink
//!                               → transcript / VoiceState
//! ```
//!
//! The [`session::SessionManager`] is the single entry/exit point: it owns
//! the handshake, both audio clocks, the microphone, the playback sink, and
//! the connection, and guarantees full teardown on every exit path.

pub mod audio;
pub mod config;
pub mod session;
