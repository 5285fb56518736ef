//! Audio pipeline — capture, wire codec, resampling, and gapless playback.
//!
//! # Outbound (microphone → network)
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix_to_mono
//!           → resample → FrameChunker → encode_samples → transport
//! ```
//!
//! # Inbound (network → speaker)
//!
//! ```text
//! transport → decode_samples → PlaybackScheduler → PlaybackSink (rodio)
//! ```

pub mod capture;
pub mod clock;
pub mod codec;
pub mod frame;
pub mod playback;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, CaptureHandle};
pub use clock::{AudioClock, SessionClock};
pub use codec::{decode_samples, duration_secs, encode_samples, CodecError};
pub use frame::FrameChunker;
pub use playback::{ChunkSchedule, PlaybackError, PlaybackScheduler, PlaybackSink, RodioSink};
pub use resample::{downmix_to_mono, resample};
