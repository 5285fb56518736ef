//! Capture pipeline — microphone chunks → encoded outbound frames.
//!
//! Driven entirely by the capture device: each [`AudioChunk`] arriving on
//! the channel is downmixed, resampled to the negotiated session rate, and
//! accumulated into fixed-size frames.  The pipeline suspends between
//! chunks and never polls.
//!
//! Per frame: if the transport is not ready, or the session is muted, the
//! frame is **dropped** — no error, no retry, no queueing for later
//! delivery.  Losing a live frame while muted or disconnected is correct
//! behavior, not a fault.  Otherwise the frame is encoded and sent as
//! `{type:"audio", audio:<base64>, sampleRate}`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::capture::AudioChunk;
use crate::audio::clock::AudioClock;
use crate::audio::{codec, downmix_to_mono, resample, FrameChunker};
use crate::session::protocol::ClientMessage;
use crate::session::transport::MessageSink;

/// Run the capture pipeline until the chunk channel closes.
///
/// `clock` is the session's capture clock, used to check per-frame
/// processing time against the frame period.  Spawned as a tokio task by
/// the session manager; exits when the capture handle is dropped (the
/// channel's senders go away at teardown).
pub async fn run_capture_pipeline(
    mut chunk_rx: mpsc::UnboundedReceiver<AudioChunk>,
    sink: Arc<dyn MessageSink>,
    muted: Arc<AtomicBool>,
    clock: Arc<dyn AudioClock>,
    session_rate: u32,
    frame_samples: usize,
) {
    let mut chunker = FrameChunker::new(frame_samples);
    let frame_period = codec::duration_secs(frame_samples, session_rate);

    while let Some(chunk) = chunk_rx.recv().await {
        let mono = downmix_to_mono(&chunk.samples, chunk.channels);
        let resampled = resample(&mono, chunk.sample_rate, session_rate);
        chunker.push(&resampled);

        while let Some(frame) = chunker.next_frame() {
            if muted.load(Ordering::SeqCst) || !sink.is_ready() {
                continue;
            }

            let started = clock.now();
            let message = ClientMessage::Audio {
                audio: codec::encode_samples(&frame),
                sample_rate: session_rate,
            };
            sink.send(&message);

            // Encoding and sending must finish well inside one frame period
            // or the device callback backs up.
            let elapsed = clock.now() - started;
            if elapsed > frame_period {
                log::warn!(
                    "capture frame took {:.0} ms to encode/send (period {:.0} ms)",
                    elapsed * 1_000.0,
                    frame_period * 1_000.0
                );
            }
        }
    }

    log::debug!("capture pipeline: chunk channel closed, exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
