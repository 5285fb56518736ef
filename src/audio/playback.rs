//! Gapless playback scheduling for inbound audio chunks.
//!
//! Chunks arrive from the network at irregular intervals but must play
//! back-to-back with no gap or overlap.  [`PlaybackScheduler`] keeps a
//! single `next_playback_time` cursor on the session's playback clock:
//!
//! ```text
//! start = max(clock.now(), next_playback_time)
//! next_playback_time = start + chunk_duration
//! ```
//!
//! A chunk therefore never starts before the previous one finishes, and
//! never starts earlier than "now" once the queue has drained.
//!
//! ## End-of-speech detection
//!
//! Each scheduled chunk spawns a watcher that wakes at the chunk's end; if
//! no later chunk has pushed `next_playback_time` more than a small epsilon
//! (~50 ms) past the current clock time, a drained notification is emitted
//! and the session moves from Speaking back to Listening.  This is a timing
//! heuristic, not an explicit server signal — the server's own `state`
//! events take precedence when present.
//!
//! ## Output device
//!
//! [`RodioSink`] owns a `rodio::OutputStream` + `Sink` on a dedicated
//! playback thread (the stream handle is not `Send`) and receives commands
//! over a channel.  The rodio sink queues sources back-to-back, so appending
//! in schedule order realises the computed timeline.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use super::clock::AudioClock;
use super::codec;

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening the audio output device.
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    /// No output device, or the platform rejected the stream.
    #[error("failed to open audio output: {0}")]
    OutputUnavailable(String),

    /// The playback thread died before reporting readiness.
    #[error("playback thread failed to start")]
    ThreadStartup,
}

// ---------------------------------------------------------------------------
// PlaybackSink trait
// ---------------------------------------------------------------------------

/// Object-safe destination for decoded audio.
///
/// The production implementation is [`RodioSink`]; tests substitute a
/// recording double.  Implementations must queue appended chunks strictly
/// in call order.
pub trait PlaybackSink: Send + Sync {
    /// Queue `samples` (mono, `sample_rate` Hz) after everything already
    /// queued.
    fn append(&self, samples: Vec<f32>, sample_rate: u32);

    /// Drop everything queued and fall silent immediately.
    fn clear(&self);
}

// ---------------------------------------------------------------------------
// RodioSink
// ---------------------------------------------------------------------------

enum SinkCommand {
    Append(Vec<f32>, u32),
    Clear,
    Shutdown,
}

/// Speaker output backed by a rodio `Sink` on a dedicated playback thread.
///
/// Dropping the handle shuts the thread down and releases the output
/// device.
pub struct RodioSink {
    cmd_tx: mpsc::UnboundedSender<SinkCommand>,
}

impl RodioSink {
    /// Open the default output device and start the playback thread.
    ///
    /// Blocks until the device is open so acquisition failures surface at
    /// session start rather than on the first chunk.
    pub fn start() -> Result<Self, PlaybackError> {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<SinkCommand>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), PlaybackError>>();

        std::thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                // OutputStream is not Send — it must live on this thread.
                let (stream, handle) = match rodio::OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError::OutputUnavailable(e.to_string())));
                        return;
                    }
                };
                let sink = match rodio::Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError::OutputUnavailable(e.to_string())));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                while let Some(cmd) = cmd_rx.blocking_recv() {
                    match cmd {
                        SinkCommand::Append(samples, sample_rate) => {
                            let source =
                                rodio::buffer::SamplesBuffer::new(1, sample_rate, samples);
                            sink.append(source);
                        }
                        SinkCommand::Clear => {
                            sink.stop();
                            sink.play();
                        }
                        SinkCommand::Shutdown => break,
                    }
                }

                drop(stream);
                log::debug!("playback thread exiting");
            })
            .map_err(|e| PlaybackError::OutputUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { cmd_tx }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PlaybackError::ThreadStartup),
        }
    }
}

impl PlaybackSink for RodioSink {
    fn append(&self, samples: Vec<f32>, sample_rate: u32) {
        // Send errors mean the playback thread is gone — the session is
        // tearing down and the chunk is moot.
        let _ = self.cmd_tx.send(SinkCommand::Append(samples, sample_rate));
    }

    fn clear(&self) {
        let _ = self.cmd_tx.send(SinkCommand::Clear);
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SinkCommand::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// PlaybackScheduler
// ---------------------------------------------------------------------------

/// Start time and duration assigned to one scheduled chunk, in seconds on
/// the playback clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSchedule {
    pub start: f64,
    pub duration: f64,
}

/// Schedules inbound chunks contiguously on the playback clock.
///
/// `next_playback_time` starts at `0.0` ("unscheduled") and is reset to
/// `0.0` by [`clear`](Self::clear) when the server flushes playback
/// (barge-in).  Scheduling calls are serialized by an internal mutex so
/// concurrent chunks cannot interleave the read-modify-write and break the
/// gapless invariant.
pub struct PlaybackScheduler {
    clock: Arc<dyn AudioClock>,
    sink: Arc<dyn PlaybackSink>,
    next_playback_time: Arc<Mutex<f64>>,
    drain_epsilon: f64,
    drained_tx: mpsc::UnboundedSender<()>,
}

impl PlaybackScheduler {
    /// Create a scheduler over `clock` and `sink`.
    ///
    /// `drained_tx` receives one message whenever playback drains (the
    /// Speaking → Listening trigger); `drain_epsilon_ms` is the slack used
    /// by that check.
    pub fn new(
        clock: Arc<dyn AudioClock>,
        sink: Arc<dyn PlaybackSink>,
        drain_epsilon_ms: u64,
        drained_tx: mpsc::UnboundedSender<()>,
    ) -> Self {
        Self {
            clock,
            sink,
            next_playback_time: Arc::new(Mutex::new(0.0)),
            drain_epsilon: drain_epsilon_ms as f64 / 1_000.0,
            drained_tx,
        }
    }

    /// Schedule `samples` to play immediately after everything already
    /// scheduled, and spawn the end-of-chunk drain watcher.
    ///
    /// Empty chunks are ignored and do not advance the cursor.
    pub fn schedule(&self, samples: Vec<f32>, sample_rate: u32) -> ChunkSchedule {
        let duration = codec::duration_secs(samples.len(), sample_rate);
        if samples.is_empty() || duration == 0.0 {
            return ChunkSchedule {
                start: self.clock.now(),
                duration: 0.0,
            };
        }

        // Single serialized read-modify-write of the cursor.
        let (start, end) = {
            let mut next = self.next_playback_time.lock().unwrap();
            let now = self.clock.now();
            let start = now.max(*next);
            *next = start + duration;
            (start, *next)
        };

        self.sink.append(samples, sample_rate);

        let clock = Arc::clone(&self.clock);
        let next_ref = Arc::clone(&self.next_playback_time);
        let drained_tx = self.drained_tx.clone();
        let epsilon = self.drain_epsilon;

        tokio::spawn(async move {
            let wait = (end - clock.now()).max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;

            // Drained only if no later chunk extended the cursor past the
            // epsilon window.
            let next = *next_ref.lock().unwrap();
            if next <= clock.now() + epsilon {
                let _ = drained_tx.send(());
            }
        });

        ChunkSchedule { start, duration }
    }

    /// Flush pending playback: reset the cursor to `0.0` (unscheduled) and
    /// silence the sink.  Used on the server's `clear` signal and at
    /// teardown.
    pub fn clear(&self) {
        *self.next_playback_time.lock().unwrap() = 0.0;
        self.sink.clear();
    }

    /// Current value of the scheduling cursor, in seconds on the playback
    /// clock.  `0.0` means nothing is scheduled.
    pub fn next_playback_time(&self) -> f64 {
        *self.next_playback_time.lock().unwrap()
    }

    /// Whether the scheduled queue has drained (cursor within the epsilon
    /// window of "now").
    pub fn is_drained(&self) -> bool {
        self.next_playback_time() <= self.clock.now() + self.drain_epsilon
    }
}

// ---------------------------------------------------------------------------
// RecordingSink  (test-only)
// ---------------------------------------------------------------------------

/// Test double that records every append and clear instead of playing.
#[cfg(test)]
pub struct RecordingSink {
    appended: Mutex<Vec<(usize, u32)>>,
    clears: Mutex<usize>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self {
            appended: Mutex::new(Vec::new()),
            clears: Mutex::new(0),
        }
    }

    /// `(sample_count, sample_rate)` of every appended chunk, in order.
    pub fn appended(&self) -> Vec<(usize, u32)> {
        self.appended.lock().unwrap().clone()
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.lock().unwrap()
    }
}

#[cfg(test)]
impl PlaybackSink for RecordingSink {
    fn append(&self, samples: Vec<f32>, sample_rate: u32) {
        self.appended.lock().unwrap().push((samples.len(), sample_rate));
    }

    fn clear(&self) {
        *self.clears.lock().unwrap() += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::clock::{ManualClock, SessionClock};

    fn make_scheduler(
        clock: Arc<dyn AudioClock>,
    ) -> (PlaybackScheduler, Arc<RecordingSink>, mpsc::UnboundedReceiver<()>) {
        let sink = Arc::new(RecordingSink::new());
        let (drained_tx, drained_rx) = mpsc::unbounded_channel();
        let scheduler = PlaybackScheduler::new(clock, sink.clone(), 50, drained_tx);
        (scheduler, sink, drained_rx)
    }

    /// 0.5 s of audio at 24 kHz.
    fn half_second_chunk() -> Vec<f32> {
        vec![0.0_f32; 12_000]
    }

    // ---- Gapless invariant -------------------------------------------------

    #[tokio::test]
    async fn backlogged_chunks_are_scheduled_back_to_back() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, _, _rx) = make_scheduler(clock.clone());

        // Both chunks arrive at t=0 — second must start exactly when the
        // first ends.
        let first = scheduler.schedule(half_second_chunk(), 24_000);
        let second = scheduler.schedule(half_second_chunk(), 24_000);

        assert_eq!(first.start, 0.0);
        assert!((first.duration - 0.5).abs() < 1e-9);
        assert!((second.start - (first.start + first.duration)).abs() < 1e-9);
        assert!((scheduler.next_playback_time() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn drained_queue_restarts_at_now() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, _, _rx) = make_scheduler(clock.clone());

        scheduler.schedule(half_second_chunk(), 24_000);

        // Long silence: the queue finished at t=0.5, a new chunk arrives at
        // t=3.0 and must start at 3.0, not 0.5.
        clock.set(3.0);
        let late = scheduler.schedule(half_second_chunk(), 24_000);

        assert!((late.start - 3.0).abs() < 1e-9);
        assert!((scheduler.next_playback_time() - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn start_times_are_non_decreasing_under_jitter() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, _, _rx) = make_scheduler(clock.clone());

        let arrivals = [0.0, 0.1, 0.9, 1.0, 2.5];
        let mut last_end = 0.0_f64;
        let mut last_start = 0.0_f64;

        for &t in &arrivals {
            clock.set(t);
            let s = scheduler.schedule(vec![0.0; 4_800], 24_000); // 0.2 s each
            assert!(s.start >= last_start, "start regressed at t={t}");
            assert!(s.start >= last_end - 1e-9, "overlap at t={t}");
            last_start = s.start;
            last_end = s.start + s.duration;
        }
    }

    #[tokio::test]
    async fn chunks_append_to_sink_in_order() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, sink, _rx) = make_scheduler(clock);

        scheduler.schedule(vec![0.0; 100], 24_000);
        scheduler.schedule(vec![0.0; 200], 24_000);
        scheduler.schedule(vec![0.0; 300], 24_000);

        assert_eq!(
            sink.appended(),
            vec![(100, 24_000), (200, 24_000), (300, 24_000)]
        );
    }

    // ---- Clear / reset -----------------------------------------------------

    #[tokio::test]
    async fn clear_resets_cursor_and_flushes_sink() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, sink, _rx) = make_scheduler(clock.clone());

        scheduler.schedule(half_second_chunk(), 24_000);
        assert!(scheduler.next_playback_time() > 0.0);

        scheduler.clear();
        assert_eq!(scheduler.next_playback_time(), 0.0);
        assert_eq!(sink.clear_count(), 1);

        // Scheduling after clear starts from "now" again.
        clock.set(2.0);
        let s = scheduler.schedule(half_second_chunk(), 24_000);
        assert!((s.start - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_chunk_does_not_advance_cursor() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, sink, _rx) = make_scheduler(clock);

        let s = scheduler.schedule(Vec::new(), 24_000);
        assert_eq!(s.duration, 0.0);
        assert_eq!(scheduler.next_playback_time(), 0.0);
        assert!(sink.appended().is_empty());
    }

    #[tokio::test]
    async fn zero_sample_rate_does_not_advance_cursor() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, sink, _rx) = make_scheduler(clock);

        scheduler.schedule(vec![0.0; 100], 0);
        assert_eq!(scheduler.next_playback_time(), 0.0);
        assert!(sink.appended().is_empty());
    }

    // ---- Drain detection ---------------------------------------------------

    #[tokio::test]
    async fn is_drained_follows_the_cursor() {
        let clock = Arc::new(ManualClock::new());
        let (scheduler, _, _rx) = make_scheduler(clock.clone());

        assert!(scheduler.is_drained()); // nothing scheduled

        scheduler.schedule(half_second_chunk(), 24_000);
        assert!(!scheduler.is_drained()); // 0.5 s queued at t=0

        clock.set(0.46); // within the 50 ms epsilon of the 0.5 s end
        assert!(scheduler.is_drained());
    }

    #[tokio::test]
    async fn drained_notification_fires_after_last_chunk() {
        let clock: Arc<dyn AudioClock> = Arc::new(SessionClock::new());
        let (scheduler, _, mut drained_rx) = make_scheduler(clock);

        // 20 ms of real audio — the watcher sleeps real time.
        scheduler.schedule(vec![0.0; 480], 24_000);

        let notified =
            tokio::time::timeout(Duration::from_secs(1), drained_rx.recv()).await;
        assert!(notified.is_ok(), "drained notification never arrived");
    }

    #[tokio::test]
    async fn drained_notification_waits_for_queue_extension() {
        let clock: Arc<dyn AudioClock> = Arc::new(SessionClock::new());
        let (scheduler, _, mut drained_rx) = make_scheduler(clock);

        // Two 300 ms chunks back-to-back: the first chunk's watcher wakes at
        // ~0.3 s with another 300 ms still queued and must stay silent.
        scheduler.schedule(vec![0.0; 7_200], 24_000);
        scheduler.schedule(vec![0.0; 7_200], 24_000);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(
            drained_rx.try_recv().is_err(),
            "drained fired while audio was still queued"
        );

        let notified =
            tokio::time::timeout(Duration::from_secs(1), drained_rx.recv()).await;
        assert!(notified.is_ok(), "drained notification never arrived");
    }
}
