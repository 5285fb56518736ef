//! Microphone capture via `cpal`.
//!
//! [`AudioCapture::start`] opens the default input device on a dedicated
//! `audio-capture` thread and streams [`AudioChunk`]s over a tokio channel.
//! The returned [`CaptureHandle`] is `Send` (the underlying `cpal::Stream`
//! is not, which is why the stream lives on its own thread) and releases the
//! device when stopped or dropped.
//!
//! The device callback is the capture pipeline's only trigger: each hardware
//! buffer becomes one [`AudioChunk`] pushed over the channel, and nothing on
//! the callback path blocks or allocates beyond the sample copy.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]` at the device's
/// native rate.  Use [`crate::audio::downmix_to_mono`] and
/// [`crate::audio::resample`] to convert to the session format.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(String),

    #[error("failed to build input stream: {0}")]
    BuildStream(String),

    #[error("failed to start audio stream: {0}")]
    PlayStream(String),

    #[error("capture thread failed to start")]
    ThreadStartup,
}

// ---------------------------------------------------------------------------
// CaptureHandle
// ---------------------------------------------------------------------------

/// Keeps the capture thread (and with it the cpal stream) alive.
///
/// [`stop`](Self::stop) is idempotent and also runs on drop, so the
/// microphone is released on every exit path.
pub struct CaptureHandle {
    stop_tx: mpsc::UnboundedSender<()>,
    sample_rate: u32,
    channels: u16,
}

impl CaptureHandle {
    /// Native sample rate of the capture stream in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels in each [`AudioChunk`].
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop capturing and release the microphone.  Safe to call repeatedly.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture built on top of `cpal`.
pub struct AudioCapture;

impl AudioCapture {
    /// Open the system default input device and start streaming
    /// [`AudioChunk`]s to `chunk_tx`.
    ///
    /// Blocks until the device reports ready (or fails), so permission and
    /// device errors surface at session start.  The cpal callback runs on a
    /// platform audio thread; send errors (receiver dropped during teardown)
    /// are silently ignored so that thread never panics.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::NoDevice`] — no input device available.
    /// - [`CaptureError::DefaultConfig`] — the device cannot report a
    ///   default stream configuration.
    /// - [`CaptureError::BuildStream`] / [`CaptureError::PlayStream`] — the
    ///   platform rejected the stream.
    pub fn start(chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> Result<CaptureHandle, CaptureError> {
        let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();
        let (ready_tx, ready_rx) =
            std::sync::mpsc::channel::<Result<(u32, u16), CaptureError>>();

        std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(CaptureError::NoDevice));
                        return;
                    }
                };

                let supported = match device.default_input_config() {
                    Ok(supported) => supported,
                    Err(e) => {
                        let _ = ready_tx.send(Err(CaptureError::DefaultConfig(e.to_string())));
                        return;
                    }
                };

                let channels = supported.channels();
                let sample_rate = supported.sample_rate().0;
                let config: cpal::StreamConfig = supported.into();

                let stream = match device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let chunk = AudioChunk {
                            samples: data.to_vec(),
                            sample_rate,
                            channels,
                        };
                        // Ignore send errors; the receiver may have been dropped.
                        let _ = chunk_tx.send(chunk);
                    },
                    |err: cpal::StreamError| {
                        log::error!("cpal stream error: {err}");
                    },
                    None, // no timeout
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(CaptureError::BuildStream(e.to_string())));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::PlayStream(e.to_string())));
                    return;
                }

                let _ = ready_tx.send(Ok((sample_rate, channels)));

                // Park until stop() or handle drop; the stream stays alive
                // for exactly this scope.
                let _ = stop_rx.blocking_recv();
                drop(stream);
                log::debug!("capture thread exiting");
            })
            .map_err(|e| CaptureError::BuildStream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok((sample_rate, channels))) => {
                log::info!("audio capture started ({sample_rate} Hz, {channels} ch)");
                Ok(CaptureHandle {
                    stop_tx,
                    sample_rate,
                    channels,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::ThreadStartup),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// `AudioChunk` must be `Send` so it can cross thread boundaries.
    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    /// `CaptureHandle` must be `Send` so the session manager can own it
    /// from inside a tokio task.
    #[test]
    fn capture_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureHandle>();
    }

    #[test]
    fn audio_chunk_fields() {
        let chunk = AudioChunk {
            samples: vec![0.0_f32; 512],
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(chunk.samples.len(), 512);
        assert_eq!(chunk.sample_rate, 48_000);
        assert_eq!(chunk.channels, 2);
    }
}
