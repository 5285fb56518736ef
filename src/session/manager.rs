//! Session lifecycle — the single entry/exit point for all resources.
//!
//! [`SessionManager::start_session`] runs the full acquisition sequence:
//! handshake → audio clocks → playback sink → microphone → WebSocket, then
//! wires up the capture pipeline and the session event loop.  Any failure
//! at any step tears everything back down and surfaces the reason.
//!
//! [`SessionManager::end_session`] (and `Drop`) release every handle
//! unconditionally, ignoring individual release failures, and are safe to
//! call repeatedly from any state — including mid-handshake.
//!
//! The event loop is the sole writer to session state and transcript;
//! front-end accessors read snapshots behind the same lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::capture::{AudioCapture, AudioChunk, CaptureError, CaptureHandle};
use crate::audio::clock::SessionClock;
use crate::audio::playback::{PlaybackError, PlaybackScheduler, RodioSink};
use crate::config::AppConfig;
use crate::session::handshake::{HandshakeClient, HandshakeError, HttpHandshake};
use crate::session::pipeline::run_capture_pipeline;
use crate::session::state::{StateEvent, VoiceState};
use crate::session::transcript::{Transcript, TranscriptEntry};
use crate::session::transport::{MessageSink, SessionEvent, SessionTransport, TransportError};

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors that can abort a session start.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The handshake collaborator failed or returned unusable credentials.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The microphone could not be acquired.
    #[error("microphone unavailable: {0}")]
    Capture(#[from] CaptureError),

    /// The audio output could not be acquired.
    #[error("audio output unavailable: {0}")]
    Playback(#[from] PlaybackError),

    /// The duplex connection could not be opened.
    #[error("connection failed: {0}")]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Shared session state
// ---------------------------------------------------------------------------

/// Everything the front-end reads, behind one lock.
struct SessionShared {
    state: VoiceState,
    transcript: Transcript,
    error: Option<String>,
    sample_rate: Option<u32>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            state: VoiceState::Idle,
            transcript: Transcript::new(),
            error: None,
            sample_rate: None,
        }
    }

    fn apply(&mut self, event: StateEvent) {
        let next = self.state.apply(event);
        if next != self.state {
            log::debug!("session state: {} → {}", self.state.label(), next.label());
            self.state = next;
        }
    }
}

type SharedSession = Arc<Mutex<SessionShared>>;

// ---------------------------------------------------------------------------
// SessionResources
// ---------------------------------------------------------------------------

/// Live handles for one session; dropping releases everything.
struct SessionResources {
    capture: CaptureHandle,
    transport: Arc<SessionTransport>,
    scheduler: Arc<PlaybackScheduler>,
    tasks: Vec<JoinHandle<()>>,
}

/// Release all resources, ignoring individual failures.  Idempotent: a
/// second call finds the slot empty and does nothing.
fn release_resources(resources: &Mutex<Option<SessionResources>>) {
    let taken = resources.lock().unwrap().take();
    if let Some(res) = taken {
        res.capture.stop();
        res.transport.close();
        // Resets next_playback_time to 0 and silences the sink.
        res.scheduler.clear();
        for task in res.tasks {
            task.abort();
        }
        log::info!("session resources released");
    }
}

// ---------------------------------------------------------------------------
// Session event loop
// ---------------------------------------------------------------------------

/// Apply inbound transport events and playback drain notifications, in
/// delivery order, until the connection ends.
///
/// The loop is the only writer to `shared` for the lifetime of the session.
async fn run_event_loop(
    mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    mut drained_rx: mpsc::UnboundedReceiver<()>,
    shared: SharedSession,
    scheduler: Arc<PlaybackScheduler>,
    sample_rate: u32,
    resources: Arc<Mutex<Option<SessionResources>>>,
) {
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Audio(samples) => {
                        scheduler.schedule(samples, sample_rate);
                        shared.lock().unwrap().apply(StateEvent::AudioReceived);
                    }
                    SessionEvent::Transcript { role, text } => {
                        shared.lock().unwrap().transcript.push(role, text);
                    }
                    SessionEvent::Thinking => {
                        shared.lock().unwrap().apply(StateEvent::ThinkingReceived);
                    }
                    SessionEvent::Clear => {
                        scheduler.clear();
                    }
                    SessionEvent::RemoteError(message) => {
                        log::warn!("server reported error: {message}");
                        let mut shared = shared.lock().unwrap();
                        shared.error = Some(message);
                        shared.apply(StateEvent::ErrorReceived);
                    }
                    SessionEvent::StateAsserted(asserted) => {
                        shared.lock().unwrap().apply(StateEvent::StateAsserted(asserted));
                    }
                    SessionEvent::TransportFailed(message) => {
                        log::error!("transport error: {message}");
                        {
                            let mut shared = shared.lock().unwrap();
                            shared.error = Some(message);
                            shared.apply(StateEvent::ErrorReceived);
                        }
                        release_resources(&resources);
                        break;
                    }
                    SessionEvent::Closed => {
                        log::info!("session connection closed");
                        shared.lock().unwrap().apply(StateEvent::TransportClosed);
                        release_resources(&resources);
                        break;
                    }
                }
            }
            drained = drained_rx.recv() => {
                let Some(()) = drained else { break };
                shared.lock().unwrap().apply(StateEvent::PlaybackDrained);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns the single live voice session and exposes the surface the
/// front-end consumes: state, transcript, error, mute, and the
/// start/end/clear/toggle commands.
pub struct SessionManager {
    config: AppConfig,
    handshake: Arc<dyn HandshakeClient>,
    shared: SharedSession,
    muted: Arc<AtomicBool>,
    resources: Arc<Mutex<Option<SessionResources>>>,
}

impl SessionManager {
    /// Create a manager using the HTTP handshake client from `config`.
    pub fn new(config: AppConfig) -> Self {
        let handshake = Arc::new(HttpHandshake::from_config(&config.agent));
        Self::with_handshake(config, handshake)
    }

    /// Create a manager with an explicit handshake collaborator.
    pub fn with_handshake(config: AppConfig, handshake: Arc<dyn HandshakeClient>) -> Self {
        Self {
            config,
            handshake,
            shared: Arc::new(Mutex::new(SessionShared::new())),
            muted: Arc::new(AtomicBool::new(false)),
            resources: Arc::new(Mutex::new(None)),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start a new session, tearing down any live one first.
    ///
    /// On success the session is Listening; on failure the state is Error
    /// with the reason surfaced via [`error`](Self::error), and every
    /// partially-acquired resource has been released.
    pub async fn start_session(&self) -> Result<(), SessionError> {
        self.end_session();

        {
            let mut shared = self.shared.lock().unwrap();
            shared.apply(StateEvent::StartRequested);
            shared.error = None;
            shared.transcript.clear();
            shared.sample_rate = None;
        }

        match self.acquire_and_wire().await {
            Ok(()) => {
                let cancelled = {
                    let mut shared = self.shared.lock().unwrap();
                    if shared.state == VoiceState::Connecting {
                        shared.apply(StateEvent::ConnectionReady);
                        false
                    } else {
                        // end_session() ran mid-handshake; honor it.
                        true
                    }
                };
                if cancelled {
                    release_resources(&self.resources);
                }
                Ok(())
            }
            Err(e) => {
                {
                    let mut shared = self.shared.lock().unwrap();
                    shared.apply(StateEvent::ConnectFailed);
                    shared.error = Some(e.to_string());
                }
                // Error state first, then release — the close event must
                // not fold Error back to Idle.
                release_resources(&self.resources);
                Err(e)
            }
        }
    }

    /// Full acquisition sequence.  Locals dropped on an early `?` release
    /// whatever was already acquired.
    async fn acquire_and_wire(&self) -> Result<(), SessionError> {
        let agent_id = self.config.agent.agent_id.clone();
        let credentials = self.handshake.negotiate(&agent_id).await?;
        log::info!(
            "handshake ok: endpoint={}, sample_rate={}",
            credentials.endpoint,
            credentials.sample_rate
        );
        self.shared.lock().unwrap().sample_rate = Some(credentials.sample_rate);

        // Independent clocks for the two timelines.
        let playback_clock = Arc::new(SessionClock::new());
        let capture_clock = Arc::new(SessionClock::new());

        let (drained_tx, drained_rx) = mpsc::unbounded_channel();
        let output = Arc::new(RodioSink::start()?);
        let scheduler = Arc::new(PlaybackScheduler::new(
            playback_clock,
            output,
            self.config.audio.drain_epsilon_ms,
            drained_tx,
        ));

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<AudioChunk>();
        let capture = AudioCapture::start(chunk_tx)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(
            SessionTransport::connect(
                &credentials.endpoint,
                self.config.session.connect_timeout_secs,
                event_tx,
            )
            .await?,
        );

        let pipeline_task = tokio::spawn(run_capture_pipeline(
            chunk_rx,
            Arc::clone(&transport) as Arc<dyn MessageSink>,
            Arc::clone(&self.muted),
            capture_clock,
            credentials.sample_rate,
            self.config.audio.frame_samples,
        ));

        let event_task = tokio::spawn(run_event_loop(
            event_rx,
            drained_rx,
            Arc::clone(&self.shared),
            Arc::clone(&scheduler),
            credentials.sample_rate,
            Arc::clone(&self.resources),
        ));

        *self.resources.lock().unwrap() = Some(SessionResources {
            capture,
            transport,
            scheduler,
            tasks: vec![pipeline_task, event_task],
        });

        Ok(())
    }

    /// End the session and release all resources.  Idempotent and safe from
    /// any state.
    pub fn end_session(&self) {
        release_resources(&self.resources);
        self.shared.lock().unwrap().apply(StateEvent::TransportClosed);
    }

    /// Drop all transcript entries.
    pub fn clear_transcript(&self) {
        self.shared.lock().unwrap().transcript.clear();
    }

    /// Flip the mute flag; returns the new value.  Muting drops capture
    /// frames immediately — nothing is queued for later delivery.
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.muted.load(Ordering::SeqCst);
        self.muted.store(muted, Ordering::SeqCst);
        muted
    }

    // -----------------------------------------------------------------------
    // Front-end accessors
    // -----------------------------------------------------------------------

    /// Current voice state.
    pub fn voice_state(&self) -> VoiceState {
        self.shared.lock().unwrap().state
    }

    /// Snapshot of the transcript in arrival order.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.shared.lock().unwrap().transcript.entries().to_vec()
    }

    /// Last surfaced session error, if any.
    pub fn error(&self) -> Option<String> {
        self.shared.lock().unwrap().error.clone()
    }

    /// Whether outbound audio is currently muted.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Negotiated sample rate of the live session, if one is running.
    pub fn sample_rate(&self) -> Option<u32> {
        self.shared.lock().unwrap().sample_rate
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        release_resources(&self.resources);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
