//! Duplex session transport over WebSocket.
//!
//! [`SessionTransport::connect`] opens the connection and spawns two tasks:
//! a writer draining the outbound channel into the socket, and a reader
//! decoding inbound text frames into [`SessionEvent`]s for the session
//! event loop.
//!
//! Outbound sending is a single guarded primitive ([`MessageSink::send`]):
//! messages are silently dropped unless the connection is open — callers
//! never see an error for a frame lost to a closing socket.  Inbound frames
//! that fail to parse (unknown kinds, malformed JSON, undecodable audio)
//! are logged at debug level and ignored; they are never fatal and never
//! change session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite};

use crate::audio::codec;
use crate::session::protocol::{AssertedState, ClientMessage, ServerMessage, SpeakerRole};

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Inbound events delivered to the session event loop, in arrival order.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A decoded audio chunk ready for scheduling.
    Audio(Vec<f32>),
    /// One transcript line (text guaranteed non-empty).
    Transcript { role: SpeakerRole, text: String },
    /// The agent started working on a response.
    Thinking,
    /// Flush scheduled playback (barge-in).
    Clear,
    /// The server reported an error.
    RemoteError(String),
    /// The server asserted a session state.
    StateAsserted(AssertedState),
    /// The connection failed at the protocol or socket level.
    TransportFailed(String),
    /// The connection closed (remote close frame or end of stream).
    Closed,
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening the connection.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error("connection open timed out")]
    ConnectTimeout,
}

// ---------------------------------------------------------------------------
// MessageSink trait
// ---------------------------------------------------------------------------

/// Guarded outbound send — the only way anything writes to the connection.
pub trait MessageSink: Send + Sync {
    /// Send `message` if the connection is open; drop it silently otherwise.
    fn send(&self, message: &ClientMessage);

    /// Whether the connection is currently open for sending.
    fn is_ready(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Inbound routing
// ---------------------------------------------------------------------------

/// Map one inbound text frame to a session event.
///
/// Returns `None` for anything that should be ignored: unknown kinds,
/// malformed JSON, undecodable audio payloads, empty transcript lines.
fn route_text(text: &str) -> Option<SessionEvent> {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            log::debug!("ignoring unparseable inbound frame: {e}");
            return None;
        }
    };

    match message {
        ServerMessage::Audio { audio } => match codec::decode_samples(&audio) {
            Ok(samples) => Some(SessionEvent::Audio(samples)),
            Err(e) => {
                log::debug!("dropping undecodable audio chunk: {e}");
                None
            }
        },
        ServerMessage::Transcript { role, text } => {
            if text.trim().is_empty() {
                None
            } else {
                Some(SessionEvent::Transcript { role, text })
            }
        }
        ServerMessage::Thinking => Some(SessionEvent::Thinking),
        ServerMessage::Clear => Some(SessionEvent::Clear),
        ServerMessage::Error { message } => Some(SessionEvent::RemoteError(message)),
        ServerMessage::State { state } => Some(SessionEvent::StateAsserted(state)),
    }
}

// ---------------------------------------------------------------------------
// SessionTransport
// ---------------------------------------------------------------------------

/// Owns the duplex connection for exactly one session.
///
/// [`close`](Self::close) is idempotent; dropping the transport closes the
/// connection and stops both tasks.
pub struct SessionTransport {
    outbound_tx: mpsc::UnboundedSender<tungstenite::Message>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl SessionTransport {
    /// Open the WebSocket at `endpoint` and start the reader/writer tasks.
    ///
    /// Inbound events are delivered to `event_tx` strictly in the order the
    /// socket delivers them.
    ///
    /// # Errors
    ///
    /// - [`TransportError::ConnectTimeout`] — the socket did not open within
    ///   `connect_timeout_secs`.
    /// - [`TransportError::Connect`] — the connection attempt failed.
    pub async fn connect(
        endpoint: &str,
        connect_timeout_secs: u64,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(connect_timeout_secs);
        let (stream, _response) = tokio::time::timeout(timeout, connect_async(endpoint))
            .await
            .map_err(|_| TransportError::ConnectTimeout)?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        log::info!("session connection open: {endpoint}");

        let (mut ws_tx, mut ws_rx) = stream.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<tungstenite::Message>();

        // Writer: sole owner of the socket's outbound half.
        let connected_writer = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let is_close = matches!(message, tungstenite::Message::Close(_));
                if ws_tx.send(message).await.is_err() {
                    connected_writer.store(false, Ordering::SeqCst);
                    break;
                }
                if is_close {
                    let _ = ws_tx.close().await;
                    break;
                }
            }
        });

        // Reader: decodes inbound frames and reports connection-level
        // events.  Pings are answered by tungstenite internally.
        let connected_reader = Arc::clone(&connected);
        let reader = tokio::spawn(async move {
            loop {
                match ws_rx.next().await {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(event) = route_text(&text) {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        connected_reader.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::Closed);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary / ping / pong frames are not part of the
                        // protocol — ignore.
                    }
                    Some(Err(e)) => {
                        connected_reader.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::TransportFailed(e.to_string()));
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound_tx,
            connected,
            reader,
        })
    }

    /// Close the connection.  Safe to call repeatedly; only the first call
    /// sends a close frame.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.outbound_tx.send(tungstenite::Message::Close(None));
        }
    }
}

impl MessageSink for SessionTransport {
    fn send(&self, message: &ClientMessage) {
        if !self.connected.load(Ordering::SeqCst) {
            return;
        }
        match serde_json::to_string(message) {
            Ok(json) => {
                let _ = self.outbound_tx.send(tungstenite::Message::Text(json.into()));
            }
            Err(e) => {
                log::debug!("dropping unserializable outbound message: {e}");
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SessionTransport {
    fn drop(&mut self) {
        self.close();
        // The writer exits when the outbound channel drops with us; the
        // reader may be blocked on a dead socket and is stopped directly.
        self.reader.abort();
    }
}

// ---------------------------------------------------------------------------
// RecordingMessageSink  (test-only)
// ---------------------------------------------------------------------------

/// Test double that records sent messages and has a switchable ready flag.
#[cfg(test)]
pub struct RecordingMessageSink {
    sent: std::sync::Mutex<Vec<ClientMessage>>,
    ready: AtomicBool,
}

#[cfg(test)]
impl RecordingMessageSink {
    pub fn new(ready: bool) -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            ready: AtomicBool::new(ready),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl MessageSink for RecordingMessageSink {
    fn send(&self, message: &ClientMessage) {
        if self.is_ready() {
            self.sent.lock().unwrap().push(message.clone());
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::encode_samples;

    // ---- route_text: happy paths -------------------------------------------

    #[test]
    fn audio_frame_routes_to_decoded_samples() {
        let payload = encode_samples(&[0.0, 0.5, -0.5]);
        let frame = format!(r#"{{"type":"audio","audio":"{payload}"}}"#);

        match route_text(&frame) {
            Some(SessionEvent::Audio(samples)) => assert_eq!(samples.len(), 3),
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn transcript_frame_routes_with_role() {
        let frame = r#"{"type":"transcript","role":"user","text":"hello there"}"#;
        match route_text(frame) {
            Some(SessionEvent::Transcript { role, text }) => {
                assert_eq!(role, SpeakerRole::User);
                assert_eq!(text, "hello there");
            }
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn control_frames_route_directly() {
        assert!(matches!(
            route_text(r#"{"type":"thinking"}"#),
            Some(SessionEvent::Thinking)
        ));
        assert!(matches!(
            route_text(r#"{"type":"clear"}"#),
            Some(SessionEvent::Clear)
        ));
    }

    #[test]
    fn error_frame_carries_the_message() {
        match route_text(r#"{"type":"error","message":"quota exceeded"}"#) {
            Some(SessionEvent::RemoteError(message)) => {
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn state_frame_routes_to_assertion() {
        match route_text(r#"{"type":"state","state":"speaking"}"#) {
            Some(SessionEvent::StateAsserted(state)) => {
                assert_eq!(state, AssertedState::Speaking);
            }
            other => panic!("unexpected routing: {other:?}"),
        }
    }

    // ---- route_text: ignored frames ----------------------------------------

    #[test]
    fn malformed_json_is_ignored() {
        assert!(route_text("{{{{").is_none());
        assert!(route_text("").is_none());
    }

    #[test]
    fn unknown_kind_is_ignored() {
        assert!(route_text(r#"{"type":"metrics","value":1}"#).is_none());
    }

    #[test]
    fn undecodable_audio_is_dropped() {
        assert!(route_text(r#"{"type":"audio","audio":"!!!not-base64!!!"}"#).is_none());
    }

    #[test]
    fn empty_transcript_is_dropped() {
        assert!(route_text(r#"{"type":"transcript","role":"user","text":""}"#).is_none());
        assert!(route_text(r#"{"type":"transcript","role":"user","text":"  "}"#).is_none());
    }

    // ---- RecordingMessageSink guard ----------------------------------------

    #[test]
    fn sink_drops_sends_while_not_ready() {
        let sink = RecordingMessageSink::new(false);
        sink.send(&ClientMessage::Audio {
            audio: "AAAA".into(),
            sample_rate: 24_000,
        });
        assert!(sink.sent().is_empty());

        sink.set_ready(true);
        sink.send(&ClientMessage::Audio {
            audio: "BBBB".into(),
            sample_rate: 24_000,
        });
        assert_eq!(sink.sent().len(), 1);
    }
}
