//! Voice session engine — transport, state machine, and lifecycle.
//!
//! # Session flow
//!
//! ```text
//! start_session()
//!   └─▶ handshake → audio clocks → playback sink → microphone → WebSocket
//!         └─▶ capture pipeline task   (frames → encode → guarded send)
//!         └─▶ session event loop      (inbound events → state / transcript
//!                                      / playback scheduling)
//!
//! end_session() / remote close / transport failure
//!   └─▶ release everything, unconditionally and idempotently
//! ```

pub mod handshake;
pub mod manager;
pub mod pipeline;
pub mod protocol;
pub mod state;
pub mod transcript;
pub mod transport;

pub use handshake::{HandshakeClient, HandshakeError, HandshakeResponse, HttpHandshake};
pub use manager::{SessionError, SessionManager};
pub use protocol::{AssertedState, ClientMessage, ServerMessage, SpeakerRole};
pub use state::{StateEvent, VoiceState};
pub use transcript::{Transcript, TranscriptEntry};
pub use transport::{MessageSink, SessionEvent, SessionTransport, TransportError};
