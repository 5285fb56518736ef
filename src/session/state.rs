//! Voice session state machine.
//!
//! [`VoiceState`] is the authoritative interaction state, transitioned by
//! both local audio events (playback drained) and server-pushed events
//! (audio, thinking, state assertions, errors).  The transition table lives
//! in [`VoiceState::apply`] as a pure function so every row is testable in
//! isolation:
//!
//! ```text
//! Idle / Error ──start requested──▶ Connecting
//! Connecting   ──connection ready─▶ Listening
//!              ──connect failed──▶ Error
//! Listening    ──"thinking"──────▶ Thinking
//! Listening / Thinking ──"audio"─▶ Speaking
//! Thinking     ──server "state"──▶ asserted value
//! Speaking     ──queue drained───▶ Listening
//! any active   ──"error"─────────▶ Error
//! any active   ──transport close─▶ Idle
//! ```
//!
//! Every transition is an idempotent no-op when already in the target
//! state, and unlisted (state, event) pairs leave the state unchanged.

use super::protocol::AssertedState;

// ---------------------------------------------------------------------------
// VoiceState
// ---------------------------------------------------------------------------

/// States of a voice session.
///
/// `Idle` and `Error` are the only states reachable with no live transport;
/// all others require an open connection.  No state is terminal — both
/// `Idle` and `Error` accept a new start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// No session running.
    Idle,

    /// Handshake and connection open are in flight.
    Connecting,

    /// Connected; the microphone stream is live and the agent is waiting.
    Listening,

    /// The agent is working on a response.
    Thinking,

    /// Agent speech is scheduled or playing.
    Speaking,

    /// The session ended with an error.  Only a new start request leaves
    /// this state.
    Error,
}

impl Default for VoiceState {
    fn default() -> Self {
        VoiceState::Idle
    }
}

// ---------------------------------------------------------------------------
// StateEvent
// ---------------------------------------------------------------------------

/// Everything that can drive a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// The front-end asked for a new session.
    StartRequested,
    /// Handshake and connection open both succeeded.
    ConnectionReady,
    /// Handshake or connection open failed.
    ConnectFailed,
    /// An inbound audio chunk was scheduled.
    AudioReceived,
    /// The server sent `thinking`.
    ThinkingReceived,
    /// The playback queue drained (end-of-speech heuristic).
    PlaybackDrained,
    /// The server asserted a state directly.
    StateAsserted(AssertedState),
    /// The server reported an error, or the transport failed.
    ErrorReceived,
    /// The connection closed, remotely or locally.
    TransportClosed,
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

impl VoiceState {
    /// Returns `true` for states that require a live transport.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            VoiceState::Connecting
                | VoiceState::Listening
                | VoiceState::Thinking
                | VoiceState::Speaking
        )
    }

    /// A short human-readable label for status display.
    pub fn label(&self) -> &'static str {
        match self {
            VoiceState::Idle => "Idle",
            VoiceState::Connecting => "Connecting",
            VoiceState::Listening => "Listening",
            VoiceState::Thinking => "Thinking",
            VoiceState::Speaking => "Speaking",
            VoiceState::Error => "Error",
        }
    }

    /// Apply `event` and return the resulting state.
    ///
    /// Pairs not covered by the transition table return `self` unchanged.
    pub fn apply(self, event: StateEvent) -> VoiceState {
        use StateEvent::*;
        use VoiceState::*;

        match (self, event) {
            (Idle | Error, StartRequested) => Connecting,

            (Connecting, ConnectionReady) => Listening,
            (Connecting, ConnectFailed) => Error,

            (Listening, ThinkingReceived) => Thinking,
            (Listening | Thinking | Speaking, AudioReceived) => Speaking,

            (Thinking, StateAsserted(asserted)) => asserted.into(),

            (Speaking, PlaybackDrained) => Listening,

            (state, ErrorReceived) if state.is_active() => Error,
            (state, TransportClosed) if state.is_active() => Idle,

            (state, _) => state,
        }
    }
}

impl From<AssertedState> for VoiceState {
    fn from(asserted: AssertedState) -> Self {
        match asserted {
            AssertedState::Listening => VoiceState::Listening,
            AssertedState::Thinking => VoiceState::Thinking,
            AssertedState::Speaking => VoiceState::Speaking,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use StateEvent::*;
    use VoiceState::*;

    // ---- Start requests ----------------------------------------------------

    #[test]
    fn idle_start_enters_connecting() {
        assert_eq!(Idle.apply(StartRequested), Connecting);
    }

    #[test]
    fn error_start_enters_connecting() {
        assert_eq!(Error.apply(StartRequested), Connecting);
    }

    #[test]
    fn start_is_ignored_mid_session() {
        for state in [Connecting, Listening, Thinking, Speaking] {
            assert_eq!(state.apply(StartRequested), state);
        }
    }

    // ---- Connecting --------------------------------------------------------

    #[test]
    fn connecting_success_enters_listening() {
        assert_eq!(Connecting.apply(ConnectionReady), Listening);
    }

    #[test]
    fn connecting_failure_enters_error() {
        assert_eq!(Connecting.apply(ConnectFailed), Error);
    }

    #[test]
    fn connection_ready_is_ignored_elsewhere() {
        for state in [Idle, Listening, Thinking, Speaking, Error] {
            assert_eq!(state.apply(ConnectionReady), state);
        }
    }

    // ---- Server events -----------------------------------------------------

    #[test]
    fn listening_thinking_enters_thinking() {
        assert_eq!(Listening.apply(ThinkingReceived), Thinking);
    }

    #[test]
    fn thinking_is_ignored_while_speaking() {
        assert_eq!(Speaking.apply(ThinkingReceived), Speaking);
    }

    #[test]
    fn audio_enters_speaking_from_listening_and_thinking() {
        assert_eq!(Listening.apply(AudioReceived), Speaking);
        assert_eq!(Thinking.apply(AudioReceived), Speaking);
    }

    #[test]
    fn audio_while_speaking_is_idempotent() {
        assert_eq!(Speaking.apply(AudioReceived), Speaking);
    }

    #[test]
    fn audio_is_ignored_without_a_session() {
        assert_eq!(Idle.apply(AudioReceived), Idle);
        assert_eq!(Error.apply(AudioReceived), Error);
    }

    #[test]
    fn thinking_honors_server_state_assertions() {
        assert_eq!(
            Thinking.apply(StateAsserted(AssertedState::Listening)),
            Listening
        );
        assert_eq!(
            Thinking.apply(StateAsserted(AssertedState::Speaking)),
            Speaking
        );
        assert_eq!(
            Thinking.apply(StateAsserted(AssertedState::Thinking)),
            Thinking
        );
    }

    #[test]
    fn state_assertions_are_ignored_outside_thinking() {
        for state in [Idle, Connecting, Listening, Speaking, Error] {
            assert_eq!(state.apply(StateAsserted(AssertedState::Speaking)), state);
        }
    }

    // ---- Playback drain ----------------------------------------------------

    #[test]
    fn speaking_drained_returns_to_listening() {
        assert_eq!(Speaking.apply(PlaybackDrained), Listening);
    }

    #[test]
    fn drain_is_ignored_outside_speaking() {
        for state in [Idle, Connecting, Listening, Thinking, Error] {
            assert_eq!(state.apply(PlaybackDrained), state);
        }
    }

    // ---- Errors and close --------------------------------------------------

    #[test]
    fn error_event_fails_any_active_state() {
        for state in [Connecting, Listening, Thinking, Speaking] {
            assert_eq!(state.apply(ErrorReceived), Error);
        }
    }

    #[test]
    fn error_event_is_ignored_when_inactive() {
        assert_eq!(Idle.apply(ErrorReceived), Idle);
        assert_eq!(Error.apply(ErrorReceived), Error);
    }

    #[test]
    fn close_returns_any_active_state_to_idle() {
        for state in [Connecting, Listening, Thinking, Speaking] {
            assert_eq!(state.apply(TransportClosed), Idle);
        }
    }

    #[test]
    fn close_is_ignored_when_inactive() {
        assert_eq!(Idle.apply(TransportClosed), Idle);
        assert_eq!(Error.apply(TransportClosed), Error);
    }

    // ---- Helpers -----------------------------------------------------------

    #[test]
    fn active_states_require_transport() {
        assert!(!Idle.is_active());
        assert!(Connecting.is_active());
        assert!(Listening.is_active());
        assert!(Thinking.is_active());
        assert!(Speaking.is_active());
        assert!(!Error.is_active());
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(VoiceState::default(), Idle);
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(Idle.label(), "Idle");
        assert_eq!(Connecting.label(), "Connecting");
        assert_eq!(Listening.label(), "Listening");
        assert_eq!(Thinking.label(), "Thinking");
        assert_eq!(Speaking.label(), "Speaking");
        assert_eq!(Error.label(), "Error");
    }
}
