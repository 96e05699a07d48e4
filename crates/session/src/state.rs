//! Session state machine (spec §4.10). `SessionState` names the five live
//! states plus the terminal `Closed`; `SessionEvent` names the transitions
//! the orchestrator drives it through. `next_state` is a pure function so
//! the table itself is unit-testable without spinning up any I/O.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Generating,
    Speaking,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    AudioStart,
    AudioChunk,
    AudioEnd,
    SttFinal,
    SttEmpty,
    FirstTtsAudioReady,
    MainStreamEndAndTtsDrained,
    FatalError,
    SocketClose,
}

/// Returns the next state for `(state, event)`, or `None` if the event is
/// not valid from that state (the caller should treat that as a protocol
/// violation, not silently ignore it — except where the table allows the
/// event to be a no-op, which is spelled out explicitly below).
pub fn next_state(state: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent::*;
    use SessionState::*;

    match (state, event) {
        (_, SocketClose) => Some(Closed),
        (_, FatalError) => Some(Idle),

        (Idle, AudioStart) => Some(Listening),

        (Listening, AudioChunk) => Some(Listening),
        (Listening, AudioEnd) => Some(Processing),
        (Listening, AudioStart) => Some(Listening),

        (Processing, SttFinal) => Some(Generating),
        (Processing, SttEmpty) => Some(Idle),

        (Generating, FirstTtsAudioReady) => Some(Speaking),
        (Generating, AudioStart) => Some(Listening),

        (Speaking, MainStreamEndAndTtsDrained) => Some(Idle),
        (Speaking, AudioStart) => Some(Listening),

        _ => None,
    }
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent::*;
    use SessionState::*;

    #[test]
    fn happy_path_cycle_returns_to_idle() {
        let mut s = Idle;
        for event in [AudioStart, AudioChunk, AudioEnd, SttFinal, FirstTtsAudioReady, MainStreamEndAndTtsDrained] {
            s = next_state(s, event).expect("valid transition");
        }
        assert_eq!(s, Idle);
    }

    #[test]
    fn empty_utterance_returns_directly_to_idle() {
        let s = next_state(Processing, SttEmpty).unwrap();
        assert_eq!(s, Idle);
    }

    #[test]
    fn barge_in_during_generating_or_speaking_goes_to_listening() {
        assert_eq!(next_state(Generating, AudioStart), Some(Listening));
        assert_eq!(next_state(Speaking, AudioStart), Some(Listening));
    }

    #[test]
    fn barge_in_during_capture_discards_old_buffer_but_stays_listening() {
        assert_eq!(next_state(Listening, AudioStart), Some(Listening));
    }

    #[test]
    fn fatal_error_always_returns_to_idle() {
        for state in [Idle, Listening, Processing, Generating, Speaking] {
            assert_eq!(next_state(state, FatalError), Some(Idle));
        }
    }

    #[test]
    fn socket_close_is_terminal_from_any_state() {
        for state in [Idle, Listening, Processing, Generating, Speaking] {
            assert_eq!(next_state(state, SocketClose), Some(Closed));
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        assert_eq!(next_state(Idle, SttFinal), None);
        assert_eq!(next_state(Idle, AudioEnd), None);
        assert_eq!(next_state(Speaking, SttFinal), None);
    }
}
