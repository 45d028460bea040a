//! Shared session state - one voice command session per process
//!
//! The session task owns the lifecycle; the input driver only reads the
//! current state (to decide whether typed text entry is active) and the
//! session uses the compare-and-swap transition as its exclusive capture
//! lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tracing::{debug, info};

/// Capture backend selected once by the capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Record microphone audio, upload it for server-side transcription
    ServerTranscription,
    /// Stream transcripts from the host's own speech recognizer
    NativeRecognition,
    /// No voice capture available; commands are typed
    TextFallback,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::ServerTranscription => write!(f, "server transcription"),
            CaptureMode::NativeRecognition => write!(f, "native recognition"),
            CaptureMode::TextFallback => write!(f, "text input"),
        }
    }
}

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Waiting for a listen toggle
    Idle = 0,
    /// Capturing audio or recognizer transcripts
    Listening = 1,
    /// Transcribing and executing the utterance
    Processing = 2,
    /// Response speech has been handed to synthesis
    Speaking = 3,
    /// A failure is being surfaced; transient, always returns to Idle
    Error = 4,
}

impl From<u8> for SessionState {
    fn from(v: u8) -> Self {
        match v {
            1 => SessionState::Listening,
            2 => SessionState::Processing,
            3 => SessionState::Speaking,
            4 => SessionState::Error,
            _ => SessionState::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Processing => write!(f, "Processing"),
            SessionState::Speaking => write!(f, "Speaking"),
            SessionState::Error => write!(f, "Error"),
        }
    }
}

/// Runtime state shared between the session task and the input driver
pub struct RuntimeState {
    /// Current session state (stored as u8)
    state: AtomicU8,
    /// Text-entry fallback affordance is active
    pub fallback_enabled: AtomicBool,
}

impl RuntimeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(SessionState::Idle as u8),
            fallback_enabled: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, next: SessionState) {
        let prev = SessionState::from(self.state.swap(next as u8, Ordering::SeqCst));
        if prev != next {
            info!(from = %prev, to = %next, "state transition");
        }
    }

    /// Exclusive capture lock: only an Idle session may begin listening.
    /// Returns false without side effects when a capture is already active.
    pub fn try_begin_listening(&self) -> bool {
        let ok = self
            .state
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Listening as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if ok {
            info!(from = %SessionState::Idle, to = %SessionState::Listening, "state transition");
        } else {
            debug!(state = %self.state(), "listen toggle rejected, capture already active");
        }
        ok
    }

    pub fn enable_fallback(&self) {
        self.fallback_enabled.store(true, Ordering::SeqCst);
    }

    pub fn fallback_active(&self) -> bool {
        self.fallback_enabled.load(Ordering::SeqCst)
    }
}

/// Type alias for shared state
pub type SharedState = Arc<RuntimeState>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = RuntimeState::new();
        assert_eq!(state.state(), SessionState::Idle);
        assert!(!state.fallback_active());
    }

    #[test]
    fn test_begin_listening_only_from_idle() {
        let state = RuntimeState::new();
        assert!(state.try_begin_listening());
        assert_eq!(state.state(), SessionState::Listening);

        // a second capture must not start
        assert!(!state.try_begin_listening());
        assert_eq!(state.state(), SessionState::Listening);

        state.set_state(SessionState::Processing);
        assert!(!state.try_begin_listening());
        assert_eq!(state.state(), SessionState::Processing);

        state.set_state(SessionState::Idle);
        assert!(state.try_begin_listening());
    }

    #[test]
    fn test_state_round_trip() {
        for s in [
            SessionState::Idle,
            SessionState::Listening,
            SessionState::Processing,
            SessionState::Speaking,
            SessionState::Error,
        ] {
            assert_eq!(SessionState::from(s as u8), s);
        }
    }
}
