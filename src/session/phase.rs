//! Atomic session phase machine.
//!
//! Phases: Idle -> Listening -> Processing -> Speaking -> Listening.
//! Transitions that race with barge-in use compare-and-swap so an
//! interruption is never overwritten by a late transition. Collaborators
//! observe the phase read-only; only the session mutates it.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// No active session.
    Idle = 0,
    /// Waiting for student speech.
    Listening = 1,
    /// An utterance was accepted; the reply is being generated.
    Processing = 2,
    /// Synthesized reply audio is playing.
    Speaking = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Phase {
        match v {
            1 => Phase::Listening,
            2 => Phase::Processing,
            3 => Phase::Speaking,
            _ => Phase::Idle,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Listening => "listening",
            Phase::Processing => "processing",
            Phase::Speaking => "speaking",
        };
        write!(f, "{}", s)
    }
}

pub struct PhaseMachine {
    state: AtomicU8,
}

impl PhaseMachine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(Phase::Idle as u8),
        })
    }

    pub fn current(&self) -> Phase {
        Phase::from_u8(self.state.load(Ordering::Acquire))
    }

    /// CAS transition; returns false when the phase moved elsewhere in
    /// the meantime (e.g. a barge-in got there first).
    pub fn transition(&self, from: Phase, to: Phase) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// Unconditional transition, for paths that already own the race
    /// (barge-in, turn failure).
    pub fn force(&self, to: Phase) {
        self.state.store(to as u8, Ordering::SeqCst);
    }

    /// Back to idle on close.
    pub fn reset(&self) {
        self.force(Phase::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cas_transition_only_fires_from_expected_phase() {
        let phase = PhaseMachine::new();
        assert!(phase.transition(Phase::Idle, Phase::Listening));
        assert!(phase.transition(Phase::Listening, Phase::Processing));
        // Speaking can only follow Processing.
        assert!(!phase.transition(Phase::Listening, Phase::Speaking));
        assert!(phase.transition(Phase::Processing, Phase::Speaking));
        assert_eq!(phase.current(), Phase::Speaking);
    }

    #[test]
    fn barge_in_wins_the_first_audio_race() {
        let phase = PhaseMachine::new();
        phase.force(Phase::Processing);
        // Barge-in forces listening before the queue's first audio CAS.
        phase.force(Phase::Listening);
        assert!(!phase.transition(Phase::Processing, Phase::Speaking));
        assert_eq!(phase.current(), Phase::Listening);
    }

    #[test]
    fn phases_render_for_state_change_events() {
        assert_eq!(Phase::Idle.to_string(), "idle");
        assert_eq!(Phase::Speaking.to_string(), "speaking");
    }
}
