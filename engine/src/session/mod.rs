//! Per-session state and its persistence contract
//!
//! A session is persisted as two independent JSON blobs:
//!
//! - the [`SessionState`] (turn counter, strategy history, saturation
//!   trackers, phase)
//! - the tracker snapshot (see [`crate::tracker::snapshot`])
//!
//! Keeping them apart means a tracker that fails to decode costs the tracker
//! only; the session's counters survive.

pub mod store;

pub use store::{MemorySessionStore, PersistedSession, SessionStore};

use crate::phase::Phase;
use crate::signals::SaturationTracker;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Current session snapshot format
pub const SESSION_SNAPSHOT_VERSION: u32 = 1;

/// Mutable state owned by the orchestrator for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    pub session_id: String,
    /// Number of completed turns
    pub turn: u32,
    pub previous_focus: Option<String>,
    /// Selected strategies, oldest first
    pub strategy_history: VecDeque<String>,
    pub saturation: SaturationTracker,
    pub phase: Phase,
    /// Turns in a row that ended on the fallback strategy
    pub consecutive_fallbacks: u32,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            version: SESSION_SNAPSHOT_VERSION,
            session_id: session_id.into(),
            turn: 0,
            previous_focus: None,
            strategy_history: VecDeque::new(),
            saturation: SaturationTracker::default(),
            phase: Phase::default(),
            consecutive_fallbacks: 0,
        }
    }

    /// Append a selection, keeping at most `bound` entries
    pub fn record_strategy(&mut self, strategy: &str, bound: usize) {
        self.strategy_history.push_back(strategy.to_string());
        while self.strategy_history.len() > bound.max(1) {
            self.strategy_history.pop_front();
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let state: SessionState = serde_json::from_str(json)?;
        if state.version != SESSION_SNAPSHOT_VERSION {
            return Err(EngineError::SnapshotVersion {
                found: state.version,
                expected: SESSION_SNAPSHOT_VERSION,
            });
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_bounded() {
        let mut state = SessionState::new("s1");
        for name in ["a", "b", "c", "d"] {
            state.record_strategy(name, 3);
        }
        assert_eq!(
            state.strategy_history,
            VecDeque::from(vec!["b".to_string(), "c".to_string(), "d".to_string()])
        );
    }

    #[test]
    fn test_json_restores_state() {
        let mut state = SessionState::new("s1");
        state.turn = 4;
        state.phase = Phase::Mid;
        state.record_strategy("deepen", 5);
        state.saturation.observe(3, 0.5);

        let restored = SessionState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_rejects_other_versions() {
        let mut state = SessionState::new("s1");
        state.version = 2;
        let json = serde_json::to_string(&state).unwrap();
        assert!(matches!(
            SessionState::from_json(&json),
            Err(EngineError::SnapshotVersion { found: 2, .. })
        ));
    }
}
