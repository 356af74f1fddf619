//! Versioned tracker snapshots
//!
//! The tracker crosses turn boundaries as JSON. A snapshot that fails to
//! decode, or carries another version, is replaced by an empty tracker; the
//! caller records the failure as a degradation.

use super::{ConceptState, ConceptTracker};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Current tracker snapshot format
pub const TRACKER_SNAPSHOT_VERSION: u32 = 1;

/// Serializable form of a [`ConceptTracker`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub version: u32,
    pub depth_history_len: usize,
    pub previous_focus: Option<String>,
    pub states: Vec<ConceptState>,
}

impl ConceptTracker {
    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            version: TRACKER_SNAPSHOT_VERSION,
            depth_history_len: self.depth_history_len,
            previous_focus: self.previous_focus.clone(),
            states: self.states.values().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: TrackerSnapshot) -> Result<Self, EngineError> {
        if snapshot.version != TRACKER_SNAPSHOT_VERSION {
            return Err(EngineError::SnapshotVersion {
                found: snapshot.version,
                expected: TRACKER_SNAPSHOT_VERSION,
            });
        }
        if let Some(focus) = &snapshot.previous_focus {
            if !snapshot.states.iter().any(|s| &s.concept_id == focus) {
                return Err(EngineError::Snapshot(format!(
                    "previous focus {} is not a tracked concept",
                    focus
                )));
            }
        }

        let mut tracker = ConceptTracker::new(snapshot.depth_history_len);
        tracker.previous_focus = snapshot.previous_focus;
        for state in snapshot.states {
            tracker.states.insert(state.concept_id.clone(), state);
        }
        Ok(tracker)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let snapshot: TrackerSnapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    /// Decode a persisted tracker, falling back to an empty one.
    ///
    /// The error, if any, is returned alongside so the caller can surface it.
    pub fn restore_or_empty(
        json: &str,
        depth_history_len: usize,
    ) -> (Self, Option<EngineError>) {
        match Self::from_json(json) {
            Ok(mut tracker) => {
                let bound = depth_history_len.max(1);
                tracker.depth_history_len = bound;
                // the bound may have shrunk since the snapshot was written
                for state in tracker.states.values_mut() {
                    let excess = state.response_depths.len().saturating_sub(bound);
                    state.response_depths.drain(..excess);
                }
                (tracker, None)
            }
            Err(e) => {
                warn!("Tracker snapshot unreadable, starting empty: {}", e);
                (Self::new(depth_history_len), Some(e))
            }
        }
    }
}
