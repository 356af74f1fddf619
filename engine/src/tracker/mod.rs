//! Concept State Tracker
//!
//! Durable per-concept record of engagement, yield and response history.
//! The tracker is mutated by graph events (registration, edge counts, yield)
//! and by focus changes, and is persisted between turns as a versioned
//! snapshot.
//!
//! Mutation rules:
//!
//! - `current_focus_streak` is only ever changed by [`ConceptTracker::set_focus`]
//! - `turns_since_last_yield` is reset by [`ConceptTracker::record_yield`] and
//!   ticked once per turn for every concept other than the new focus
//! - `yield_rate` always equals `yield_count / max(focus_count, 1)`

pub mod snapshot;

pub use snapshot::{TrackerSnapshot, TRACKER_SNAPSHOT_VERSION};

use sdk::errors::EngineError;
use sdk::types::{Concept, ResponseDepth};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Graph growth credited to a concept in one turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldChanges {
    pub concepts_added: u32,
    pub edges_added: u32,
}

impl YieldChanges {
    pub fn is_empty(&self) -> bool {
        self.concepts_added == 0 && self.edges_added == 0
    }
}

/// Tracked state for a single concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptState {
    pub concept_id: String,
    pub label: String,
    #[serde(default)]
    pub concept_type: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub created_turn: u32,
    #[serde(default)]
    pub terminal: bool,

    pub focus_count: u32,
    pub last_focus_turn: Option<u32>,
    pub current_focus_streak: u32,
    pub turns_since_last_focus: u32,

    pub last_yield_turn: Option<u32>,
    pub turns_since_last_yield: u32,
    pub yield_count: u32,
    pub yield_rate: f64,

    pub response_depths: VecDeque<ResponseDepth>,

    pub edges_out: u32,
    pub edges_in: u32,

    pub technique_counts: BTreeMap<String, u32>,
    pub last_technique: Option<String>,
    pub consecutive_same_technique: u32,
}

impl ConceptState {
    fn new(concept: &Concept) -> Self {
        Self {
            concept_id: concept.id.clone(),
            label: concept.label.clone(),
            concept_type: concept.concept_type.clone(),
            depth: concept.depth,
            created_turn: concept.created_turn,
            terminal: concept.terminal,
            focus_count: 0,
            last_focus_turn: None,
            current_focus_streak: 0,
            turns_since_last_focus: 0,
            last_yield_turn: None,
            turns_since_last_yield: 0,
            yield_count: 0,
            yield_rate: 0.0,
            response_depths: VecDeque::new(),
            edges_out: 0,
            edges_in: 0,
            technique_counts: BTreeMap::new(),
            last_technique: None,
            consecutive_same_technique: 0,
        }
    }

    pub fn edge_count(&self) -> u32 {
        self.edges_out + self.edges_in
    }

    pub fn is_orphan(&self) -> bool {
        self.edge_count() == 0
    }

    /// The last `n` response-depth entries, oldest first
    pub fn recent_depths(&self, n: usize) -> impl Iterator<Item = &ResponseDepth> {
        let skip = self.response_depths.len().saturating_sub(n);
        self.response_depths.iter().skip(skip)
    }

    fn recompute_yield_rate(&mut self) {
        self.yield_rate = self.yield_count as f64 / self.focus_count.max(1) as f64;
    }
}

/// Owner of every [`ConceptState`] in a session
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptTracker {
    states: BTreeMap<String, ConceptState>,
    previous_focus: Option<String>,
    depth_history_len: usize,
}

impl ConceptTracker {
    /// Create an empty tracker with the given response-depth history bound
    pub fn new(depth_history_len: usize) -> Self {
        Self {
            states: BTreeMap::new(),
            previous_focus: None,
            depth_history_len: depth_history_len.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, concept_id: &str) -> bool {
        self.states.contains_key(concept_id)
    }

    pub fn get(&self, concept_id: &str) -> Option<&ConceptState> {
        self.states.get(concept_id)
    }

    /// Tracked states in id order
    pub fn states(&self) -> impl Iterator<Item = &ConceptState> {
        self.states.values()
    }

    pub fn concept_ids(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Focus concept chosen on the previous turn
    pub fn previous_focus(&self) -> Option<&str> {
        self.previous_focus.as_deref()
    }

    pub fn depth_history_len(&self) -> usize {
        self.depth_history_len
    }

    /// Start tracking a concept. Returns `false` if it was already tracked,
    /// in which case nothing changes.
    pub fn register(&mut self, concept: &Concept) -> bool {
        if self.states.contains_key(&concept.id) {
            return false;
        }
        debug!("Registering concept {} ({})", concept.id, concept.label);
        self.states
            .insert(concept.id.clone(), ConceptState::new(concept));
        true
    }

    /// Apply signed deltas to a concept's outgoing/incoming edge counts.
    /// Counts saturate at zero.
    pub fn update_edge_counts(
        &mut self,
        concept_id: &str,
        delta_out: i64,
        delta_in: i64,
    ) -> Result<(), EngineError> {
        let state = self.state_mut(concept_id)?;
        state.edges_out = apply_delta(state.edges_out, delta_out);
        state.edges_in = apply_delta(state.edges_in, delta_in);
        Ok(())
    }

    /// Credit a yield to a concept.
    ///
    /// Never touches `current_focus_streak`.
    pub fn record_yield(
        &mut self,
        concept_id: &str,
        turn: u32,
        changes: YieldChanges,
    ) -> Result<(), EngineError> {
        let state = self.state_mut(concept_id)?;
        state.yield_count += 1;
        state.recompute_yield_rate();
        state.last_yield_turn = Some(turn);
        state.turns_since_last_yield = 0;
        debug!(
            "Yield credited to {} on turn {} (+{} concepts, +{} edges, rate {:.2})",
            concept_id, turn, changes.concepts_added, changes.edges_added, state.yield_rate
        );
        Ok(())
    }

    /// Append a response depth to a concept's bounded history.
    ///
    /// The orchestrator passes the previous turn's focus concept here, before
    /// calling [`set_focus`](Self::set_focus) for the new one.
    pub fn append_response_depth(
        &mut self,
        concept_id: &str,
        depth: ResponseDepth,
    ) -> Result<(), EngineError> {
        let bound = self.depth_history_len;
        let state = self.state_mut(concept_id)?;
        state.response_depths.push_back(depth);
        while state.response_depths.len() > bound {
            state.response_depths.pop_front();
        }
        Ok(())
    }

    /// Move the focus to `concept_id` for `turn`, using `technique`.
    ///
    /// The focus concept's streak restarts at 1 when it differs from the
    /// previous focus and grows by one otherwise. Every other tracked concept
    /// gets one tick of `turns_since_last_focus` and `turns_since_last_yield`.
    pub fn set_focus(
        &mut self,
        concept_id: &str,
        technique: &str,
        turn: u32,
    ) -> Result<(), EngineError> {
        if !self.states.contains_key(concept_id) {
            return Err(EngineError::UnknownConcept(concept_id.to_string()));
        }
        let changed = self.previous_focus.as_deref() != Some(concept_id);

        for (id, state) in self.states.iter_mut() {
            if id == concept_id {
                state.focus_count += 1;
                state.last_focus_turn = Some(turn);
                state.current_focus_streak = if changed {
                    1
                } else {
                    state.current_focus_streak + 1
                };
                state.turns_since_last_focus = 0;
                *state
                    .technique_counts
                    .entry(technique.to_string())
                    .or_insert(0) += 1;
                state.consecutive_same_technique =
                    if state.last_technique.as_deref() == Some(technique) {
                        state.consecutive_same_technique + 1
                    } else {
                        1
                    };
                state.last_technique = Some(technique.to_string());
                state.recompute_yield_rate();
            } else {
                state.turns_since_last_focus += 1;
                state.turns_since_last_yield += 1;
            }
        }

        debug!(
            "Focus set to {} on turn {} (changed: {}, technique: {})",
            concept_id, turn, changed, technique
        );
        self.previous_focus = Some(concept_id.to_string());
        Ok(())
    }

    fn state_mut(&mut self, concept_id: &str) -> Result<&mut ConceptState, EngineError> {
        self.states
            .get_mut(concept_id)
            .ok_or_else(|| EngineError::UnknownConcept(concept_id.to_string()))
    }
}

fn apply_delta(count: u32, delta: i64) -> u32 {
    (count as i64 + delta).clamp(0, u32::MAX as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with(ids: &[&str]) -> ConceptTracker {
        let mut tracker = ConceptTracker::new(5);
        for id in ids {
            tracker.register(&Concept::new(*id, *id));
        }
        tracker
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut tracker = tracker_with(&["a"]);
        tracker.set_focus("a", "laddering", 1).unwrap();
        let before = tracker.get("a").cloned().unwrap();

        assert!(!tracker.register(&Concept::new("a", "renamed")));
        assert_eq!(tracker.get("a"), Some(&before));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_unknown_concept_is_an_error() {
        let mut tracker = tracker_with(&[]);
        assert!(matches!(
            tracker.set_focus("ghost", "laddering", 1),
            Err(EngineError::UnknownConcept(_))
        ));
        assert!(tracker.update_edge_counts("ghost", 1, 0).is_err());
    }

    #[test]
    fn test_edge_counts_saturate_at_zero() {
        let mut tracker = tracker_with(&["a"]);
        tracker.update_edge_counts("a", 2, 1).unwrap();
        tracker.update_edge_counts("a", -5, 0).unwrap();
        let state = tracker.get("a").unwrap();
        assert_eq!(state.edges_out, 0);
        assert_eq!(state.edges_in, 1);
    }

    #[test]
    fn test_streak_rules() {
        let mut tracker = tracker_with(&["a", "b"]);
        tracker.set_focus("a", "laddering", 1).unwrap();
        tracker.set_focus("a", "laddering", 2).unwrap();
        assert_eq!(tracker.get("a").unwrap().current_focus_streak, 2);

        tracker.set_focus("b", "probing", 3).unwrap();
        assert_eq!(tracker.get("b").unwrap().current_focus_streak, 1);
        // a keeps its old streak until it is focused again
        assert_eq!(tracker.get("a").unwrap().current_focus_streak, 2);

        tracker.set_focus("a", "laddering", 4).unwrap();
        assert_eq!(tracker.get("a").unwrap().current_focus_streak, 1);
    }

    #[test]
    fn test_record_yield_leaves_streak_alone() {
        let mut tracker = tracker_with(&["a"]);
        tracker.set_focus("a", "laddering", 1).unwrap();
        tracker.set_focus("a", "laddering", 2).unwrap();
        tracker
            .record_yield("a", 3, YieldChanges { concepts_added: 2, edges_added: 1 })
            .unwrap();

        let state = tracker.get("a").unwrap();
        assert_eq!(state.current_focus_streak, 2);
        assert_eq!(state.turns_since_last_yield, 0);
        assert_eq!(state.last_yield_turn, Some(3));
        assert!((state.yield_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_global_tick_skips_new_focus() {
        let mut tracker = tracker_with(&["a", "b", "c"]);
        tracker.record_yield("b", 1, YieldChanges::default()).unwrap();
        tracker.set_focus("b", "laddering", 1).unwrap();

        assert_eq!(tracker.get("a").unwrap().turns_since_last_yield, 1);
        assert_eq!(tracker.get("c").unwrap().turns_since_last_yield, 1);
        assert_eq!(tracker.get("b").unwrap().turns_since_last_yield, 0);
        assert_eq!(tracker.get("a").unwrap().turns_since_last_focus, 1);
    }

    #[test]
    fn test_response_depth_history_is_bounded() {
        let mut tracker = ConceptTracker::new(2);
        tracker.register(&Concept::new("a", "a"));
        tracker
            .append_response_depth("a", ResponseDepth::Deep)
            .unwrap();
        tracker
            .append_response_depth("a", ResponseDepth::Shallow)
            .unwrap();
        tracker
            .append_response_depth("a", ResponseDepth::Moderate)
            .unwrap();

        let depths: Vec<_> = tracker.get("a").unwrap().response_depths.iter().copied().collect();
        assert_eq!(depths, vec![ResponseDepth::Shallow, ResponseDepth::Moderate]);
    }

    #[test]
    fn test_technique_usage() {
        let mut tracker = tracker_with(&["a"]);
        tracker.set_focus("a", "laddering", 1).unwrap();
        tracker.set_focus("a", "laddering", 2).unwrap();
        tracker.set_focus("a", "probing", 3).unwrap();

        let state = tracker.get("a").unwrap();
        assert_eq!(state.technique_counts.get("laddering"), Some(&2));
        assert_eq!(state.technique_counts.get("probing"), Some(&1));
        assert_eq!(state.consecutive_same_technique, 1);
        assert_eq!(state.last_technique.as_deref(), Some("probing"));
    }

    #[test]
    fn test_previous_focus_pointer() {
        let mut tracker = tracker_with(&["a", "b"]);
        assert_eq!(tracker.previous_focus(), None);
        tracker.set_focus("b", "probing", 1).unwrap();
        assert_eq!(tracker.previous_focus(), Some("b"));
    }
}
