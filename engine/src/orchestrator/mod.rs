//! Turn Orchestrator
//!
//! Runs one turn of a session in a fixed order:
//!
//! 1. Load the persisted session and tracker
//! 2. Apply graph mutations (register, edge counts, yield to previous focus)
//! 3. Recompute graph aggregates, saturation and phase
//! 4. Detect signals: global and response quality concurrently, then
//!    strategy, node, and meta signals last
//! 5. Rank and select; append the response depth to the previous focus,
//!    then move the focus
//! 6. Decide whether the conversation continues
//! 7. Persist session and tracker
//!
//! Turns of one session are serialized through a per-session lock. Different
//! sessions share nothing and run in parallel.
//!
//! Degraded paths (no concepts yet, no positive candidate, quality detector
//! failure, unreadable snapshots) never fail the turn. They are collected on
//! [`TurnOutcome::degradations`].

pub mod focus;
pub mod mutations;

pub use mutations::{apply_graph_mutations, MutationSummary};

use crate::config::Config;
use crate::graph::GraphAggregates;
use crate::phase::{Phase, PhaseDetector};
use crate::scoring::{self, FallbackReason, Ranking, StrategyDefinition};
use crate::session::{PersistedSession, SessionState, SessionStore};
use crate::signals::{
    assess_with_timeout, DetectorSet, GlobalInputs, NodeInputs, SaturationReading, SignalMap,
    SignalSnapshot, StrategyInputs,
};
use crate::tracker::ConceptTracker;
use anyhow::{Context, Result};
use sdk::errors::EngineError;
use sdk::quality::ResponseQualityDetector;
use sdk::types::GraphSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};

/// Everything the collaborators hand over for one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub graph: GraphSnapshot,
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub preceding_question: String,
}

/// A degraded path taken during a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Degradation {
    /// No concept tracked yet; the fallback strategy was used
    #[error("no tracked concepts, used fallback")]
    NoTrackedConcepts,
    /// Ranking produced no candidate; the fallback strategy was used
    #[error("empty candidate set, used fallback")]
    EmptyCandidateSet,
    /// The best candidate scored zero or below; the fallback strategy was used
    #[error("no positive candidate, used fallback")]
    NoPositiveCandidate,
    /// The quality detector failed; neutral scores were used
    #[error("quality detector failed: {0}")]
    QualityDetectorFailed(String),
    /// The quality detector timed out (ms); neutral scores were used
    #[error("quality detector timed out after {0}ms")]
    QualityDetectorTimedOut(u64),
    /// The tracker snapshot could not be restored; started empty
    #[error("tracker restore failed: {0}")]
    SnapshotRestoreFailed(String),
    /// The session state could not be restored; started fresh
    #[error("session restore failed: {0}")]
    SessionRestoreFailed(String),
    /// The focus preference named nothing; the newest concept was used
    #[error("focus preference unresolved")]
    FocusUnresolved,
}

impl From<FallbackReason> for Degradation {
    fn from(reason: FallbackReason) -> Self {
        match reason {
            FallbackReason::NoTrackedConcepts => Degradation::NoTrackedConcepts,
            FallbackReason::EmptyCandidateSet => Degradation::EmptyCandidateSet,
            FallbackReason::NoPositiveCandidate => Degradation::NoPositiveCandidate,
        }
    }
}

/// Why the conversation should end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TurnLimit,
    Saturated,
    NoViableCandidate,
}

/// Continuation decision for the next turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Continuation {
    Continue,
    Stop(StopReason),
}

impl Continuation {
    pub fn should_continue(&self) -> bool {
        matches!(self, Continuation::Continue)
    }
}

/// Decision and full decomposition for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub turn: u32,
    pub strategy: String,
    pub technique: String,
    pub focus_concept: Option<String>,
    pub phase: Phase,
    pub saturation: SaturationReading,
    pub continuation: Continuation,
    pub degradations: Vec<Degradation>,
    pub ranking: Ranking,
    pub signals: SignalSnapshot,
}

/// Session and tracker as restored at the start of a turn
#[derive(Debug)]
pub struct RestoredSession {
    pub session: SessionState,
    pub tracker: ConceptTracker,
    pub degradations: Vec<Degradation>,
}

/// Decode persisted blobs, replacing whatever fails with a fresh value
pub fn restore_session(
    session_id: &str,
    persisted: Option<PersistedSession>,
    depth_history_len: usize,
) -> RestoredSession {
    let Some(persisted) = persisted else {
        return RestoredSession {
            session: SessionState::new(session_id),
            tracker: ConceptTracker::new(depth_history_len),
            degradations: Vec::new(),
        };
    };

    let mut degradations = Vec::new();
    let session = match SessionState::from_json(&persisted.session_json) {
        Ok(session) => session,
        Err(e) => {
            warn!("Session state unreadable, starting fresh: {}", e);
            degradations.push(Degradation::SessionRestoreFailed(e.to_string()));
            SessionState::new(session_id)
        }
    };
    let (tracker, error) = ConceptTracker::restore_or_empty(&persisted.tracker_json, depth_history_len);
    if let Some(e) = error {
        degradations.push(Degradation::SnapshotRestoreFailed(e.to_string()));
    }

    RestoredSession {
        session,
        tracker,
        degradations,
    }
}

/// Sequences every component for each turn of every session
pub struct TurnOrchestrator {
    config: Arc<Config>,
    strategies: Vec<StrategyDefinition>,
    detectors: DetectorSet,
    store: Arc<dyn SessionStore>,
    quality: Arc<dyn ResponseQualityDetector>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnOrchestrator {
    /// Compile strategies and resolve the active detectors once
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn SessionStore>,
        quality: Arc<dyn ResponseQualityDetector>,
    ) -> Self {
        let strategies = scoring::compile_strategies(&config.strategies);
        let detectors = DetectorSet::resolve(&config.signals.active);
        info!(
            "Orchestrator ready: {} strategies, {} detectors, {} ranking",
            strategies.len(),
            detectors.len(),
            config.session.ranking_policy
        );
        Self {
            config,
            strategies,
            detectors,
            store,
            quality,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategies(&self) -> &[StrategyDefinition] {
        &self.strategies
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Drop the map entry once no other turn holds or waits on it.
    ///
    /// Clones are only handed out under the map lock, so a count of two
    /// (the map and `lock`) means nobody else is queued.
    async fn release_session_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    /// Run one turn for `session_id`.
    ///
    /// Calls for the same session queue behind each other.
    pub async fn run_turn(&self, session_id: &str, input: TurnInput) -> Result<TurnOutcome> {
        let lock = self.session_lock(session_id).await;
        let result = {
            let _guard = lock.lock().await;
            let span = info_span!("turn", session = %session_id, turn = tracing::field::Empty);
            self.execute(session_id, input).instrument(span).await
        };
        self.release_session_lock(session_id, lock).await;
        result
    }

    #[cfg(test)]
    async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    async fn execute(&self, session_id: &str, input: TurnInput) -> Result<TurnOutcome> {
        let cfg = self.config.as_ref();

        // 1. load
        let persisted = self
            .store
            .load(session_id)
            .await
            .with_context(|| format!("Failed to load session {}", session_id))?;
        let RestoredSession {
            mut session,
            mut tracker,
            mut degradations,
        } = restore_session(session_id, persisted, cfg.session.response_depth_history_len);

        session.turn += 1;
        let turn = session.turn;
        tracing::Span::current().record("turn", turn);
        info!("Turn {} started", turn);

        // 2-3. graph mutations, aggregates, saturation, phase
        let aggregates = GraphAggregates::compute(&input.graph);
        apply_graph_mutations(&mut tracker, &input.graph, &aggregates, turn)?;

        let saturation = session.saturation.update(
            aggregates.concept_count,
            aggregates.edge_density,
            turn,
            &cfg.signals,
        );
        session.phase = PhaseDetector::new(&cfg.phases).advance(
            session.phase,
            aggregates.concept_count,
            saturation.score,
        );

        // 4. signals
        let global_inputs = GlobalInputs {
            aggregates: &aggregates,
            phase: session.phase,
            saturation: &saturation,
            settings: &cfg.signals,
        };
        let (mut global, quality) = tokio::join!(
            async { self.detectors.detect_global(&global_inputs) },
            assess_with_timeout(
                self.quality.as_ref(),
                &input.response_text,
                &input.preceding_question,
                cfg.session.quality_timeout_ms,
            ),
        );
        match quality.error {
            Some(EngineError::QualityTimeout(ms)) => {
                degradations.push(Degradation::QualityDetectorTimedOut(ms))
            }
            Some(e) => degradations.push(Degradation::QualityDetectorFailed(e.to_string())),
            None => {}
        }
        self.detectors.detect_quality(&quality.assessment, &mut global);

        let strategies: BTreeMap<String, SignalMap> = self
            .strategies
            .iter()
            .map(|s| {
                let inputs = StrategyInputs {
                    strategy: &s.name,
                    history: &session.strategy_history,
                    settings: &cfg.signals,
                };
                (s.name.clone(), self.detectors.detect_strategy(&inputs))
            })
            .collect();

        let current_focus = tracker.previous_focus();
        let nodes: BTreeMap<String, SignalMap> = tracker
            .states()
            .map(|state| {
                let inputs = NodeInputs {
                    state,
                    current_focus,
                    settings: &cfg.signals,
                };
                (state.concept_id.clone(), self.detectors.detect_node(&inputs))
            })
            .collect();

        self.detectors.detect_meta(&global_inputs, &mut global);
        let signals = SignalSnapshot {
            global,
            strategies,
            nodes,
        };

        // 5. rank, select, then depth before focus
        let ranking = scoring::rank(
            cfg.session.ranking_policy,
            &self.strategies,
            &signals,
            cfg.phases.for_phase(session.phase),
            &cfg.session.fallback_strategy,
        )?;
        let selection = &ranking.selection;
        if let Some(reason) = selection.fallback {
            degradations.push(reason.into());
        }

        let focus_concept = match &selection.concept_id {
            Some(id) => Some(id.clone()),
            None => {
                let preference = self
                    .strategies
                    .iter()
                    .find(|s| s.name == selection.strategy)
                    .map(|s| s.focus_preference)
                    .unwrap_or_default();
                let (focus, fell_back) = focus::resolve(&tracker, preference);
                if fell_back {
                    degradations.push(Degradation::FocusUnresolved);
                }
                focus
            }
        };

        if let Some(previous) = tracker.previous_focus().map(str::to_string) {
            tracker.append_response_depth(&previous, quality.assessment.depth_bucket)?;
        }
        if let Some(id) = &focus_concept {
            tracker.set_focus(id, &selection.technique, turn)?;
        }

        session.previous_focus = tracker.previous_focus().map(str::to_string);
        session.record_strategy(&selection.strategy, cfg.session.strategy_history_len);
        session.consecutive_fallbacks = if selection.fallback.is_some() {
            session.consecutive_fallbacks + 1
        } else {
            0
        };

        // 6. continuation
        let continuation = if turn >= cfg.session.max_turns {
            Continuation::Stop(StopReason::TurnLimit)
        } else if saturation.score >= cfg.session.saturation_stop_threshold {
            Continuation::Stop(StopReason::Saturated)
        } else if session.consecutive_fallbacks >= cfg.session.max_consecutive_fallbacks {
            Continuation::Stop(StopReason::NoViableCandidate)
        } else {
            Continuation::Continue
        };

        // 7. persist
        let blobs = PersistedSession {
            turn,
            session_json: session.to_json()?,
            tracker_json: tracker.to_json()?,
        };
        self.store
            .save(session_id, &blobs)
            .await
            .with_context(|| format!("Failed to save session {}", session_id))?;

        for degradation in &degradations {
            warn!("Degraded: {}", degradation);
        }
        info!(
            "Turn {} selected {} ({}) focus {:?}, phase {}, saturation {:.2}",
            turn,
            selection.strategy,
            selection.technique,
            focus_concept,
            session.phase,
            saturation.score
        );

        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            turn,
            strategy: selection.strategy.clone(),
            technique: selection.technique.clone(),
            focus_concept,
            phase: session.phase,
            saturation,
            continuation,
            degradations,
            ranking,
            signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::signals::HeuristicQualityDetector;

    #[test]
    fn test_degradation_wire_format() {
        let json = serde_json::to_string(&Degradation::QualityDetectorTimedOut(50)).unwrap();
        assert_eq!(json, r#"{"kind":"quality_detector_timed_out","detail":50}"#);
        let json = serde_json::to_string(&Degradation::NoTrackedConcepts).unwrap();
        assert_eq!(json, r#"{"kind":"no_tracked_concepts"}"#);
    }

    #[test]
    fn test_degradation_messages() {
        assert_eq!(
            Degradation::QualityDetectorTimedOut(50).to_string(),
            "quality detector timed out after 50ms"
        );
        assert_eq!(
            Degradation::SessionRestoreFailed("bad json".to_string()).to_string(),
            "session restore failed: bad json"
        );
    }

    fn engine() -> TurnOrchestrator {
        TurnOrchestrator::new(
            Arc::new(Config::default_config()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(HeuristicQualityDetector::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_session_locks_are_released_after_turns() {
        let engine = engine();
        for id in ["s1", "s2", "s3"] {
            engine.run_turn(id, TurnInput::default()).await.unwrap();
        }
        assert_eq!(engine.tracked_locks().await, 0);
    }

    #[tokio::test]
    async fn test_session_locks_are_released_after_queued_turns() {
        let engine = engine();
        let (a, b, c) = tokio::join!(
            engine.run_turn("s1", TurnInput::default()),
            engine.run_turn("s1", TurnInput::default()),
            engine.run_turn("s2", TurnInput::default()),
        );
        let mut turns = vec![a.unwrap().turn, b.unwrap().turn];
        turns.sort_unstable();
        assert_eq!(turns, vec![1, 2]);
        assert_eq!(c.unwrap().turn, 1);
        assert_eq!(engine.tracked_locks().await, 0);
    }

    #[test]
    fn test_restore_missing_session_is_fresh() {
        let restored = restore_session("s1", None, 5);
        assert_eq!(restored.session.turn, 0);
        assert!(restored.tracker.is_empty());
        assert!(restored.degradations.is_empty());
    }

    #[test]
    fn test_restore_keeps_session_when_tracker_is_corrupt() {
        let mut session = SessionState::new("s1");
        session.turn = 7;
        let persisted = PersistedSession {
            turn: 7,
            session_json: session.to_json().unwrap(),
            tracker_json: "garbage".to_string(),
        };
        let restored = restore_session("s1", Some(persisted), 5);
        assert_eq!(restored.session.turn, 7);
        assert!(restored.tracker.is_empty());
        assert!(matches!(
            restored.degradations.as_slice(),
            [Degradation::SnapshotRestoreFailed(_)]
        ));
    }
}
