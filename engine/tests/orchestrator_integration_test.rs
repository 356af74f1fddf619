//! Integration tests for the turn orchestrator
//!
//! Drives whole turns through an in-memory session store with stub quality
//! detectors, then checks the decision and what was persisted.

use async_trait::async_trait;
use elicit_engine::config::Config;
use elicit_engine::orchestrator::{
    restore_session, Continuation, Degradation, StopReason, TurnInput, TurnOrchestrator,
};
use elicit_engine::scoring::RankingPolicy;
use elicit_engine::session::{MemorySessionStore, PersistedSession, SessionState, SessionStore};
use sdk::errors::EngineError;
use sdk::quality::{QualityAssessment, ResponseQualityDetector};
use sdk::types::{Concept, ConceptEdge, GraphSnapshot, ResponseDepth};
use std::sync::Arc;
use std::time::Duration;

struct FixedDetector(QualityAssessment);

#[async_trait]
impl ResponseQualityDetector for FixedDetector {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn assess(&self, _response: &str, _question: &str) -> Result<QualityAssessment, EngineError> {
        Ok(self.0.clone())
    }
}

struct SlowDetector;

#[async_trait]
impl ResponseQualityDetector for SlowDetector {
    fn name(&self) -> &str {
        "slow"
    }

    async fn assess(&self, _response: &str, _question: &str) -> Result<QualityAssessment, EngineError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(QualityAssessment::neutral())
    }
}

struct FailingDetector;

#[async_trait]
impl ResponseQualityDetector for FailingDetector {
    fn name(&self) -> &str {
        "failing"
    }

    async fn assess(&self, _response: &str, _question: &str) -> Result<QualityAssessment, EngineError> {
        Err(EngineError::QualityDetector("model unavailable".to_string()))
    }
}

fn shallow() -> QualityAssessment {
    QualityAssessment {
        depth: 0.2,
        depth_bucket: ResponseDepth::Shallow,
        ..QualityAssessment::neutral()
    }
}

fn orchestrator_with(
    config: Config,
    store: Arc<MemorySessionStore>,
    quality: Arc<dyn ResponseQualityDetector>,
) -> TurnOrchestrator {
    TurnOrchestrator::new(Arc::new(config), store, quality)
}

fn orchestrator(store: Arc<MemorySessionStore>) -> TurnOrchestrator {
    orchestrator_with(
        Config::default_config(),
        store,
        Arc::new(FixedDetector(shallow())),
    )
}

fn turn(concepts: &[&str], edges: &[(&str, &str)]) -> TurnInput {
    TurnInput {
        graph: GraphSnapshot::new(
            concepts.iter().map(|id| Concept::new(*id, *id)).collect(),
            edges.iter().map(|(s, t)| ConceptEdge::new(*s, *t)).collect(),
        ),
        response_text: "It is fine I guess.".to_string(),
        preceding_question: "What do you like about it?".to_string(),
    }
}

async fn stored(store: &MemorySessionStore, session_id: &str) -> PersistedSession {
    store.load(session_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_first_turn_without_concepts_falls_back() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator(Arc::clone(&store));

    let outcome = engine.run_turn("s1", turn(&[], &[])).await.unwrap();

    assert_eq!(outcome.turn, 1);
    assert_eq!(outcome.strategy, "broaden");
    assert_eq!(outcome.technique, "exploration");
    assert_eq!(outcome.focus_concept, None);
    assert_eq!(outcome.degradations, vec![Degradation::NoTrackedConcepts]);
    assert_eq!(outcome.continuation, Continuation::Continue);
    assert!(outcome.signals.nodes.is_empty());

    let persisted = stored(&store, "s1").await;
    assert_eq!(persisted.turn, 1);
}

#[tokio::test]
async fn test_growth_credits_previous_focus_and_depth_lands_before_focus_moves() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator(Arc::clone(&store));

    let first = engine.run_turn("s1", turn(&["a"], &[])).await.unwrap();
    assert_eq!(first.focus_concept.as_deref(), Some("a"));

    engine
        .run_turn("s1", turn(&["a", "b"], &[("a", "b")]))
        .await
        .unwrap();

    let restored = restore_session("s1", Some(stored(&store, "s1").await), 5);
    assert!(restored.degradations.is_empty());
    assert_eq!(restored.session.turn, 2);
    assert_eq!(restored.session.strategy_history.len(), 2);

    let a = restored.tracker.get("a").unwrap();
    assert_eq!(a.yield_count, 1);
    assert_eq!(a.edges_out, 1);
    // turn 2's response answered the question about a
    assert_eq!(a.response_depths.iter().copied().collect::<Vec<_>>(), vec![ResponseDepth::Shallow]);

    let b = restored.tracker.get("b").unwrap();
    assert!(b.response_depths.is_empty());
    assert_eq!(b.edges_in, 1);
}

#[tokio::test]
async fn test_quality_timeout_degrades_to_neutral() {
    let mut config = Config::default_config();
    config.session.quality_timeout_ms = 20;
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator_with(config, Arc::clone(&store), Arc::new(SlowDetector));

    let outcome = engine.run_turn("s1", turn(&["a"], &[])).await.unwrap();

    assert!(outcome
        .degradations
        .contains(&Degradation::QualityDetectorTimedOut(20)));
    assert_eq!(outcome.focus_concept.as_deref(), Some("a"));
    assert_eq!(stored(&store, "s1").await.turn, 1);
}

#[tokio::test]
async fn test_quality_failure_degrades_to_neutral() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator_with(
        Config::default_config(),
        Arc::clone(&store),
        Arc::new(FailingDetector),
    );

    let outcome = engine.run_turn("s1", turn(&["a"], &[])).await.unwrap();
    assert!(outcome
        .degradations
        .iter()
        .any(|d| matches!(d, Degradation::QualityDetectorFailed(msg) if msg.contains("model unavailable"))));
}

#[tokio::test]
async fn test_corrupt_tracker_snapshot_keeps_session_counters() {
    let store = Arc::new(MemorySessionStore::new());
    let mut session = SessionState::new("s1");
    session.turn = 3;
    store
        .put(
            "s1",
            PersistedSession {
                turn: 3,
                session_json: session.to_json().unwrap(),
                tracker_json: "{not json".to_string(),
            },
        )
        .await;
    let engine = orchestrator(Arc::clone(&store));

    let outcome = engine.run_turn("s1", turn(&["a"], &[])).await.unwrap();

    assert_eq!(outcome.turn, 4);
    assert!(outcome
        .degradations
        .iter()
        .any(|d| matches!(d, Degradation::SnapshotRestoreFailed(_))));
    // the rebuilt tracker picks the concept up again
    assert!(outcome.signals.nodes.contains_key("a"));
}

#[tokio::test]
async fn test_turn_limit_stops() {
    let mut config = Config::default_config();
    config.session.max_turns = 2;
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator_with(config, store, Arc::new(FixedDetector(shallow())));

    let first = engine.run_turn("s1", turn(&[], &[])).await.unwrap();
    assert!(first.continuation.should_continue());
    let second = engine.run_turn("s1", turn(&[], &[])).await.unwrap();
    assert_eq!(second.continuation, Continuation::Stop(StopReason::TurnLimit));
}

#[tokio::test]
async fn test_repeated_fallbacks_stop() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator(store);

    for expected in [Continuation::Continue, Continuation::Continue] {
        let outcome = engine.run_turn("s1", turn(&[], &[])).await.unwrap();
        assert_eq!(outcome.continuation, expected);
    }
    let third = engine.run_turn("s1", turn(&[], &[])).await.unwrap();
    assert_eq!(
        third.continuation,
        Continuation::Stop(StopReason::NoViableCandidate)
    );
}

#[tokio::test]
async fn test_saturation_stops() {
    let mut config = Config::default_config();
    config.session.saturation_stop_threshold = 0.5;
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator_with(config, store, Arc::new(FixedDetector(shallow())));

    // no growth at all: velocity decay is already total
    let outcome = engine.run_turn("s1", turn(&[], &[])).await.unwrap();
    assert!(outcome.saturation.score >= 0.5);
    assert_eq!(outcome.continuation, Continuation::Stop(StopReason::Saturated));
}

#[tokio::test]
async fn test_joint_ranking_scores_every_pair() {
    let mut config = Config::default_config();
    config.session.ranking_policy = RankingPolicy::Joint;
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator_with(config, store, Arc::new(FixedDetector(shallow())));

    let outcome = engine
        .run_turn("s1", turn(&["a", "b"], &[("a", "b")]))
        .await
        .unwrap();

    // 4 node-bound strategies x 2 concepts + 2 node-free strategies
    assert_eq!(outcome.ranking.candidates.len(), 10);
    assert!(outcome.ranking.concept_candidates.is_empty());
    assert_eq!(
        outcome.ranking.candidates.iter().filter(|c| c.selected).count(),
        1
    );
    assert!(outcome.focus_concept.is_some());
}

#[tokio::test]
async fn test_two_stage_ranking_scores_strategies_then_concepts() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator(store);

    let outcome = engine
        .run_turn("s1", turn(&["a", "b"], &[("a", "b")]))
        .await
        .unwrap();

    assert_eq!(outcome.ranking.policy, RankingPolicy::TwoStage);
    assert_eq!(outcome.ranking.candidates.len(), 6);
    assert!(outcome
        .ranking
        .candidates
        .iter()
        .all(|c| c.concept_id.is_none()));
}

const NODE_BOUND_WINS: &str = r#"
[session]
fallback_strategy = "survey"

[[strategies]]
name = "anchor"
technique = "laddering"

[strategies.signal_weights]
"llm.engagement" = 1.0
"node.is_orphan" = 1.0

[[strategies]]
name = "survey"
technique = "exploration"
node_binding = "none"
"#;

#[tokio::test]
async fn test_two_stage_ranks_concepts_for_a_node_bound_winner() {
    let config = Config::from_toml_str(NODE_BOUND_WINS).unwrap();
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator_with(config, store, Arc::new(FixedDetector(shallow())));

    let outcome = engine
        .run_turn("s1", turn(&["a", "b", "c"], &[("a", "b")]))
        .await
        .unwrap();

    assert!(outcome.degradations.is_empty());
    assert_eq!(outcome.strategy, "anchor");
    assert_eq!(
        outcome.ranking.selection.node_binding,
        elicit_engine::scoring::NodeBinding::Required
    );

    let concepts = &outcome.ranking.concept_candidates;
    assert_eq!(concepts.len(), 3);
    assert!(concepts.iter().all(|c| c.strategy == "anchor"));
    // only c is an orphan
    assert_eq!(concepts[0].concept_id.as_deref(), Some("c"));
    assert!(concepts[0].selected);
    assert_eq!(concepts.iter().filter(|c| c.selected).count(), 1);
    assert_eq!(outcome.ranking.selection.concept_id.as_deref(), Some("c"));
    assert_eq!(outcome.focus_concept.as_deref(), Some("c"));
}

#[tokio::test]
async fn test_same_inputs_same_outcome() {
    let script = [
        turn(&["a"], &[]),
        turn(&["a", "b"], &[("a", "b")]),
        turn(&["a", "b", "c"], &[("a", "b"), ("b", "c")]),
    ];

    let mut runs = Vec::new();
    for _ in 0..2 {
        let engine = orchestrator(Arc::new(MemorySessionStore::new()));
        let mut outcomes = Vec::new();
        for input in script.iter().cloned() {
            outcomes.push(engine.run_turn("s1", input).await.unwrap());
        }
        runs.push(outcomes);
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn test_concurrent_turns_of_one_session_are_serialized() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = Arc::new(orchestrator(Arc::clone(&store)));

    let calls = (0..5).map(|_| {
        let engine = Arc::clone(&engine);
        async move { engine.run_turn("s1", turn(&["a"], &[])).await.unwrap().turn }
    });
    let mut turns = futures::future::join_all(calls).await;
    turns.sort_unstable();

    assert_eq!(turns, vec![1, 2, 3, 4, 5]);
    assert_eq!(stored(&store, "s1").await.turn, 5);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let store = Arc::new(MemorySessionStore::new());
    let engine = orchestrator(Arc::clone(&store));

    engine.run_turn("s1", turn(&["a"], &[])).await.unwrap();
    engine.run_turn("s1", turn(&["a"], &[])).await.unwrap();
    let other = engine.run_turn("s2", turn(&[], &[])).await.unwrap();

    assert_eq!(other.turn, 1);
    assert_eq!(stored(&store, "s1").await.turn, 2);
}
