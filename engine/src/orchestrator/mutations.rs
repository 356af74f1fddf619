//! Graph-mutation step of a turn
//!
//! Brings the tracker in line with the collaborator's graph snapshot and
//! credits the resulting growth to the previous turn's focus concept.

use crate::graph::GraphAggregates;
use crate::tracker::{ConceptTracker, YieldChanges};
use sdk::errors::EngineError;
use sdk::types::GraphSnapshot;
use tracing::debug;

/// What the mutation step changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationSummary {
    pub changes: YieldChanges,
    /// Concept credited with the yield, if any
    pub credited: Option<String>,
}

/// Register new concepts, sync edge counts, and record yield.
///
/// New edges are counted once, on their source concept. The yield goes to
/// the tracker's previous focus and never touches its focus streak.
pub fn apply_graph_mutations(
    tracker: &mut ConceptTracker,
    graph: &GraphSnapshot,
    aggregates: &GraphAggregates,
    turn: u32,
) -> Result<MutationSummary, EngineError> {
    let mut changes = YieldChanges::default();

    for concept in &graph.concepts {
        if tracker.register(concept) {
            changes.concepts_added += 1;
        }
    }

    let deltas: Vec<(String, i64, i64)> = tracker
        .states()
        .map(|state| {
            let degree = aggregates.degree(&state.concept_id);
            (
                state.concept_id.clone(),
                degree.outgoing as i64 - state.edges_out as i64,
                degree.incoming as i64 - state.edges_in as i64,
            )
        })
        .filter(|(_, d_out, d_in)| *d_out != 0 || *d_in != 0)
        .collect();

    for (id, delta_out, delta_in) in deltas {
        if delta_out > 0 {
            changes.edges_added += delta_out as u32;
        }
        tracker.update_edge_counts(&id, delta_out, delta_in)?;
    }

    let mut credited = None;
    if !changes.is_empty() {
        if let Some(previous) = tracker.previous_focus().map(str::to_string) {
            tracker.record_yield(&previous, turn, changes)?;
            credited = Some(previous);
        }
    }

    debug!(
        "Graph mutations: +{} concepts, +{} edges, credited {:?}",
        changes.concepts_added, changes.edges_added, credited
    );

    Ok(MutationSummary { changes, credited })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{Concept, ConceptEdge};

    fn apply(tracker: &mut ConceptTracker, graph: &GraphSnapshot, turn: u32) -> MutationSummary {
        let aggregates = GraphAggregates::compute(graph);
        apply_graph_mutations(tracker, graph, &aggregates, turn).unwrap()
    }

    #[test]
    fn test_first_turn_registers_without_credit() {
        let mut tracker = ConceptTracker::new(5);
        let graph = GraphSnapshot::new(
            vec![Concept::new("a", "a"), Concept::new("b", "b")],
            vec![ConceptEdge::new("a", "b")],
        );
        let summary = apply(&mut tracker, &graph, 1);

        assert_eq!(summary.changes.concepts_added, 2);
        assert_eq!(summary.changes.edges_added, 1);
        assert_eq!(summary.credited, None);
        assert_eq!(tracker.get("b").unwrap().edges_in, 1);
    }

    #[test]
    fn test_growth_is_credited_to_previous_focus() {
        let mut tracker = ConceptTracker::new(5);
        let mut graph = GraphSnapshot::new(vec![Concept::new("a", "a")], vec![]);
        apply(&mut tracker, &graph, 1);
        tracker.set_focus("a", "laddering", 1).unwrap();
        tracker.set_focus("a", "laddering", 2).unwrap();

        graph.concepts.push(Concept::new("c", "c"));
        graph.edges.push(ConceptEdge::new("a", "c"));
        let summary = apply(&mut tracker, &graph, 3);

        assert_eq!(summary.credited.as_deref(), Some("a"));
        let a = tracker.get("a").unwrap();
        assert_eq!(a.yield_count, 1);
        assert_eq!(a.turns_since_last_yield, 0);
        assert_eq!(a.current_focus_streak, 2);
    }

    #[test]
    fn test_unchanged_graph_records_nothing() {
        let mut tracker = ConceptTracker::new(5);
        let graph = GraphSnapshot::new(vec![Concept::new("a", "a")], vec![]);
        apply(&mut tracker, &graph, 1);
        tracker.set_focus("a", "laddering", 1).unwrap();

        let summary = apply(&mut tracker, &graph, 2);
        assert_eq!(summary, MutationSummary::default());
        assert_eq!(tracker.get("a").unwrap().yield_count, 0);
    }
}
