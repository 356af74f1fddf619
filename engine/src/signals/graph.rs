//! Graph-structure detectors (`graph.*`)

use super::registry::GlobalInputs;
use super::{SignalMap, SignalValue};

fn ratio(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 1.0;
    }
    value / target
}

/// Longest chain relative to the configured chain target
pub(crate) fn detect_max_depth(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::unit(ratio(
        inputs.aggregates.longest_chain as f64,
        inputs.settings.chain_target as f64,
    ))
}

pub(crate) fn detect_chain_complete(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::Bool(inputs.aggregates.has_complete_chain)
}

pub(crate) fn detect_node_count(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::unit(ratio(
        inputs.aggregates.concept_count as f64,
        inputs.settings.node_count_target as f64,
    ))
}

/// Share of concepts with no edges; 0 for an empty graph
pub(crate) fn detect_orphan_ratio(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    let count = inputs.aggregates.concept_count;
    if count == 0 {
        return SignalValue::unit(0.0);
    }
    SignalValue::unit(inputs.aggregates.orphan_count as f64 / count as f64)
}

pub(crate) fn detect_edge_density(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::unit(ratio(
        inputs.aggregates.edge_density,
        inputs.settings.target_edge_density,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalsConfig;
    use crate::graph::GraphAggregates;
    use crate::phase::Phase;
    use crate::signals::SaturationReading;
    use sdk::types::{Concept, ConceptEdge, GraphSnapshot};

    fn chain_graph() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Concept::new("a", "a"),
                Concept::new("b", "b").with_depth(1),
                Concept::new("c", "c").with_depth(2).terminal(),
                Concept::new("d", "d"),
            ],
            vec![
                ConceptEdge::new("a", "b"),
                ConceptEdge::new("b", "c"),
            ],
        )
    }

    #[test]
    fn test_graph_detectors() {
        let aggregates = GraphAggregates::compute(&chain_graph());
        let saturation = SaturationReading::default();
        let settings = SignalsConfig {
            chain_target: 4,
            node_count_target: 8,
            ..SignalsConfig::default()
        };
        let inputs = GlobalInputs {
            aggregates: &aggregates,
            phase: Phase::Early,
            saturation: &saturation,
            settings: &settings,
        };
        let none = SignalMap::new();

        assert_eq!(detect_chain_complete(&inputs, &none), SignalValue::Bool(true));
        assert_eq!(
            detect_node_count(&inputs, &none),
            SignalValue::Continuous(0.5)
        );
        assert_eq!(
            detect_orphan_ratio(&inputs, &none),
            SignalValue::Continuous(0.25)
        );
        assert!(detect_max_depth(&inputs, &none).as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_empty_graph_orphan_ratio_is_zero() {
        let aggregates = GraphAggregates::compute(&GraphSnapshot::default());
        let saturation = SaturationReading::default();
        let settings = SignalsConfig::default();
        let inputs = GlobalInputs {
            aggregates: &aggregates,
            phase: Phase::Early,
            saturation: &saturation,
            settings: &settings,
        };
        assert_eq!(
            detect_orphan_ratio(&inputs, &SignalMap::new()),
            SignalValue::Continuous(0.0)
        );
    }
}
