//! Detector registry
//!
//! Detectors are plain functions in a static table. A [`DetectorSet`] is the
//! slice of that table a session actually runs, resolved once from the
//! configured `signals.active` list:
//!
//! - An empty list activates every detector
//! - Unknown names are logged and ignored
//! - Dependencies of an active detector are activated with it
//!
//! Within a stage, detectors run in table order, so a dependency always sits
//! above the detectors that read it.

use super::{graph, meta, node, quality, temporal};
use super::node::NodeInputs;
use super::temporal::StrategyInputs;
use super::{SignalMap, SignalName, SignalValue};
use crate::config::SignalsConfig;
use crate::graph::GraphAggregates;
use crate::phase::Phase;
use crate::signals::SaturationReading;
use sdk::quality::QualityAssessment;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Inputs available to global and meta detectors
#[derive(Debug, Clone, Copy)]
pub struct GlobalInputs<'a> {
    pub aggregates: &'a GraphAggregates,
    pub phase: Phase,
    pub saturation: &'a SaturationReading,
    pub settings: &'a SignalsConfig,
}

/// Evaluation stage, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetectorStage {
    Global,
    Quality,
    Strategy,
    Node,
    Meta,
}

type GlobalFn = for<'a> fn(&GlobalInputs<'a>, &SignalMap) -> SignalValue;
type QualityFn = fn(&QualityAssessment) -> SignalValue;
type StrategyFn = for<'a> fn(&StrategyInputs<'a>) -> SignalValue;
type NodeFn = for<'a> fn(&NodeInputs<'a>, &SignalMap) -> SignalValue;

#[derive(Clone, Copy)]
enum Detect {
    Global(GlobalFn),
    Quality(QualityFn),
    Strategy(StrategyFn),
    Node(NodeFn),
}

/// One row of the detector table
#[derive(Clone, Copy)]
pub struct DetectorEntry {
    pub signal: SignalName,
    pub stage: DetectorStage,
    pub depends_on: &'static [SignalName],
    detect: Detect,
}

const fn entry(
    signal: SignalName,
    stage: DetectorStage,
    depends_on: &'static [SignalName],
    detect: Detect,
) -> DetectorEntry {
    DetectorEntry {
        signal,
        stage,
        depends_on,
        detect,
    }
}

use self::DetectorStage as S;
use super::SignalName as N;

/// Every detector the engine ships
pub static DETECTORS: &[DetectorEntry] = &[
    entry(N::GraphMaxDepth, S::Global, &[], Detect::Global(graph::detect_max_depth)),
    entry(N::GraphChainComplete, S::Global, &[], Detect::Global(graph::detect_chain_complete)),
    entry(N::GraphNodeCount, S::Global, &[], Detect::Global(graph::detect_node_count)),
    entry(N::GraphOrphanRatio, S::Global, &[], Detect::Global(graph::detect_orphan_ratio)),
    entry(N::GraphEdgeDensity, S::Global, &[], Detect::Global(graph::detect_edge_density)),
    entry(N::ResponseDepth, S::Quality, &[], Detect::Quality(quality::detect_response_depth)),
    entry(N::DepthBucket, S::Quality, &[], Detect::Quality(quality::detect_depth_bucket)),
    entry(N::Specificity, S::Quality, &[], Detect::Quality(quality::detect_specificity)),
    entry(N::Certainty, S::Quality, &[], Detect::Quality(quality::detect_certainty)),
    entry(N::Valence, S::Quality, &[], Detect::Quality(quality::detect_valence)),
    entry(N::Engagement, S::Quality, &[], Detect::Quality(quality::detect_engagement)),
    entry(
        N::StrategyRepetition,
        S::Strategy,
        &[],
        Detect::Strategy(temporal::detect_strategy_repetition),
    ),
    entry(
        N::TurnsSinceStrategy,
        S::Strategy,
        &[],
        Detect::Strategy(temporal::detect_turns_since_strategy),
    ),
    entry(N::NodeExhaustionScore, S::Node, &[], Detect::Node(node::detect_exhaustion_score)),
    entry(N::NodeExhausted, S::Node, &[], Detect::Node(node::detect_exhausted)),
    entry(N::NodeYieldStagnation, S::Node, &[], Detect::Node(node::detect_yield_stagnation)),
    entry(N::NodeFocusStreak, S::Node, &[], Detect::Node(node::detect_focus_streak)),
    entry(N::NodeIsOrphan, S::Node, &[], Detect::Node(node::detect_is_orphan)),
    entry(N::NodeEdgeCount, S::Node, &[], Detect::Node(node::detect_edge_count)),
    entry(N::NodeRecencyScore, S::Node, &[], Detect::Node(node::detect_recency_score)),
    entry(N::NodeIsCurrentFocus, S::Node, &[], Detect::Node(node::detect_is_current_focus)),
    entry(N::NodeIsTerminal, S::Node, &[], Detect::Node(node::detect_is_terminal)),
    entry(N::Phase, S::Meta, &[], Detect::Global(meta::detect_phase)),
    entry(N::Saturation, S::Meta, &[], Detect::Global(meta::detect_saturation)),
    entry(N::Saturated, S::Meta, &[N::Saturation], Detect::Global(meta::detect_saturated)),
    entry(
        N::NodeOpportunity,
        S::Meta,
        &[N::NodeExhausted, N::NodeExhaustionScore, N::NodeRecencyScore],
        Detect::Node(node::detect_opportunity),
    ),
];

fn lookup(signal: SignalName) -> Option<&'static DetectorEntry> {
    DETECTORS.iter().find(|e| e.signal == signal)
}

/// The detectors a session runs, in table order
#[derive(Clone)]
pub struct DetectorSet {
    entries: Vec<&'static DetectorEntry>,
}

impl std::fmt::Debug for DetectorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.signal.as_str()))
            .finish()
    }
}

impl DetectorSet {
    /// Every registered detector
    pub fn all() -> Self {
        Self {
            entries: DETECTORS.iter().collect(),
        }
    }

    /// Resolve the configured active-signal list
    pub fn resolve(active: &[String]) -> Self {
        if active.is_empty() {
            return Self::all();
        }

        let mut wanted = BTreeSet::new();
        let mut pending: Vec<SignalName> = Vec::new();
        for name in active {
            match SignalName::parse(name) {
                Some(signal) => pending.push(signal),
                None => warn!("Ignoring unknown signal '{}' in signals.active", name),
            }
        }
        while let Some(signal) = pending.pop() {
            if !wanted.insert(signal) {
                continue;
            }
            if let Some(entry) = lookup(signal) {
                pending.extend(entry.depends_on.iter().copied());
            }
        }

        let entries: Vec<_> = DETECTORS
            .iter()
            .filter(|e| wanted.contains(&e.signal))
            .collect();
        debug!("Resolved {} active detectors", entries.len());
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, signal: SignalName) -> bool {
        self.entries.iter().any(|e| e.signal == signal)
    }

    pub fn signals(&self) -> impl Iterator<Item = SignalName> + '_ {
        self.entries.iter().map(|e| e.signal)
    }

    fn stage(&self, stage: DetectorStage) -> impl Iterator<Item = &'static DetectorEntry> + '_ {
        self.entries.iter().copied().filter(move |e| e.stage == stage)
    }

    /// Graph-structure signals
    pub fn detect_global(&self, inputs: &GlobalInputs<'_>) -> SignalMap {
        let mut map = SignalMap::new();
        for entry in self.stage(DetectorStage::Global) {
            if let Detect::Global(f) = entry.detect {
                let value = f(inputs, &map);
                map.insert(entry.signal, value);
            }
        }
        map
    }

    /// Response-quality signals, merged into the global map
    pub fn detect_quality(&self, assessment: &QualityAssessment, map: &mut SignalMap) {
        for entry in self.stage(DetectorStage::Quality) {
            if let Detect::Quality(f) = entry.detect {
                map.insert(entry.signal, f(assessment));
            }
        }
    }

    /// Session-level meta signals, merged into the global map
    pub fn detect_meta(&self, inputs: &GlobalInputs<'_>, map: &mut SignalMap) {
        for entry in self.stage(DetectorStage::Meta) {
            if let Detect::Global(f) = entry.detect {
                let value = f(inputs, map);
                map.insert(entry.signal, value);
            }
        }
    }

    /// Signals for one candidate strategy
    pub fn detect_strategy(&self, inputs: &StrategyInputs<'_>) -> SignalMap {
        self.stage(DetectorStage::Strategy)
            .filter_map(|entry| match entry.detect {
                Detect::Strategy(f) => Some((entry.signal, f(inputs))),
                _ => None,
            })
            .collect()
    }

    /// Signals for one tracked concept, node stage then node meta
    pub fn detect_node(&self, inputs: &NodeInputs<'_>) -> SignalMap {
        let mut map = SignalMap::new();
        for stage in [DetectorStage::Node, DetectorStage::Meta] {
            for entry in self.stage(stage) {
                if let Detect::Node(f) = entry.detect {
                    let value = f(inputs, &map);
                    map.insert(entry.signal, value);
                }
            }
        }
        map
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::all()
    }
}
