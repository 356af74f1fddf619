//! Signal Detectors
//!
//! A signal is a named measurement derived from the graph, the tracker, the
//! session history or the latest response. Every signal the engine knows is a
//! variant of [`SignalName`]; strategy weight maps are compiled against this
//! closed set and unknown keys are dropped instead of failing.
//!
//! Scopes:
//!
//! - **Global**: one value per turn (`graph.*`, `llm.*`, `meta.*`)
//! - **Strategy**: one value per candidate strategy (`temporal.*`)
//! - **Node**: one value per tracked concept (`node.*`)
//!
//! Detectors live in a static table ([`registry::DETECTORS`]) and run in stage
//! order: global, quality, strategy, node, then meta.

pub mod graph;
pub mod meta;
pub mod node;
pub mod quality;
pub mod registry;
pub mod saturation;
pub mod temporal;

pub use quality::{assess_with_timeout, HeuristicQualityDetector, QualityOutcome};
pub use node::NodeInputs;
pub use registry::{DetectorSet, DetectorStage, GlobalInputs};
pub use saturation::{SaturationReading, SaturationTracker};
pub use temporal::StrategyInputs;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a signal's values live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalScope {
    Global,
    Strategy,
    Node,
}

/// Every signal the engine can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalName {
    #[serde(rename = "graph.max_depth")]
    GraphMaxDepth,
    #[serde(rename = "graph.chain_complete")]
    GraphChainComplete,
    #[serde(rename = "graph.node_count")]
    GraphNodeCount,
    #[serde(rename = "graph.orphan_ratio")]
    GraphOrphanRatio,
    #[serde(rename = "graph.edge_density")]
    GraphEdgeDensity,

    #[serde(rename = "llm.response_depth")]
    ResponseDepth,
    #[serde(rename = "llm.depth_bucket")]
    DepthBucket,
    #[serde(rename = "llm.specificity")]
    Specificity,
    #[serde(rename = "llm.certainty")]
    Certainty,
    #[serde(rename = "llm.valence")]
    Valence,
    #[serde(rename = "llm.engagement")]
    Engagement,

    #[serde(rename = "temporal.strategy_repetition")]
    StrategyRepetition,
    #[serde(rename = "temporal.turns_since_strategy")]
    TurnsSinceStrategy,

    #[serde(rename = "node.exhausted")]
    NodeExhausted,
    #[serde(rename = "node.exhaustion_score")]
    NodeExhaustionScore,
    #[serde(rename = "node.yield_stagnation")]
    NodeYieldStagnation,
    #[serde(rename = "node.focus_streak")]
    NodeFocusStreak,
    #[serde(rename = "node.is_orphan")]
    NodeIsOrphan,
    #[serde(rename = "node.edge_count")]
    NodeEdgeCount,
    #[serde(rename = "node.recency_score")]
    NodeRecencyScore,
    #[serde(rename = "node.is_current_focus")]
    NodeIsCurrentFocus,
    #[serde(rename = "node.is_terminal")]
    NodeIsTerminal,
    #[serde(rename = "node.opportunity")]
    NodeOpportunity,

    #[serde(rename = "meta.phase")]
    Phase,
    #[serde(rename = "meta.saturation")]
    Saturation,
    #[serde(rename = "meta.saturated")]
    Saturated,
}

const DEPTH_BUCKETS: &[&str] = &["low", "mid", "high"];
const STREAK_BUCKETS: &[&str] = &["none", "low", "medium", "high"];
const PHASES: &[&str] = &["early", "mid", "late"];

impl SignalName {
    pub const ALL: &'static [SignalName] = &[
        SignalName::GraphMaxDepth,
        SignalName::GraphChainComplete,
        SignalName::GraphNodeCount,
        SignalName::GraphOrphanRatio,
        SignalName::GraphEdgeDensity,
        SignalName::ResponseDepth,
        SignalName::DepthBucket,
        SignalName::Specificity,
        SignalName::Certainty,
        SignalName::Valence,
        SignalName::Engagement,
        SignalName::StrategyRepetition,
        SignalName::TurnsSinceStrategy,
        SignalName::NodeExhausted,
        SignalName::NodeExhaustionScore,
        SignalName::NodeYieldStagnation,
        SignalName::NodeFocusStreak,
        SignalName::NodeIsOrphan,
        SignalName::NodeEdgeCount,
        SignalName::NodeRecencyScore,
        SignalName::NodeIsCurrentFocus,
        SignalName::NodeIsTerminal,
        SignalName::NodeOpportunity,
        SignalName::Phase,
        SignalName::Saturation,
        SignalName::Saturated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalName::GraphMaxDepth => "graph.max_depth",
            SignalName::GraphChainComplete => "graph.chain_complete",
            SignalName::GraphNodeCount => "graph.node_count",
            SignalName::GraphOrphanRatio => "graph.orphan_ratio",
            SignalName::GraphEdgeDensity => "graph.edge_density",
            SignalName::ResponseDepth => "llm.response_depth",
            SignalName::DepthBucket => "llm.depth_bucket",
            SignalName::Specificity => "llm.specificity",
            SignalName::Certainty => "llm.certainty",
            SignalName::Valence => "llm.valence",
            SignalName::Engagement => "llm.engagement",
            SignalName::StrategyRepetition => "temporal.strategy_repetition",
            SignalName::TurnsSinceStrategy => "temporal.turns_since_strategy",
            SignalName::NodeExhausted => "node.exhausted",
            SignalName::NodeExhaustionScore => "node.exhaustion_score",
            SignalName::NodeYieldStagnation => "node.yield_stagnation",
            SignalName::NodeFocusStreak => "node.focus_streak",
            SignalName::NodeIsOrphan => "node.is_orphan",
            SignalName::NodeEdgeCount => "node.edge_count",
            SignalName::NodeRecencyScore => "node.recency_score",
            SignalName::NodeIsCurrentFocus => "node.is_current_focus",
            SignalName::NodeIsTerminal => "node.is_terminal",
            SignalName::NodeOpportunity => "node.opportunity",
            SignalName::Phase => "meta.phase",
            SignalName::Saturation => "meta.saturation",
            SignalName::Saturated => "meta.saturated",
        }
    }

    /// Look up a signal by its wire name
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    pub fn scope(&self) -> SignalScope {
        match self {
            SignalName::StrategyRepetition | SignalName::TurnsSinceStrategy => {
                SignalScope::Strategy
            }
            SignalName::NodeExhausted
            | SignalName::NodeExhaustionScore
            | SignalName::NodeYieldStagnation
            | SignalName::NodeFocusStreak
            | SignalName::NodeIsOrphan
            | SignalName::NodeEdgeCount
            | SignalName::NodeRecencyScore
            | SignalName::NodeIsCurrentFocus
            | SignalName::NodeIsTerminal
            | SignalName::NodeOpportunity => SignalScope::Node,
            _ => SignalScope::Global,
        }
    }

    /// Allowed categories for categorical signals
    pub fn categories(&self) -> Option<&'static [&'static str]> {
        match self {
            SignalName::DepthBucket => Some(DEPTH_BUCKETS),
            SignalName::NodeFocusStreak => Some(STREAK_BUCKETS),
            SignalName::Phase => Some(PHASES),
            _ => None,
        }
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Continuous(f64),
    Category(String),
}

impl SignalValue {
    /// Continuous value clamped into [0,1]
    pub fn unit(value: f64) -> Self {
        if value.is_nan() {
            SignalValue::Continuous(0.0)
        } else {
            SignalValue::Continuous(value.clamp(0.0, 1.0))
        }
    }

    pub fn category(label: &str) -> Self {
        SignalValue::Category(label.to_string())
    }

    /// Numeric value this signal contributes for a weight key.
    ///
    /// Booleans and continuous values resolve only for plain keys; categorical
    /// values resolve only for `<signal>.<category>` keys, to 1.0 on a match.
    /// `None` means the key does not apply and contributes nothing.
    pub fn resolve(&self, category: Option<&str>) -> Option<f64> {
        match (self, category) {
            (SignalValue::Bool(b), None) => Some(if *b { 1.0 } else { 0.0 }),
            (SignalValue::Continuous(v), None) => Some(*v),
            (SignalValue::Category(c), Some(wanted)) => Some(if c == wanted { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.resolve(None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SignalValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Bool(b) => write!(f, "{}", b),
            SignalValue::Continuous(v) => write!(f, "{:.3}", v),
            SignalValue::Category(c) => f.write_str(c),
        }
    }
}

/// Signal values of one scope instance
pub type SignalMap = BTreeMap<SignalName, SignalValue>;

/// A parsed key of a strategy's signal-weight map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightKey {
    pub signal: SignalName,
    pub category: Option<String>,
}

impl WeightKey {
    /// Parse `node.exhausted` or `llm.depth_bucket.low`.
    ///
    /// Returns `None` for unknown signals and for categories the signal does
    /// not define.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(signal) = SignalName::parse(raw) {
            return Some(Self {
                signal,
                category: None,
            });
        }
        let (prefix, category) = raw.rsplit_once('.')?;
        let signal = SignalName::parse(prefix)?;
        let allowed = signal.categories()?;
        if !allowed.contains(&category) {
            return None;
        }
        Some(Self {
            signal,
            category: Some(category.to_string()),
        })
    }

    pub fn scope(&self) -> SignalScope {
        self.signal.scope()
    }
}

impl fmt::Display for WeightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(c) => write!(f, "{}.{}", self.signal, c),
            None => write!(f, "{}", self.signal),
        }
    }
}

/// Every signal value computed in one turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSnapshot {
    pub global: SignalMap,
    pub strategies: BTreeMap<String, SignalMap>,
    pub nodes: BTreeMap<String, SignalMap>,
}

impl SignalSnapshot {
    pub fn node(&self, concept_id: &str) -> Option<&SignalMap> {
        self.nodes.get(concept_id)
    }

    pub fn strategy(&self, name: &str) -> Option<&SignalMap> {
        self.strategies.get(name)
    }
}
