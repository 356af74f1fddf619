//! Candidate Scorer/Ranker
//!
//! Turns the configured strategies and the turn's signals into a ranked list
//! of (strategy, concept) candidates.
//!
//! - [`StrategyDefinition`] is a strategy compiled against the closed signal
//!   vocabulary. Unknown weight keys are dropped at compile time.
//! - [`ranker`] scores candidates and applies phase reweighting under either
//!   [`RankingPolicy`].

pub mod ranker;

pub use ranker::{
    rank, rank_concepts, rank_joint, rank_strategies, FallbackReason, Ranking, ScoredCandidate,
    Selection, SignalContribution,
};

use crate::config::StrategyConfig;
use crate::signals::{SignalScope, WeightKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Whether a strategy targets a specific concept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeBinding {
    /// One candidate per tracked concept
    #[default]
    Required,
    /// A single node-free candidate
    #[serde(rename = "none", alias = "unbound")]
    Unbound,
}

/// How a node-free strategy picks its focus concept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusPreference {
    /// Keep the previous turn's focus
    #[default]
    Current,
    /// Lowest depth, then fewest focuses
    Shallowest,
    /// Most recently created
    Recent,
    /// Fewest focuses, then longest since last focus
    LeastExplored,
}

/// Joint (strategy x concept) or two-stage ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// Rank strategies on global signals, then concepts on node signals
    #[default]
    TwoStage,
    /// Rank every (strategy, concept) pair in one list
    Joint,
}

impl fmt::Display for RankingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingPolicy::TwoStage => f.write_str("two_stage"),
            RankingPolicy::Joint => f.write_str("joint"),
        }
    }
}

/// A strategy compiled against the signal vocabulary
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub name: String,
    pub technique: String,
    pub node_binding: NodeBinding,
    pub focus_preference: FocusPreference,
    /// Weights in key order
    pub weights: Vec<(WeightKey, f64)>,
    /// Weight keys that named no known signal or category
    pub ignored_keys: Vec<String>,
}

impl StrategyDefinition {
    pub fn compile(config: &StrategyConfig) -> Self {
        let mut weights = Vec::new();
        let mut ignored_keys = Vec::new();

        for (raw, weight) in &config.signal_weights {
            match WeightKey::parse(raw) {
                Some(key) => weights.push((key, *weight)),
                None => {
                    warn!(
                        "Strategy '{}' ignores unknown signal key '{}'",
                        config.name, raw
                    );
                    ignored_keys.push(raw.clone());
                }
            }
        }

        Self {
            name: config.name.clone(),
            technique: config.technique.clone(),
            node_binding: config.node_binding,
            focus_preference: config.focus_preference,
            weights,
            ignored_keys,
        }
    }

    pub fn is_node_bound(&self) -> bool {
        self.node_binding == NodeBinding::Required
    }

    /// Weights whose signal lives in one of `scopes`
    pub fn weights_in<'a>(
        &'a self,
        scopes: &'a [SignalScope],
    ) -> impl Iterator<Item = &'a (WeightKey, f64)> + 'a {
        self.weights
            .iter()
            .filter(move |(key, _)| scopes.contains(&key.scope()))
    }
}

/// Compile every configured strategy, keeping declaration order
pub fn compile_strategies(configs: &[StrategyConfig]) -> Vec<StrategyDefinition> {
    configs.iter().map(StrategyDefinition::compile).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::BTreeMap;

    #[test]
    fn test_compile_drops_unknown_keys() {
        let config = StrategyConfig {
            name: "probe".to_string(),
            technique: "probing".to_string(),
            node_binding: NodeBinding::Required,
            signal_weights: BTreeMap::from([
                ("node.exhausted".to_string(), -1.0),
                ("node.sparkle".to_string(), 2.0),
                ("llm.depth_bucket.low".to_string(), 0.5),
            ]),
            focus_preference: FocusPreference::Current,
        };
        let def = StrategyDefinition::compile(&config);
        assert_eq!(def.weights.len(), 2);
        assert_eq!(def.ignored_keys, vec!["node.sparkle".to_string()]);
        assert!(def.is_node_bound());
    }

    #[test]
    fn test_weights_in_scope() {
        let config = Config::default_config();
        let deepen = StrategyDefinition::compile(config.strategy("deepen").unwrap());
        let node_only: Vec<_> = deepen.weights_in(&[SignalScope::Node]).collect();
        assert!(!node_only.is_empty());
        assert!(node_only.iter().all(|(k, _)| k.scope() == SignalScope::Node));
    }

    #[test]
    fn test_binding_wire_names() {
        let binding: NodeBinding = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(binding, NodeBinding::Unbound);
        assert_eq!(serde_json::to_string(&NodeBinding::Required).unwrap(), "\"required\"");
        let policy: RankingPolicy = serde_json::from_str("\"joint\"").unwrap();
        assert_eq!(policy, RankingPolicy::Joint);
        let pref: FocusPreference = serde_json::from_str("\"least_explored\"").unwrap();
        assert_eq!(pref, FocusPreference::LeastExplored);
    }
}
