//! Candidate ranking
//!
//! Scoring rules:
//!
//! ```text
//! base  = sum(weight * resolved_value)       over the weights in scope
//! final = base * multiplier(strategy) + bonus(strategy)
//! ```
//!
//! Booleans resolve to 1.0/0.0, continuous values to themselves, categorical
//! values to 1.0 when the key's category matches. Signals that were not
//! computed contribute nothing.
//!
//! Candidates are stably sorted by `final` descending, so ties keep
//! declaration order (then concept id order).

use super::{NodeBinding, RankingPolicy, StrategyDefinition};
use crate::config::PhaseConfig;
use crate::signals::{SignalName, SignalScope, SignalSnapshot, SignalValue};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

const STRATEGY_SCOPES: &[SignalScope] = &[SignalScope::Global, SignalScope::Strategy];
const NODE_SCOPES: &[SignalScope] = &[SignalScope::Node];
const ALL_SCOPES: &[SignalScope] = &[SignalScope::Global, SignalScope::Strategy, SignalScope::Node];

/// One weight's share of a candidate's base score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub key: String,
    pub weight: f64,
    /// Resolved signal value, `None` when the signal was not available
    pub value: Option<f64>,
    pub contribution: f64,
}

/// A scored (strategy, concept) candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub strategy: String,
    pub technique: String,
    pub concept_id: Option<String>,
    pub contributions: Vec<SignalContribution>,
    pub base_score: f64,
    pub multiplier: f64,
    pub bonus: f64,
    pub final_score: f64,
    /// 1-based position after sorting
    pub rank: usize,
    pub selected: bool,
}

/// Why the configured fallback strategy was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The tracker holds no concepts yet
    NoTrackedConcepts,
    /// No strategy produced a candidate
    EmptyCandidateSet,
    /// The best candidate scored zero or below
    NoPositiveCandidate,
}

/// The strategy (and concept) chosen for the next turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub strategy: String,
    pub technique: String,
    pub node_binding: NodeBinding,
    /// Set for node-bound selections; node-free focus is resolved later
    pub concept_id: Option<String>,
    pub fallback: Option<FallbackReason>,
}

/// Full ranking output for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub policy: RankingPolicy,
    /// Strategy candidates (two-stage) or every pair (joint), ranked
    pub candidates: Vec<ScoredCandidate>,
    /// Concept candidates of the winning strategy (two-stage only)
    pub concept_candidates: Vec<ScoredCandidate>,
    pub selection: Selection,
}

impl Ranking {
    pub fn selected(&self) -> Option<&ScoredCandidate> {
        self.candidates.iter().find(|c| c.selected)
    }
}

fn lookup<'s>(
    signals: &'s SignalSnapshot,
    strategy: &str,
    concept: Option<&str>,
    signal: SignalName,
) -> Option<&'s SignalValue> {
    concept
        .and_then(|id| signals.node(id))
        .and_then(|m| m.get(&signal))
        .or_else(|| signals.strategy(strategy).and_then(|m| m.get(&signal)))
        .or_else(|| signals.global.get(&signal))
}

fn score_candidate(
    strategy: &StrategyDefinition,
    scopes: &[SignalScope],
    concept: Option<&str>,
    signals: &SignalSnapshot,
    phase: Option<&PhaseConfig>,
) -> ScoredCandidate {
    let contributions: Vec<SignalContribution> = strategy
        .weights_in(scopes)
        .map(|(key, weight)| {
            let value = lookup(signals, &strategy.name, concept, key.signal)
                .and_then(|v| v.resolve(key.category.as_deref()));
            SignalContribution {
                key: key.to_string(),
                weight: *weight,
                value,
                contribution: value.map_or(0.0, |v| weight * v),
            }
        })
        .collect();

    let base_score: f64 = contributions.iter().map(|c| c.contribution).sum();
    let (multiplier, bonus) = match phase {
        Some(p) => (p.multiplier(&strategy.name), p.bonus(&strategy.name)),
        None => (1.0, 0.0),
    };

    ScoredCandidate {
        strategy: strategy.name.clone(),
        technique: strategy.technique.clone(),
        concept_id: concept.map(str::to_string),
        contributions,
        base_score,
        multiplier,
        bonus,
        final_score: base_score * multiplier + bonus,
        rank: 0,
        selected: false,
    }
}

fn sort_and_rank(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
    });
    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = i + 1;
    }
}

/// Rank every (strategy, concept) pair in one list.
///
/// Node-free strategies give one candidate; node-bound strategies give one
/// per concept present in `signals.nodes`.
pub fn rank_joint(
    strategies: &[StrategyDefinition],
    signals: &SignalSnapshot,
    phase: &PhaseConfig,
) -> Vec<ScoredCandidate> {
    let mut candidates = Vec::new();
    for strategy in strategies {
        if strategy.is_node_bound() {
            for concept in signals.nodes.keys() {
                candidates.push(score_candidate(
                    strategy,
                    ALL_SCOPES,
                    Some(concept),
                    signals,
                    Some(phase),
                ));
            }
        } else {
            candidates.push(score_candidate(
                strategy,
                ALL_SCOPES,
                None,
                signals,
                Some(phase),
            ));
        }
    }
    sort_and_rank(&mut candidates);
    candidates
}

/// Stage one: rank strategies on global and strategy-scoped weights only.
///
/// Node-bound strategies are left out when no concept is tracked.
pub fn rank_strategies(
    strategies: &[StrategyDefinition],
    signals: &SignalSnapshot,
    phase: &PhaseConfig,
) -> Vec<ScoredCandidate> {
    let has_concepts = !signals.nodes.is_empty();
    let mut candidates: Vec<_> = strategies
        .iter()
        .filter(|s| has_concepts || !s.is_node_bound())
        .map(|s| score_candidate(s, STRATEGY_SCOPES, None, signals, Some(phase)))
        .collect();
    sort_and_rank(&mut candidates);
    candidates
}

/// Stage two: rank concepts for one strategy on node-scoped weights only
pub fn rank_concepts(
    strategy: &StrategyDefinition,
    signals: &SignalSnapshot,
) -> Vec<ScoredCandidate> {
    let mut candidates: Vec<_> = signals
        .nodes
        .keys()
        .map(|id| score_candidate(strategy, NODE_SCOPES, Some(id), signals, None))
        .collect();
    sort_and_rank(&mut candidates);
    candidates
}

/// Rank candidates under `policy` and select one.
///
/// Falls back to `fallback` when no concept is tracked, when the candidate
/// list is empty, or when the best final score is not positive.
pub fn rank(
    policy: RankingPolicy,
    strategies: &[StrategyDefinition],
    signals: &SignalSnapshot,
    phase: &PhaseConfig,
    fallback: &str,
) -> Result<Ranking, EngineError> {
    let mut candidates = match policy {
        RankingPolicy::Joint => rank_joint(strategies, signals, phase),
        RankingPolicy::TwoStage => rank_strategies(strategies, signals, phase),
    };

    let fallback_reason = if signals.nodes.is_empty() {
        Some(FallbackReason::NoTrackedConcepts)
    } else {
        match candidates.first() {
            None => Some(FallbackReason::EmptyCandidateSet),
            Some(top) if top.final_score <= 0.0 => Some(FallbackReason::NoPositiveCandidate),
            Some(_) => None,
        }
    };

    if let Some(reason) = fallback_reason {
        let def = strategies
            .iter()
            .find(|s| s.name == fallback)
            .ok_or_else(|| EngineError::UnknownStrategy(fallback.to_string()))?;
        debug!("Falling back to '{}' ({:?})", def.name, reason);
        if let Some(c) = candidates
            .iter_mut()
            .find(|c| c.strategy == def.name && c.concept_id.is_none())
        {
            c.selected = true;
        }
        return Ok(Ranking {
            policy,
            candidates,
            concept_candidates: Vec::new(),
            selection: Selection {
                strategy: def.name.clone(),
                technique: def.technique.clone(),
                node_binding: def.node_binding,
                concept_id: None,
                fallback: Some(reason),
            },
        });
    }

    candidates[0].selected = true;
    let winner = candidates[0].clone();
    let def = strategies
        .iter()
        .find(|s| s.name == winner.strategy)
        .ok_or_else(|| EngineError::UnknownStrategy(winner.strategy.clone()))?;

    let mut concept_candidates = Vec::new();
    let concept_id = match policy {
        RankingPolicy::Joint => winner.concept_id.clone(),
        RankingPolicy::TwoStage if def.is_node_bound() => {
            concept_candidates = rank_concepts(def, signals);
            if let Some(first) = concept_candidates.first_mut() {
                first.selected = true;
            }
            concept_candidates.first().and_then(|c| c.concept_id.clone())
        }
        RankingPolicy::TwoStage => None,
    };

    debug!(
        "Selected '{}' (final {:.3}) focus {:?}",
        def.name, winner.final_score, concept_id
    );

    Ok(Ranking {
        policy,
        candidates,
        concept_candidates,
        selection: Selection {
            strategy: def.name.clone(),
            technique: def.technique.clone(),
            node_binding: def.node_binding,
            concept_id,
            fallback: None,
        },
    })
}
