//! Per-concept detectors
//!
//! Every detector here reads a single [`ConceptState`]; the meta detectors
//! (`node.exhausted`, `node.opportunity`) additionally read values computed
//! earlier in the same turn for that concept.

use super::{SignalMap, SignalName, SignalValue};
use crate::config::SignalsConfig;
use crate::tracker::ConceptState;
use sdk::types::ResponseDepth;

/// Inputs available to node detectors
#[derive(Debug, Clone, Copy)]
pub struct NodeInputs<'a> {
    pub state: &'a ConceptState,
    /// Focus concept chosen on the previous turn
    pub current_focus: Option<&'a str>,
    pub settings: &'a SignalsConfig,
}

impl NodeInputs<'_> {
    fn is_current_focus(&self) -> bool {
        self.current_focus == Some(self.state.concept_id.as_str())
    }
}

/// Number of recent response depths inspected for shallowness
const SHALLOW_WINDOW: usize = 3;

/// Fraction of the last three response depths that were shallow
pub fn shallow_response_ratio(state: &ConceptState) -> f64 {
    let recent: Vec<_> = state.recent_depths(SHALLOW_WINDOW).collect();
    if recent.is_empty() {
        return 0.0;
    }
    let shallow = recent
        .iter()
        .filter(|d| ***d == ResponseDepth::Shallow)
        .count();
    shallow as f64 / recent.len() as f64
}

/// `0.4 * min(tsly,10)/10 + 0.3 * min(streak,5)/5 + 0.3 * shallow_ratio`
pub fn exhaustion_score(state: &ConceptState) -> f64 {
    let stagnation = state.turns_since_last_yield.min(10) as f64 / 10.0;
    let streak = state.current_focus_streak.min(5) as f64 / 5.0;
    0.4 * stagnation + 0.3 * streak + 0.3 * shallow_response_ratio(state)
}

/// Focused at least once, stagnating, on a streak of two or more, and at
/// least two of the last three responses shallow.
pub fn is_exhausted(state: &ConceptState, stagnation_threshold: u32) -> bool {
    let shallow_recent = state
        .recent_depths(SHALLOW_WINDOW)
        .filter(|d| **d == ResponseDepth::Shallow)
        .count();
    state.focus_count >= 1
        && state.turns_since_last_yield >= stagnation_threshold
        && state.current_focus_streak >= 2
        && shallow_recent >= 2
}

pub fn focus_streak_bucket(streak: u32) -> &'static str {
    match streak {
        0 => "none",
        1 => "low",
        2 | 3 => "medium",
        _ => "high",
    }
}

pub(crate) fn detect_exhaustion_score(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::unit(exhaustion_score(inputs.state))
}

pub(crate) fn detect_yield_stagnation(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::Bool(inputs.state.turns_since_last_yield >= inputs.settings.stagnation_threshold)
}

pub(crate) fn detect_focus_streak(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    let streak = if inputs.is_current_focus() {
        inputs.state.current_focus_streak
    } else {
        0
    };
    SignalValue::category(focus_streak_bucket(streak))
}

pub(crate) fn detect_is_orphan(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::Bool(inputs.state.is_orphan())
}

pub(crate) fn detect_edge_count(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    let cap = inputs.settings.edge_count_cap.max(1) as f64;
    SignalValue::unit(inputs.state.edge_count() as f64 / cap)
}

/// 1.0 right after a focus, decaying linearly to 0 over the recency horizon.
/// Never-focused concepts score 0.
pub(crate) fn detect_recency_score(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    if inputs.state.focus_count == 0 {
        return SignalValue::unit(0.0);
    }
    let horizon = inputs.settings.recency_horizon.max(1) as f64;
    SignalValue::unit(1.0 - inputs.state.turns_since_last_focus as f64 / horizon)
}

pub(crate) fn detect_is_current_focus(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::Bool(inputs.is_current_focus())
}

pub(crate) fn detect_is_terminal(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::Bool(inputs.state.terminal)
}

pub(crate) fn detect_exhausted(inputs: &NodeInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::Bool(is_exhausted(
        inputs.state,
        inputs.settings.stagnation_threshold,
    ))
}

/// Room left to explore: un-exhausted concepts that were not just probed
pub(crate) fn detect_opportunity(_: &NodeInputs<'_>, computed: &SignalMap) -> SignalValue {
    let value = |name: SignalName| {
        computed
            .get(&name)
            .and_then(SignalValue::as_f64)
            .unwrap_or(0.0)
    };
    if computed
        .get(&SignalName::NodeExhausted)
        .and_then(SignalValue::as_bool)
        .unwrap_or(false)
    {
        return SignalValue::unit(0.0);
    }
    let exhaustion = value(SignalName::NodeExhaustionScore);
    let recency = value(SignalName::NodeRecencyScore);
    SignalValue::unit((1.0 - exhaustion) * (1.0 - 0.5 * recency))
}
