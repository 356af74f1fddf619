//! Strategy-history detectors (`temporal.*`)
//!
//! Evaluated once per candidate strategy against the session's strategy
//! history (oldest first, newest last).

use super::SignalValue;
use crate::config::SignalsConfig;
use std::collections::VecDeque;

/// Inputs available to strategy-scoped detectors
#[derive(Debug, Clone, Copy)]
pub struct StrategyInputs<'a> {
    pub strategy: &'a str,
    pub history: &'a VecDeque<String>,
    pub settings: &'a SignalsConfig,
}

/// Share of the last `repetition_window` selections that used this strategy
pub(crate) fn detect_strategy_repetition(inputs: &StrategyInputs<'_>) -> SignalValue {
    let window = inputs.settings.repetition_window.max(1);
    if inputs.history.is_empty() {
        return SignalValue::unit(0.0);
    }
    let uses = inputs
        .history
        .iter()
        .rev()
        .take(window)
        .filter(|s| s.as_str() == inputs.strategy)
        .count();
    SignalValue::unit(uses as f64 / window as f64)
}

/// Turns since the strategy was last selected, relative to the window.
/// Never-used strategies read 1.0.
pub(crate) fn detect_turns_since_strategy(inputs: &StrategyInputs<'_>) -> SignalValue {
    let window = inputs.settings.repetition_window.max(1);
    match inputs
        .history
        .iter()
        .rev()
        .position(|s| s == inputs.strategy)
    {
        Some(age) => SignalValue::unit((age + 1) as f64 / window as f64),
        None => SignalValue::unit(1.0),
    }
}
