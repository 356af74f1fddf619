//! Session-level meta signals (`meta.*`)

use super::registry::GlobalInputs;
use super::{SignalMap, SignalName, SignalValue};

pub(crate) fn detect_phase(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::category(inputs.phase.as_str())
}

pub(crate) fn detect_saturation(inputs: &GlobalInputs<'_>, _: &SignalMap) -> SignalValue {
    SignalValue::unit(inputs.saturation.score)
}

pub(crate) fn detect_saturated(inputs: &GlobalInputs<'_>, computed: &SignalMap) -> SignalValue {
    let score = computed
        .get(&SignalName::Saturation)
        .and_then(SignalValue::as_f64)
        .unwrap_or(inputs.saturation.score);
    SignalValue::Bool(score >= inputs.settings.saturated_threshold)
}
