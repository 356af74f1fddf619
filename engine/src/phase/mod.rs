//! Phase Detector
//!
//! Classifies the conversation into a coarse progress bucket used to reweight
//! strategies. The detector is a three-state machine:
//!
//! - **early**: small graphs (initial state)
//! - **mid**: everything in between
//! - **late**: graph size or saturation above the upper thresholds (terminal)
//!
//! Transitions only move forward. A graph that shrinks (e.g. after canonical
//! merging upstream) does not send the session back to an earlier phase.

use crate::config::PhasesConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Coarse conversation progress bucket
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Early,
    Mid,
    Late,
}

impl Phase {
    /// Category label used by the `meta.phase` signal
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Early => "early",
            Phase::Mid => "mid",
            Phase::Late => "late",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Late)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward-only phase state machine
#[derive(Debug, Clone)]
pub struct PhaseDetector<'a> {
    config: &'a PhasesConfig,
}

impl<'a> PhaseDetector<'a> {
    pub fn new(config: &'a PhasesConfig) -> Self {
        Self { config }
    }

    /// Phase the raw measurements point at, ignoring history
    pub fn classify(&self, concept_count: usize, saturation: f64) -> Phase {
        if concept_count >= self.config.late_min_concepts
            || saturation >= self.config.late_saturation
        {
            Phase::Late
        } else if concept_count < self.config.early_max_concepts {
            Phase::Early
        } else {
            Phase::Mid
        }
    }

    /// Advance from `current`; never moves backwards and never leaves `Late`
    pub fn advance(&self, current: Phase, concept_count: usize, saturation: f64) -> Phase {
        if current.is_terminal() {
            return current;
        }

        let next = self.classify(concept_count, saturation).max(current);
        if next != current {
            info!(
                "Phase transition {} -> {} ({} concepts, saturation {:.2})",
                current, next, concept_count, saturation
            );
        }
        next
    }
}
