//! Conversation saturation
//!
//! Saturation estimates how close the whole conversation is to diminishing
//! returns:
//!
//! ```text
//! saturation     = 0.60 * velocity_decay + 0.25 * edge_density_norm + 0.15 * turn_floor
//! velocity_decay = 1 - ewma / max(peak, 1)
//! ewma'          = alpha * delta + (1 - alpha) * ewma,  delta = max(count - prev_count, 0)
//! peak'          = max(peak, delta)
//! ```
//!
//! The velocity trackers are persisted with the session.

use crate::config::SignalsConfig;
use serde::{Deserialize, Serialize};

const VELOCITY_WEIGHT: f64 = 0.60;
const DENSITY_WEIGHT: f64 = 0.25;
const TURN_WEIGHT: f64 = 0.15;

/// Persisted EWMA/peak state for concept-growth velocity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SaturationTracker {
    pub ewma: f64,
    pub peak: f64,
    pub prev_count: usize,
}

/// One turn's saturation breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SaturationReading {
    pub delta: usize,
    pub velocity_decay: f64,
    pub edge_density_norm: f64,
    pub turn_floor: f64,
    pub score: f64,
}

impl SaturationTracker {
    /// Fold this turn's concept count into the velocity trackers
    pub fn observe(&mut self, concept_count: usize, alpha: f64) -> usize {
        let delta = concept_count.saturating_sub(self.prev_count);
        self.ewma = alpha * delta as f64 + (1.0 - alpha) * self.ewma;
        self.peak = self.peak.max(delta as f64);
        self.prev_count = concept_count;
        delta
    }

    pub fn velocity_decay(&self) -> f64 {
        (1.0 - self.ewma / self.peak.max(1.0)).clamp(0.0, 1.0)
    }

    /// Update with the turn's graph size and compute the saturation score
    pub fn update(
        &mut self,
        concept_count: usize,
        edge_density: f64,
        turn: u32,
        settings: &SignalsConfig,
    ) -> SaturationReading {
        let delta = self.observe(concept_count, settings.velocity_alpha);
        self.reading(delta, edge_density, turn, settings)
    }

    /// Saturation from the current tracker state without observing a new count
    pub fn reading(
        &self,
        delta: usize,
        edge_density: f64,
        turn: u32,
        settings: &SignalsConfig,
    ) -> SaturationReading {
        let velocity_decay = self.velocity_decay();
        let edge_density_norm = ratio(edge_density, settings.target_edge_density);
        let turn_floor = ratio(turn as f64, settings.turn_floor as f64);
        let score = VELOCITY_WEIGHT * velocity_decay
            + DENSITY_WEIGHT * edge_density_norm
            + TURN_WEIGHT * turn_floor;

        SaturationReading {
            delta,
            velocity_decay,
            edge_density_norm,
            turn_floor,
            score: score.clamp(0.0, 1.0),
        }
    }
}

fn ratio(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 1.0;
    }
    (value / target).clamp(0.0, 1.0)
}
