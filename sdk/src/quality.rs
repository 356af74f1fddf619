//! Response-quality collaborator contract
//!
//! A response-quality detector scores the latest response (given the question
//! that prompted it) on five [0,1] axes and one depth bucket. Implementations
//! may call out to a model or service; the engine bounds every call with a
//! timeout and substitutes [`QualityAssessment::neutral`] on failure.

use crate::errors::EngineError;
use crate::types::ResponseDepth;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scores produced for a single response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// How far below the surface the response goes
    pub depth: f64,
    /// Concrete detail versus generalities
    pub specificity: f64,
    /// Confidence expressed by the respondent
    pub certainty: f64,
    /// Emotional tone, 0 = negative, 0.5 = neutral, 1 = positive
    pub valence: f64,
    /// Willingness to elaborate
    pub engagement: f64,
    /// Categorical depth label
    pub depth_bucket: ResponseDepth,
}

impl QualityAssessment {
    /// The neutral assessment used when the detector fails or times out.
    pub fn neutral() -> Self {
        Self {
            depth: 0.5,
            specificity: 0.5,
            certainty: 0.5,
            valence: 0.5,
            engagement: 0.5,
            depth_bucket: ResponseDepth::Moderate,
        }
    }

    /// Clamp every score into [0,1]; collaborators are not trusted to do so.
    pub fn normalized(mut self) -> Self {
        self.depth = clamp_unit(self.depth);
        self.specificity = clamp_unit(self.specificity);
        self.certainty = clamp_unit(self.certainty);
        self.valence = clamp_unit(self.valence);
        self.engagement = clamp_unit(self.engagement);
        self
    }
}

impl Default for QualityAssessment {
    fn default() -> Self {
        Self::neutral()
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.5
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Trait that every response-quality detector implements
#[async_trait]
pub trait ResponseQualityDetector: Send + Sync {
    /// Returns the name of the detector (used in logs and degradation records)
    fn name(&self) -> &str;

    /// Score `response`, given the `question` that preceded it
    async fn assess(&self, response: &str, question: &str)
        -> Result<QualityAssessment, EngineError>;
}
