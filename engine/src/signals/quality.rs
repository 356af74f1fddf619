//! Response-quality signals (`llm.*`)
//!
//! The response-quality collaborator is called once per turn through
//! [`assess_with_timeout`]. A failure or timeout never fails the turn: the
//! neutral assessment is used and the error is handed back for the turn's
//! degradation list.
//!
//! [`HeuristicQualityDetector`] is the built-in collaborator. It scores a
//! response from lexical cues only and is what the CLI uses when no other
//! detector is wired in.

use super::SignalValue;
use async_trait::async_trait;
use regex::Regex;
use sdk::errors::EngineError;
use sdk::quality::{QualityAssessment, ResponseQualityDetector};
use sdk::types::ResponseDepth;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one bounded quality assessment
#[derive(Debug)]
pub struct QualityOutcome {
    /// The detector's assessment, or neutral on failure
    pub assessment: QualityAssessment,
    /// Why the neutral assessment was substituted, if it was
    pub error: Option<EngineError>,
}

/// Call `detector` with a deadline of `timeout_ms` milliseconds.
pub async fn assess_with_timeout(
    detector: &dyn ResponseQualityDetector,
    response: &str,
    question: &str,
    timeout_ms: u64,
) -> QualityOutcome {
    let result = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        detector.assess(response, question),
    )
    .await;

    match result {
        Ok(Ok(assessment)) => {
            debug!("Quality detector {} succeeded", detector.name());
            QualityOutcome {
                assessment: assessment.normalized(),
                error: None,
            }
        }
        Ok(Err(e)) => {
            warn!("Quality detector {} failed: {}", detector.name(), e);
            QualityOutcome {
                assessment: QualityAssessment::neutral(),
                error: Some(e),
            }
        }
        Err(_) => {
            warn!(
                "Quality detector {} timed out after {}ms",
                detector.name(),
                timeout_ms
            );
            QualityOutcome {
                assessment: QualityAssessment::neutral(),
                error: Some(EngineError::QualityTimeout(timeout_ms)),
            }
        }
    }
}

pub(crate) fn detect_response_depth(q: &QualityAssessment) -> SignalValue {
    SignalValue::unit(q.depth)
}

pub(crate) fn detect_depth_bucket(q: &QualityAssessment) -> SignalValue {
    SignalValue::category(q.depth_bucket.bucket())
}

pub(crate) fn detect_specificity(q: &QualityAssessment) -> SignalValue {
    SignalValue::unit(q.specificity)
}

pub(crate) fn detect_certainty(q: &QualityAssessment) -> SignalValue {
    SignalValue::unit(q.certainty)
}

pub(crate) fn detect_valence(q: &QualityAssessment) -> SignalValue {
    SignalValue::unit(q.valence)
}

pub(crate) fn detect_engagement(q: &QualityAssessment) -> SignalValue {
    SignalValue::unit(q.engagement)
}

/// Lexical response scorer
///
/// Counts cue phrases and scales by response length. All patterns are
/// case-insensitive and word-bounded.
///
/// # Example
///
/// ```
/// use elicit_engine::signals::HeuristicQualityDetector;
///
/// let detector = HeuristicQualityDetector::new().unwrap();
/// let q = detector.score("I buy it because it saves me time, which means I can rest.", "");
/// assert!(q.depth > 0.3);
/// ```
pub struct HeuristicQualityDetector {
    reasoning: Regex,
    concrete: Regex,
    vague: Regex,
    hedges: Regex,
    assertive: Regex,
    positive: Regex,
    negative: Regex,
    dismissive: Regex,
}

/// Word count at which length stops adding depth
const DEPTH_WORDS: f64 = 60.0;
/// Word count at which length stops adding engagement
const ENGAGEMENT_WORDS: f64 = 40.0;

impl HeuristicQualityDetector {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            reasoning: Regex::new(
                r"(?i)\b(because|so that|which means|in order to|that's why|since|therefore|the reason)\b",
            )?,
            concrete: Regex::new(
                r"(?i)(\d+|\bfor example\b|\bfor instance\b|\bspecifically\b|\be\.g\.|\blike when\b|\bsuch as\b)",
            )?,
            vague: Regex::new(r"(?i)\b(stuff|things|whatever|kind of|sort of|something)\b")?,
            hedges: Regex::new(
                r"(?i)\b(maybe|perhaps|i guess|not sure|i think|probably|might|possibly)\b",
            )?,
            assertive: Regex::new(r"(?i)\b(definitely|always|certainly|absolutely|never|clearly)\b")?,
            positive: Regex::new(r"(?i)\b(love|like|enjoy|great|good|happy|glad|prefer)\b")?,
            negative: Regex::new(
                r"(?i)\b(hate|dislike|annoying|bad|frustrat\w*|worried|afraid|awful)\b",
            )?,
            dismissive: Regex::new(r"(?i)\b(i don't know|no idea|dunno|no comment|pass)\b")?,
        })
    }

    /// Score a response synchronously
    pub fn score(&self, response: &str, _question: &str) -> QualityAssessment {
        let words = response.split_whitespace().count() as f64;
        if words == 0.0 {
            return QualityAssessment {
                depth: 0.0,
                specificity: 0.0,
                certainty: 0.5,
                valence: 0.5,
                engagement: 0.0,
                depth_bucket: ResponseDepth::Shallow,
            };
        }

        let hits = |re: &Regex| re.find_iter(response).count() as f64;

        let reasoning = hits(&self.reasoning);
        let depth = 0.5 * (words / DEPTH_WORDS).min(1.0) + 0.5 * (reasoning / 2.0).min(1.0);

        let specificity =
            0.4 + 0.2 * hits(&self.concrete).min(3.0) - 0.15 * hits(&self.vague).min(3.0);

        let certainty =
            0.6 - 0.15 * hits(&self.hedges).min(4.0) + 0.1 * hits(&self.assertive).min(3.0);

        let positive = hits(&self.positive);
        let negative = hits(&self.negative);
        let valence = if positive + negative == 0.0 {
            0.5
        } else {
            0.5 + 0.5 * (positive - negative) / (positive + negative)
        };

        let mut engagement = (words / ENGAGEMENT_WORDS).min(1.0);
        if self.dismissive.is_match(response) {
            engagement *= 0.3;
        }

        QualityAssessment {
            depth,
            specificity,
            certainty,
            valence,
            engagement,
            depth_bucket: ResponseDepth::from_score(depth),
        }
        .normalized()
    }
}

#[async_trait]
impl ResponseQualityDetector for HeuristicQualityDetector {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn assess(
        &self,
        response: &str,
        question: &str,
    ) -> Result<QualityAssessment, EngineError> {
        Ok(self.score(response, question))
    }
}
