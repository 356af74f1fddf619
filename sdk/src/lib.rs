//! Elicit SDK
//!
//! Shared contracts between the decision engine and its collaborators: the
//! concept-graph types handed in each turn, the response-quality detector
//! trait, and the engine error type.

/// Error types and handling
pub mod errors;

/// Response-quality detector contract
pub mod quality;

/// Concept graph types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use quality::{QualityAssessment, ResponseQualityDetector};
pub use types::{Concept, ConceptEdge, GraphSnapshot, ResponseDepth};
