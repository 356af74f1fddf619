//! Concept graph types
//!
//! The concept graph is owned by the extraction/graph collaborator. The engine
//! only ever reads these values; it never builds or deduplicates them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of the concept graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Stable identifier assigned by the graph collaborator
    pub id: String,

    /// Human-readable label
    pub label: String,

    /// Concept type (attribute, consequence, value, ...)
    #[serde(default, rename = "type")]
    pub concept_type: String,

    /// Depth in the elicitation ladder (0 = surface)
    #[serde(default)]
    pub depth: u32,

    /// Turn on which the concept was first extracted
    #[serde(default)]
    pub created_turn: u32,

    /// Whether the concept terminates a chain
    #[serde(default)]
    pub terminal: bool,
}

impl Concept {
    /// Create a surface-level concept with the given id and label
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            concept_type: String::new(),
            depth: 0,
            created_turn: 0,
            terminal: false,
        }
    }

    pub fn with_type(mut self, concept_type: impl Into<String>) -> Self {
        self.concept_type = concept_type.into();
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn created_on(mut self, turn: u32) -> Self {
        self.created_turn = turn;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

/// A directed relationship between two concepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub relation: String,
}

impl ConceptEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: String::new(),
        }
    }
}

/// Snapshot of the concept graph as handed over at the start of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub edges: Vec<ConceptEdge>,
}

impl GraphSnapshot {
    pub fn new(concepts: Vec<Concept>, edges: Vec<ConceptEdge>) -> Self {
        Self { concepts, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }
}

/// Coarse depth of a single response, as recorded in a concept's history.
///
/// `Shallow` is the shallowest bucket and the one the exhaustion detector counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseDepth {
    Shallow,
    Moderate,
    Deep,
}

impl ResponseDepth {
    /// Bucket a continuous depth score in [0,1].
    ///
    /// Below 1/3 is shallow, at or above 2/3 is deep.
    pub fn from_score(score: f64) -> Self {
        if score < 1.0 / 3.0 {
            ResponseDepth::Shallow
        } else if score < 2.0 / 3.0 {
            ResponseDepth::Moderate
        } else {
            ResponseDepth::Deep
        }
    }

    /// Category label used by the `llm.depth_bucket` signal
    pub fn bucket(&self) -> &'static str {
        match self {
            ResponseDepth::Shallow => "low",
            ResponseDepth::Moderate => "mid",
            ResponseDepth::Deep => "high",
        }
    }
}

impl fmt::Display for ResponseDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResponseDepth::Shallow => "shallow",
            ResponseDepth::Moderate => "moderate",
            ResponseDepth::Deep => "deep",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_from_score_buckets() {
        assert_eq!(ResponseDepth::from_score(0.0), ResponseDepth::Shallow);
        assert_eq!(ResponseDepth::from_score(0.5), ResponseDepth::Moderate);
        assert_eq!(ResponseDepth::from_score(0.9), ResponseDepth::Deep);
    }

    #[test]
    fn test_concept_deserializes_with_defaults() {
        let concept: Concept =
            serde_json::from_str(r#"{"id": "c1", "label": "price", "type": "attribute"}"#)
                .unwrap();
        assert_eq!(concept.concept_type, "attribute");
        assert_eq!(concept.depth, 0);
        assert!(!concept.terminal);
    }

    #[test]
    fn test_graph_lookup() {
        let graph = GraphSnapshot::new(
            vec![Concept::new("a", "A"), Concept::new("b", "B")],
            vec![ConceptEdge::new("a", "b")],
        );
        assert_eq!(graph.concept("b").map(|c| c.label.as_str()), Some("B"));
        assert!(graph.concept("z").is_none());
    }
}
