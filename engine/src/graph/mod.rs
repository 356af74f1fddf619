//! Graph aggregates
//!
//! Whole-graph measurements recomputed once per turn from the collaborator's
//! snapshot. Edges that reference concepts missing from the snapshot are
//! ignored rather than rejected.

use sdk::types::GraphSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Outgoing and incoming edge counts for one concept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degree {
    pub outgoing: u32,
    pub incoming: u32,
}

impl Degree {
    pub fn total(&self) -> u32 {
        self.outgoing + self.incoming
    }
}

/// Per-turn aggregates over the concept graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAggregates {
    pub concept_count: usize,
    pub edge_count: usize,
    /// Number of concepts on the longest chain of edges; a cycle counts
    /// each of its concepts once
    pub longest_chain: u32,
    /// A root concept reaches a terminal concept
    pub has_complete_chain: bool,
    /// Concepts with no edges at all
    pub orphan_count: usize,
    /// Edges per concept
    pub edge_density: f64,
    #[serde(skip)]
    pub degrees: BTreeMap<String, Degree>,
}

impl GraphAggregates {
    pub fn compute(graph: &GraphSnapshot) -> Self {
        let known: HashSet<&str> = graph.concepts.iter().map(|c| c.id.as_str()).collect();

        let mut degrees: BTreeMap<String, Degree> = graph
            .concepts
            .iter()
            .map(|c| (c.id.clone(), Degree::default()))
            .collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut edge_count = 0;

        for edge in &graph.edges {
            if !known.contains(edge.source.as_str()) || !known.contains(edge.target.as_str()) {
                continue;
            }
            edge_count += 1;
            if let Some(d) = degrees.get_mut(&edge.source) {
                d.outgoing += 1;
            }
            if let Some(d) = degrees.get_mut(&edge.target) {
                d.incoming += 1;
            }
            adjacency
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }

        let concept_count = graph.concepts.len();
        let orphan_count = degrees.values().filter(|d| d.total() == 0).count();
        let edge_density = if concept_count == 0 {
            0.0
        } else {
            edge_count as f64 / concept_count as f64
        };

        let longest_chain = longest_chain(graph, &adjacency);
        let has_complete_chain = has_complete_chain(graph, &adjacency, &degrees);

        Self {
            concept_count,
            edge_count,
            longest_chain,
            has_complete_chain,
            orphan_count,
            edge_density,
            degrees,
        }
    }

    pub fn degree(&self, concept_id: &str) -> Degree {
        self.degrees.get(concept_id).copied().unwrap_or_default()
    }
}

/// Longest path (in concepts) following edge direction.
///
/// Concepts on a cycle are collapsed into one strongly connected component
/// that counts every member, so `x <-> y` plus `z -> y` measures 3. The
/// component graph is acyclic and is walked without recursion.
fn longest_chain(graph: &GraphSnapshot, adjacency: &HashMap<&str, Vec<&str>>) -> u32 {
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for concept in &graph.concepts {
        let next = index_of.len();
        index_of.entry(concept.id.as_str()).or_insert(next);
    }
    let n = index_of.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (source, targets) in adjacency {
        if let Some(&from) = index_of.get(source) {
            successors[from].extend(targets.iter().filter_map(|t| index_of.get(t).copied()));
        }
    }

    let (component, count) = strongly_connected(&successors);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (node, &c) in component.iter().enumerate() {
        members[c].push(node);
    }

    // Components come out sinks first, so every edge leaving component `c`
    // points at a lower, already measured component.
    let mut longest = vec![0usize; count];
    for c in 0..count {
        let downstream = members[c]
            .iter()
            .flat_map(|&node| successors[node].iter())
            .map(|&target| component[target])
            .filter(|&other| other != c)
            .map(|other| longest[other])
            .max()
            .unwrap_or(0);
        longest[c] = members[c].len() + downstream;
    }

    longest
        .into_iter()
        .max()
        .map_or(0, |len| u32::try_from(len).unwrap_or(u32::MAX))
}

/// Tarjan's algorithm with an explicit call stack.
///
/// Returns the component of every node and the number of components,
/// numbered in reverse topological order.
fn strongly_connected(successors: &[Vec<usize>]) -> (Vec<usize>, usize) {
    const UNVISITED: usize = usize::MAX;

    let n = successors.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut component = vec![0usize; n];
    let mut count = 0;
    let mut next = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next;
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = calls.last_mut() {
            let node = frame.0;
            if let Some(&target) = successors[node].get(frame.1) {
                frame.1 += 1;
                if index[target] == UNVISITED {
                    index[target] = next;
                    low[target] = next;
                    next += 1;
                    stack.push(target);
                    on_stack[target] = true;
                    calls.push((target, 0));
                } else if on_stack[target] {
                    low[node] = low[node].min(index[target]);
                }
                continue;
            }

            calls.pop();
            if let Some(&(parent, _)) = calls.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] == index[node] {
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component[member] = count;
                    if member == node {
                        break;
                    }
                }
                count += 1;
            }
        }
    }

    (component, count)
}

fn has_complete_chain(
    graph: &GraphSnapshot,
    adjacency: &HashMap<&str, Vec<&str>>,
    degrees: &BTreeMap<String, Degree>,
) -> bool {
    let terminals: HashSet<&str> = graph
        .concepts
        .iter()
        .filter(|c| c.terminal)
        .map(|c| c.id.as_str())
        .collect();
    if terminals.is_empty() {
        return false;
    }

    let mut queue: VecDeque<&str> = graph
        .concepts
        .iter()
        .filter(|c| c.depth == 0 || degrees.get(&c.id).map_or(true, |d| d.incoming == 0))
        .map(|c| c.id.as_str())
        .collect();
    let mut seen: HashSet<&str> = queue.iter().copied().collect();

    while let Some(node) = queue.pop_front() {
        for &target in adjacency.get(node).into_iter().flatten() {
            if terminals.contains(target) {
                return true;
            }
            if seen.insert(target) {
                queue.push_back(target);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::{Concept, ConceptEdge};

    fn chain_graph() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                Concept::new("a", "price"),
                Concept::new("b", "saves money").with_depth(1),
                Concept::new("c", "security").with_depth(2).terminal(),
                Concept::new("d", "colour"),
            ],
            vec![ConceptEdge::new("a", "b"), ConceptEdge::new("b", "c")],
        )
    }

    #[test]
    fn test_counts_and_density() {
        let agg = GraphAggregates::compute(&chain_graph());
        assert_eq!(agg.concept_count, 4);
        assert_eq!(agg.edge_count, 2);
        assert_eq!(agg.orphan_count, 1);
        assert!((agg.edge_density - 0.5).abs() < 1e-9);
        assert_eq!(agg.degree("b"), Degree { outgoing: 1, incoming: 1 });
    }

    #[test]
    fn test_longest_chain_and_completion() {
        let agg = GraphAggregates::compute(&chain_graph());
        assert_eq!(agg.longest_chain, 3);
        assert!(agg.has_complete_chain);
    }

    #[test]
    fn test_no_terminal_means_incomplete() {
        let mut graph = chain_graph();
        graph.concepts[2].terminal = false;
        assert!(!GraphAggregates::compute(&graph).has_complete_chain);
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = GraphSnapshot::new(
            vec![Concept::new("x", "x"), Concept::new("y", "y")],
            vec![ConceptEdge::new("x", "y"), ConceptEdge::new("y", "x")],
        );
        let agg = GraphAggregates::compute(&graph);
        assert_eq!(agg.longest_chain, 2);
    }

    #[test]
    fn test_cycle_counts_every_member_once() {
        let graph = GraphSnapshot::new(
            vec![
                Concept::new("x", "x"),
                Concept::new("y", "y"),
                Concept::new("z", "z"),
            ],
            vec![
                ConceptEdge::new("x", "y"),
                ConceptEdge::new("y", "x"),
                ConceptEdge::new("z", "y"),
            ],
        );
        assert_eq!(GraphAggregates::compute(&graph).longest_chain, 3);

        // same graph, concepts listed so the search starts inside the cycle
        let mut reordered = graph.clone();
        reordered.concepts.reverse();
        assert_eq!(GraphAggregates::compute(&reordered).longest_chain, 3);
    }

    #[test]
    fn test_chain_continues_past_a_cycle() {
        let graph = GraphSnapshot::new(
            vec![
                Concept::new("a", "a"),
                Concept::new("b", "b"),
                Concept::new("c", "c"),
                Concept::new("d", "d"),
            ],
            vec![
                ConceptEdge::new("a", "b"),
                ConceptEdge::new("b", "c"),
                ConceptEdge::new("c", "b"),
                ConceptEdge::new("c", "d"),
            ],
        );
        assert_eq!(GraphAggregates::compute(&graph).longest_chain, 4);
    }

    #[test]
    fn test_long_chain_does_not_exhaust_the_stack() {
        const N: usize = 60_000;
        let concepts: Vec<Concept> = (0..N)
            .map(|i| Concept::new(format!("c{}", i), format!("c{}", i)))
            .collect();
        let edges: Vec<ConceptEdge> = (1..N)
            .map(|i| ConceptEdge::new(format!("c{}", i - 1), format!("c{}", i)))
            .collect();

        let agg = GraphAggregates::compute(&GraphSnapshot::new(concepts, edges));
        assert_eq!(agg.longest_chain, N as u32);
        assert_eq!(agg.edge_count, N - 1);
    }

    #[test]
    fn test_dangling_edges_ignored() {
        let graph = GraphSnapshot::new(
            vec![Concept::new("x", "x")],
            vec![ConceptEdge::new("x", "ghost")],
        );
        let agg = GraphAggregates::compute(&graph);
        assert_eq!(agg.edge_count, 0);
        assert_eq!(agg.orphan_count, 1);
    }

    #[test]
    fn test_empty_graph() {
        let agg = GraphAggregates::compute(&GraphSnapshot::default());
        assert_eq!(agg.longest_chain, 0);
        assert_eq!(agg.edge_density, 0.0);
        assert!(!agg.has_complete_chain);
    }
}
