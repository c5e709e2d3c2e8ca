//! In-memory rate graph over currency codes.

use std::collections::{BTreeMap, BTreeSet};

use ratemesh_common::CurrencyCode;

use crate::edge::RateEdge;

/// Directed graph of rate edges, at most one edge per ordered pair.
///
/// Ordered maps keep neighbour iteration stable, so path-finding
/// tie-breaks depend only on graph contents.
#[derive(Debug, Clone, Default)]
pub struct RateGraph {
    nodes: BTreeSet<CurrencyCode>,
    edges: BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, RateEdge>>,
}

impl RateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a set of candidate edges.
    pub fn from_edges(edges: impl IntoIterator<Item = RateEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add_edge(edge);
        }
        graph
    }

    /// Merge a candidate edge into the graph.
    ///
    /// Both endpoints become nodes whether or not the candidate is kept.
    /// An existing edge for the same pair is replaced only by a candidate
    /// with strictly higher confidence. Returns `true` if the candidate was
    /// stored.
    pub fn add_edge(&mut self, candidate: RateEdge) -> bool {
        self.nodes.insert(candidate.from.clone());
        self.nodes.insert(candidate.to.clone());

        let outgoing = self.edges.entry(candidate.from.clone()).or_default();
        match outgoing.get(&candidate.to) {
            Some(existing) if candidate.confidence <= existing.confidence => false,
            _ => {
                outgoing.insert(candidate.to.clone(), candidate);
                true
            }
        }
    }

    /// Whether `code` is a node.
    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.nodes.contains(code)
    }

    /// The graph's own copy of a node code.
    pub fn node(&self, code: &CurrencyCode) -> Option<&CurrencyCode> {
        self.nodes.get(code)
    }

    /// Edge for the ordered pair, if any.
    pub fn edge(&self, from: &CurrencyCode, to: &CurrencyCode) -> Option<&RateEdge> {
        self.edges.get(from).and_then(|outgoing| outgoing.get(to))
    }

    /// Outgoing edges of `code`, ordered by target code.
    pub fn neighbors<'a>(&'a self, code: &CurrencyCode) -> impl Iterator<Item = &'a RateEdge> + 'a {
        self.edges
            .get(code)
            .into_iter()
            .flat_map(|outgoing| outgoing.values())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &RateEdge> {
        self.edges.values().flat_map(|outgoing| outgoing.values())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|outgoing| outgoing.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
