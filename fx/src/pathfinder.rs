//! Conversion path search over a rate graph.
//!
//! Two searches are offered:
//!
//! - [`find_best_path`] runs a hop-bounded shortest-path search over
//!   `-ln(rate)` weights, turning "largest product of rates" into "smallest
//!   sum of weights". Working in log space keeps the search stable when rates
//!   span many orders of magnitude (crypto against fiat).
//! - [`find_all_paths`] enumerates bounded sets of simple paths with a
//!   backtracking depth-first search. It visits far more of the graph and
//!   should only be used when alternatives are actually wanted.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ratemesh_common::CurrencyCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edge::RateEdge;
use crate::graph::RateGraph;

/// Limits for the best-path search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathOptions {
    /// Longest acceptable path, in edges.
    pub max_hops: usize,
    /// Edges below this confidence are ignored.
    pub min_confidence: f64,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_hops: 5,
            min_confidence: 0.1,
        }
    }
}

/// Limits for path enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchLimits {
    /// Longest path enumerated, in edges.
    pub max_hops: usize,
    /// Stop after this many paths.
    pub max_results: usize,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_hops: 4,
            max_results: 10,
        }
    }
}

/// A conversion path and the edges it traverses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Currencies visited, both endpoints included.
    pub path: Vec<CurrencyCode>,
    /// Product of the traversed edges' rates.
    pub total_rate: f64,
    pub hops: usize,
    pub edges: Vec<RateEdge>,
}

impl PathResult {
    /// Build a result from edges laid end to end, starting at `start`.
    pub fn from_edges(start: CurrencyCode, edges: Vec<RateEdge>) -> Self {
        let mut path = Vec::with_capacity(edges.len() + 1);
        path.push(start);
        path.extend(edges.iter().map(|edge| edge.to.clone()));

        Self {
            path,
            total_rate: edges.iter().map(|edge| edge.rate).product(),
            hops: edges.len(),
            edges,
        }
    }
}

/// Search state: a currency together with the number of edges used to reach it.
type State<'a> = (&'a CurrencyCode, usize);

/// Two distances closer than this are treated as the same rate when picking
/// between hop counts.
const HOP_TIE_TOLERANCE: f64 = 1e-12;

/// Heap entry; ordered so `BinaryHeap` pops the smallest distance first and,
/// among equal distances, the earliest pushed.
struct QueueEntry<'a> {
    distance: f64,
    seq: u64,
    node: &'a CurrencyCode,
    hops: usize,
}

impl PartialEq for QueueEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry<'_> {}

impl Ord for QueueEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the path from `from` to `to` with the highest cumulative rate using
/// at most `max_hops` edges.
///
/// Returns `None` when either endpoint is missing from the graph or when the
/// target cannot be reached within `max_hops` through edges meeting
/// `min_confidence`.
///
/// Labels are kept per `(currency, hops)` and re-expanded whenever they
/// improve, so rates above 1 (negative weights) are handled exactly. Hop
/// counts only grow, which bounds the search even on cycles whose rates
/// multiply to more than 1. Such a cycle is followed when it fits within the
/// hop limit. Among hop counts reaching the same rate the fewest wins, and
/// equal-distance ties keep the first path discovered.
pub fn find_best_path(
    graph: &RateGraph,
    from: &CurrencyCode,
    to: &CurrencyCode,
    options: &PathOptions,
) -> Option<PathResult> {
    let source = graph.node(from)?;
    let target = graph.node(to)?;

    if source == target {
        return Some(PathResult::from_edges(source.clone(), Vec::new()));
    }

    let mut distances: HashMap<State<'_>, f64> = HashMap::new();
    let mut reached_by: HashMap<State<'_>, &RateEdge> = HashMap::new();
    let mut queue = BinaryHeap::new();
    let mut seq = 0u64;

    distances.insert((source, 0), 0.0);
    queue.push(QueueEntry {
        distance: 0.0,
        seq,
        node: source,
        hops: 0,
    });

    while let Some(QueueEntry {
        distance,
        node,
        hops,
        ..
    }) = queue.pop()
    {
        // Superseded by a better label for the same state.
        if distances
            .get(&(node, hops))
            .is_some_and(|&known| distance > known)
        {
            continue;
        }
        if hops >= options.max_hops {
            continue;
        }

        for edge in graph.neighbors(node) {
            if edge.confidence < options.min_confidence {
                continue;
            }

            let state = (&edge.to, hops + 1);
            let candidate = distance + edge.weight();
            let known = distances.get(&state).copied().unwrap_or(f64::INFINITY);
            if candidate < known {
                distances.insert(state, candidate);
                reached_by.insert(state, edge);
                seq += 1;
                queue.push(QueueEntry {
                    distance: candidate,
                    seq,
                    node: &edge.to,
                    hops: hops + 1,
                });
            }
        }
    }

    let mut best: Option<(usize, f64)> = None;
    for hops in 1..=options.max_hops {
        let Some(&distance) = distances.get(&(target, hops)) else {
            continue;
        };
        match best {
            Some((_, current)) if distance >= current - HOP_TIE_TOLERANCE => {}
            _ => best = Some((hops, distance)),
        }
    }

    let Some((hops, _)) = best else {
        debug!(
            from = %from,
            to = %to,
            max_hops = options.max_hops,
            "No path within hop limit"
        );
        return None;
    };

    let mut edges = Vec::with_capacity(hops);
    let mut current = target;
    for remaining in (1..=hops).rev() {
        let edge: &RateEdge = *reached_by.get(&(current, remaining))?;
        edges.push(edge.clone());
        current = &edge.from;
    }
    edges.reverse();

    Some(PathResult::from_edges(source.clone(), edges))
}

/// Enumerate simple paths from `from` to `to`, best rate first.
///
/// At most `max_results` paths of at most `max_hops` edges are collected,
/// in depth-first discovery order, then sorted by descending total rate.
pub fn find_all_paths(
    graph: &RateGraph,
    from: &CurrencyCode,
    to: &CurrencyCode,
    limits: &SearchLimits,
) -> Vec<PathResult> {
    let mut results = Vec::new();

    let (Some(source), Some(target)) = (graph.node(from), graph.node(to)) else {
        return results;
    };
    if limits.max_results == 0 {
        return results;
    }

    let mut search = PathSearch {
        graph,
        source,
        target,
        limits,
        on_path: HashSet::new(),
        stack: Vec::new(),
        results: &mut results,
    };
    search.walk(source);

    results.sort_by(|a, b| b.total_rate.total_cmp(&a.total_rate));
    results
}

struct PathSearch<'g, 'r> {
    graph: &'g RateGraph,
    source: &'g CurrencyCode,
    target: &'g CurrencyCode,
    limits: &'r SearchLimits,
    on_path: HashSet<&'g CurrencyCode>,
    stack: Vec<&'g RateEdge>,
    results: &'r mut Vec<PathResult>,
}

impl<'g> PathSearch<'g, '_> {
    fn walk(&mut self, current: &'g CurrencyCode) {
        if self.results.len() >= self.limits.max_results {
            return;
        }

        if current == self.target && !self.stack.is_empty() {
            let edges = self.stack.iter().map(|edge| (*edge).clone()).collect();
            self.results
                .push(PathResult::from_edges(self.source.clone(), edges));
            return;
        }

        if self.stack.len() >= self.limits.max_hops {
            return;
        }

        self.on_path.insert(current);
        let graph = self.graph;
        for edge in graph.neighbors(current) {
            if self.on_path.contains(&edge.to) {
                continue;
            }

            self.stack.push(edge);
            self.walk(&edge.to);
            self.stack.pop();

            if self.results.len() >= self.limits.max_results {
                break;
            }
        }
        self.on_path.remove(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Provenance;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use ratemesh_common::ProviderId;

    fn edge(from: &str, to: &str, rate: f64, confidence: f64) -> RateEdge {
        RateEdge::new(
            from.into(),
            to.into(),
            rate,
            Provenance::new(
                ProviderId::new("test"),
                "TEST",
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ),
            confidence,
        )
        .unwrap()
    }

    fn codes(path: &[CurrencyCode]) -> Vec<&str> {
        path.iter().map(|c| c.code()).collect()
    }

    fn crypto_graph() -> RateGraph {
        RateGraph::from_edges(vec![
            edge("BTC", "ETH", 15.0, 0.9),
            edge("ETH", "USDT", 2000.0, 0.9),
            edge("USDT", "USD", 1.0, 0.9),
        ])
    }

    #[test]
    fn test_best_path_through_intermediaries() {
        let graph = crypto_graph();
        let result = find_best_path(&graph, &"BTC".into(), &"USD".into(), &PathOptions::default())
            .unwrap();

        assert_eq!(codes(&result.path), vec!["BTC", "ETH", "USDT", "USD"]);
        assert_eq!(result.hops, 3);
        assert_eq!(result.edges.len(), 3);
        assert_eq!(result.total_rate, 15.0 * 2000.0 * 1.0);
    }

    #[test]
    fn test_best_path_prefers_higher_product_over_fewer_hops() {
        let graph = RateGraph::from_edges(vec![
            edge("GBP", "USD", 1.20, 1.0),
            edge("GBP", "EUR", 0.95, 1.0),
            edge("EUR", "CHF", 0.99, 1.0),
            edge("CHF", "USD", 0.98, 1.0),
            edge("EUR", "USD", 0.90, 1.0),
        ]);
        // Direct beats both detours here.
        let direct = find_best_path(&graph, &"GBP".into(), &"USD".into(), &PathOptions::default())
            .unwrap();
        assert_eq!(codes(&direct.path), vec!["GBP", "USD"]);

        let graph = RateGraph::from_edges(vec![
            edge("GBP", "USD", 0.50, 1.0),
            edge("GBP", "EUR", 0.95, 1.0),
            edge("EUR", "USD", 0.90, 1.0),
        ]);
        let detour = find_best_path(&graph, &"GBP".into(), &"USD".into(), &PathOptions::default())
            .unwrap();
        assert_eq!(codes(&detour.path), vec!["GBP", "EUR", "USD"]);
        assert!((detour.total_rate - 0.95 * 0.90).abs() < 1e-12);
    }

    #[test]
    fn test_low_confidence_edges_are_ignored() {
        let graph = RateGraph::from_edges(vec![
            edge("AAA", "BBB", 0.9, 0.05),
            edge("AAA", "CCC", 0.5, 0.9),
            edge("CCC", "BBB", 0.5, 0.9),
        ]);
        let result = find_best_path(&graph, &"AAA".into(), &"BBB".into(), &PathOptions::default())
            .unwrap();
        assert_eq!(codes(&result.path), vec!["AAA", "CCC", "BBB"]);

        let strict = PathOptions {
            min_confidence: 0.95,
            ..Default::default()
        };
        assert!(find_best_path(&graph, &"AAA".into(), &"BBB".into(), &strict).is_none());
    }

    #[test]
    fn test_hop_limit() {
        let graph = crypto_graph();
        let two_hops = PathOptions {
            max_hops: 2,
            ..Default::default()
        };
        assert!(find_best_path(&graph, &"BTC".into(), &"USD".into(), &two_hops).is_none());

        let three_hops = PathOptions {
            max_hops: 3,
            ..Default::default()
        };
        assert!(find_best_path(&graph, &"BTC".into(), &"USD".into(), &three_hops).is_some());
    }

    #[test]
    fn test_unknown_or_unreachable_endpoints() {
        let graph = crypto_graph();
        let options = PathOptions::default();
        assert!(find_best_path(&graph, &"XYZ".into(), &"USD".into(), &options).is_none());
        assert!(find_best_path(&graph, &"BTC".into(), &"XYZ".into(), &options).is_none());
        // Edges are directional.
        assert!(find_best_path(&graph, &"USD".into(), &"BTC".into(), &options).is_none());
    }

    #[test]
    fn test_arbitrage_loop_terminates_within_hop_limit() {
        let graph = RateGraph::from_edges(vec![
            edge("AAA", "BBB", 2.0, 1.0),
            edge("BBB", "AAA", 0.6, 1.0),
            edge("BBB", "CCC", 1.0, 1.0),
        ]);
        // The AAA -> BBB -> AAA loop multiplies to 1.2, so one lap pays off.
        let result = find_best_path(&graph, &"AAA".into(), &"CCC".into(), &PathOptions::default())
            .unwrap();
        assert_eq!(codes(&result.path), vec!["AAA", "BBB", "AAA", "BBB", "CCC"]);
        assert_eq!(result.hops, 4);
        assert!((result.total_rate - 2.4).abs() < 1e-12);

        let short = PathOptions {
            max_hops: 3,
            ..Default::default()
        };
        let result = find_best_path(&graph, &"AAA".into(), &"CCC".into(), &short).unwrap();
        assert_eq!(codes(&result.path), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(result.total_rate, 2.0);
    }

    #[test]
    fn test_best_path_revisits_node_reached_cheaply_first() {
        let graph = RateGraph::from_edges(vec![
            edge("AAA", "BBB", 1.0, 1.0),
            edge("AAA", "CCC", 0.5, 1.0),
            edge("CCC", "BBB", 10.0, 1.0),
            edge("BBB", "DDD", 0.5, 1.0),
        ]);
        let options = PathOptions::default();
        let best = find_best_path(&graph, &"AAA".into(), &"DDD".into(), &options).unwrap();
        assert_eq!(codes(&best.path), vec!["AAA", "CCC", "BBB", "DDD"]);
        assert!((best.total_rate - 2.5).abs() < 1e-12);

        let all = find_all_paths(&graph, &"AAA".into(), &"DDD".into(), &SearchLimits::default());
        assert!(best.total_rate >= all[0].total_rate);
    }

    #[test]
    fn test_equal_rates_prefer_fewer_hops() {
        let graph = RateGraph::from_edges(vec![
            edge("AAA", "CCC", 2.0, 1.0),
            edge("CCC", "BBB", 1.0, 1.0),
            edge("AAA", "BBB", 2.0, 1.0),
        ]);
        let result = find_best_path(&graph, &"AAA".into(), &"BBB".into(), &PathOptions::default())
            .unwrap();
        assert_eq!(codes(&result.path), vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_all_paths_sorted_and_bounded() {
        let graph = RateGraph::from_edges(vec![
            edge("GBP", "USD", 1.25, 1.0),
            edge("GBP", "EUR", 1.17, 1.0),
            edge("EUR", "USD", 1.08, 1.0),
            edge("GBP", "CHF", 1.10, 1.0),
            edge("CHF", "USD", 1.12, 1.0),
            edge("EUR", "CHF", 0.95, 1.0),
        ]);

        let all = find_all_paths(&graph, &"GBP".into(), &"USD".into(), &SearchLimits::default());
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].total_rate >= w[1].total_rate));
        assert_eq!(codes(&all[0].path), vec!["GBP", "EUR", "USD"]);

        let limited = SearchLimits {
            max_results: 2,
            ..Default::default()
        };
        assert_eq!(find_all_paths(&graph, &"GBP".into(), &"USD".into(), &limited).len(), 2);

        let one_hop = SearchLimits {
            max_hops: 1,
            ..Default::default()
        };
        let direct = find_all_paths(&graph, &"GBP".into(), &"USD".into(), &one_hop);
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].hops, 1);
    }

    #[test]
    fn test_all_paths_same_endpoint_is_empty() {
        let graph = RateGraph::from_edges(vec![
            edge("AAA", "BBB", 2.0, 1.0),
            edge("BBB", "AAA", 0.5, 1.0),
        ]);
        assert!(find_all_paths(&graph, &"AAA".into(), &"AAA".into(), &SearchLimits::default())
            .is_empty());
    }

    fn arb_graph() -> impl Strategy<Value = (RateGraph, usize)> {
        (2usize..6).prop_flat_map(|n| {
            let edges = prop::collection::vec((0..n, 0..n, 0.01f64..100.0), 0..(n * n));
            (Just(n), edges)
        })
        .prop_map(|(n, raw)| {
            let edges = raw
                .into_iter()
                .filter(|(a, b, _)| a != b)
                .map(|(a, b, rate)| edge(&format!("N{a}"), &format!("N{b}"), rate, 1.0));
            let mut graph = RateGraph::from_edges(edges);
            // Ensure both query endpoints exist even without edges.
            graph.add_edge(edge("N0", "N0X", 0.01, 1.0));
            graph.add_edge(edge(&format!("N{}", n - 1), "N0X", 0.01, 1.0));
            (graph, n)
        })
    }

    proptest! {
        #[test]
        fn prop_best_path_is_optimal((graph, n) in arb_graph()) {
            let from = CurrencyCode::new("N0");
            let to = CurrencyCode::new(format!("N{}", n - 1));
            let options = PathOptions { max_hops: n + 1, min_confidence: 0.0 };
            let limits = SearchLimits { max_hops: n + 1, max_results: usize::MAX };

            let best = find_best_path(&graph, &from, &to, &options);
            let all = find_all_paths(&graph, &from, &to, &limits);

            match best {
                None => prop_assert!(all.is_empty()),
                Some(best) => {
                    let product: f64 = best.edges.iter().map(|e| e.rate).product();
                    prop_assert_eq!(best.total_rate, product);
                    prop_assert_eq!(best.path.len(), best.hops + 1);
                    for other in &all {
                        prop_assert!(best.total_rate >= other.total_rate * (1.0 - 1e-9));
                    }
                }
            }
        }

        #[test]
        fn prop_all_paths_are_simple_and_sorted((graph, n) in arb_graph(), max_results in 1usize..6) {
            let from = CurrencyCode::new("N0");
            let to = CurrencyCode::new(format!("N{}", n - 1));
            let limits = SearchLimits { max_hops: 4, max_results };

            let all = find_all_paths(&graph, &from, &to, &limits);
            prop_assert!(all.len() <= max_results);
            prop_assert!(all.windows(2).all(|w| w[0].total_rate >= w[1].total_rate));
            for p in &all {
                let unique: HashSet<_> = p.path.iter().collect();
                prop_assert_eq!(unique.len(), p.path.len());
                prop_assert!(p.hops <= 4);
                prop_assert_eq!(p.path.first(), Some(&from));
                prop_assert_eq!(p.path.last(), Some(&to));
            }
        }
    }
}
