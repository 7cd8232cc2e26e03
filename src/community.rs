//! Louvain community detection.
//!
//! Multi-level modularity optimization on the undirected simple projection:
//! greedy local moves until a sweep changes nothing, then collapse every
//! community into a super-node and repeat on the aggregated graph.
//!
//! Membership is tracked in flat index arrays (node → community) so each
//! candidate move costs O(degree). Node visitation order is a shuffle drawn
//! from a seeded `StdRng`; ties between candidate communities go to the
//! lowest community index.

use crate::error::{ConvergenceWarning, Stage};
use crate::graph::{Direction, TransactionGraph};
use petgraph::graph::NodeIndex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Minimum modularity-gain improvement for a move to count.
const GAIN_EPSILON: f64 = 1e-10;

/// Disjoint node set produced by one detection run. Members are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Community {
    members: Vec<NodeIndex>,
}

impl Community {
    pub fn new(mut members: Vec<NodeIndex>) -> Self {
        members.sort_unstable();
        members.dedup();
        Self { members }
    }

    pub fn members(&self) -> &[NodeIndex] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, idx: NodeIndex) -> bool {
        self.members.binary_search(&idx).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LouvainConfig {
    /// Scales the expected-edges term. Above 1.0 favors smaller communities.
    pub resolution: f64,
    pub seed: u64,
    /// Cap on local-moving + aggregation passes.
    pub max_passes: usize,
    /// Cap on full node sweeps within one local-moving phase.
    pub max_sweeps: usize,
}

impl Default for LouvainConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            seed: 0,
            max_passes: 32,
            max_sweeps: 256,
        }
    }
}

/// Result of a detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Ordered by each community's lowest node index.
    pub communities: Vec<Community>,
    pub modularity: f64,
    pub passes: usize,
    pub warning: Option<ConvergenceWarning>,
}

/// Partition `graph` with the given resolution and seed.
pub fn detect_communities(graph: &TransactionGraph, resolution: f64, seed: u64) -> Detection {
    Louvain::new(LouvainConfig {
        resolution,
        seed,
        ..LouvainConfig::default()
    })
    .run(graph)
}

/// Weighted undirected graph for one aggregation level.
#[derive(Debug, Clone)]
struct LevelGraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
}

impl LevelGraph {
    fn from_graph(graph: &TransactionGraph) -> Self {
        let adjacency = graph
            .nodes()
            .map(|u| {
                graph
                    .neighbors(u, Direction::Undirected)
                    .iter()
                    .map(|v| (v.index(), 1.0))
                    .collect()
            })
            .collect();
        Self {
            adjacency,
            self_loops: vec![0.0; graph.node_count()],
        }
    }

    fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Weighted degree; a self-loop counts twice.
    fn strength(&self, node: usize) -> f64 {
        self.adjacency[node].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self.self_loops[node]
    }

    /// Collapse each community into one node. Internal weight becomes a self-loop.
    fn aggregate(&self, assignment: &[usize], count: usize) -> LevelGraph {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut self_loops = vec![0.0; count];

        for (node, edges) in self.adjacency.iter().enumerate() {
            let from = assignment[node];
            self_loops[from] += self.self_loops[node];
            for &(nbr, w) in edges {
                let to = assignment[nbr];
                if from == to {
                    // Seen once from each endpoint.
                    self_loops[from] += w / 2.0;
                } else {
                    *links[from].entry(to).or_insert(0.0) += w;
                }
            }
        }

        LevelGraph {
            adjacency: links.into_iter().map(|m| m.into_iter().collect()).collect(),
            self_loops,
        }
    }
}

struct LocalMoves {
    community: Vec<usize>,
    sweeps: usize,
    capped: bool,
}

/// Renumber community labels to `0..count` by first appearance.
fn renumber(community: &[usize]) -> (Vec<usize>, usize) {
    let mut label = vec![usize::MAX; community.len()];
    let mut next = 0;
    let assignment = community
        .iter()
        .map(|&c| {
            if label[c] == usize::MAX {
                label[c] = next;
                next += 1;
            }
            label[c]
        })
        .collect();
    (assignment, next)
}

#[derive(Debug, Clone, Default)]
pub struct Louvain {
    config: LouvainConfig,
}

impl Louvain {
    pub fn new(config: LouvainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LouvainConfig {
        &self.config
    }

    pub fn run(&self, graph: &TransactionGraph) -> Detection {
        let n = graph.node_count();
        let m = graph.undirected_edge_count() as f64;
        let mut membership: Vec<usize> = (0..n).collect();
        let mut passes = 0;
        let mut warning = None;

        if m > 0.0 {
            let two_m = 2.0 * m;
            let mut rng = StdRng::seed_from_u64(self.config.seed);
            let mut level = LevelGraph::from_graph(graph);
            let mut stable = false;
            let mut capped = false;

            while passes < self.config.max_passes {
                passes += 1;
                let moves = self.local_moving(&level, two_m, &mut rng);
                capped |= moves.capped;
                let (assignment, count) = renumber(&moves.community);
                for c in membership.iter_mut() {
                    *c = assignment[*c];
                }
                debug!(
                    pass = passes,
                    nodes = level.node_count(),
                    communities = count,
                    sweeps = moves.sweeps,
                    "louvain pass"
                );
                if count == level.node_count() {
                    stable = true;
                    break;
                }
                level = level.aggregate(&assignment, count);
            }

            if !stable || capped {
                warning = Some(ConvergenceWarning {
                    stage: Stage::Louvain,
                    iterations: passes,
                });
            }
        }

        let communities = group_members(&membership);
        let modularity = modularity(graph, &membership, self.config.resolution);
        info!(
            nodes = n,
            communities = communities.len(),
            modularity,
            passes,
            "community detection finished"
        );
        Detection {
            communities,
            modularity,
            passes,
            warning,
        }
    }

    fn local_moving(&self, level: &LevelGraph, two_m: f64, rng: &mut StdRng) -> LocalMoves {
        let n = level.node_count();
        let resolution = self.config.resolution;
        let strength: Vec<f64> = (0..n).map(|i| level.strength(i)).collect();
        let mut community: Vec<usize> = (0..n).collect();
        let mut totals = strength.clone();

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut weight_to = vec![0.0; n];
        let mut marked = vec![false; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut sweeps = 0;

        loop {
            if sweeps == self.config.max_sweeps {
                return LocalMoves {
                    community,
                    sweeps,
                    capped: true,
                };
            }
            sweeps += 1;
            let mut moved = false;

            for &node in &order {
                let current = community[node];
                let k = strength[node];

                for &(nbr, w) in &level.adjacency[node] {
                    let c = community[nbr];
                    if !marked[c] {
                        marked[c] = true;
                        touched.push(c);
                    }
                    weight_to[c] += w;
                }
                touched.sort_unstable();

                totals[current] -= k;
                let mut best = current;
                let mut best_gain = weight_to[current] - resolution * k * totals[current] / two_m;
                for &c in &touched {
                    if c == current {
                        continue;
                    }
                    let gain = weight_to[c] - resolution * k * totals[c] / two_m;
                    if gain > best_gain + GAIN_EPSILON {
                        best = c;
                        best_gain = gain;
                    }
                }
                totals[best] += k;

                if best != current {
                    community[node] = best;
                    moved = true;
                }

                for &c in &touched {
                    weight_to[c] = 0.0;
                    marked[c] = false;
                }
                touched.clear();
            }

            if !moved {
                return LocalMoves {
                    community,
                    sweeps,
                    capped: false,
                };
            }
        }
    }
}

/// Expand a node → community labelling into communities ordered by lowest member.
fn group_members(membership: &[usize]) -> Vec<Community> {
    let count = membership.iter().map(|&c| c + 1).max().unwrap_or(0);
    let mut groups: Vec<Vec<NodeIndex>> = vec![Vec::new(); count];
    for (node, &c) in membership.iter().enumerate() {
        groups[c].push(NodeIndex::new(node));
    }
    let mut communities: Vec<Community> = groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(Community::new)
        .collect();
    communities.sort_by_key(|c| c.members()[0]);
    communities
}

/// Modularity of a labelling on the undirected simple projection.
pub fn modularity(graph: &TransactionGraph, membership: &[usize], resolution: f64) -> f64 {
    let m = graph.undirected_edge_count() as f64;
    if m == 0.0 {
        return 0.0;
    }
    let count = membership.iter().map(|&c| c + 1).max().unwrap_or(0);
    let mut internal = vec![0.0; count];
    let mut totals = vec![0.0; count];

    for u in graph.nodes() {
        let cu = membership[u.index()];
        totals[cu] += graph.degree(u) as f64;
        for v in graph.neighbors(u, Direction::Undirected) {
            if v.index() > u.index() && membership[v.index()] == cu {
                internal[cu] += 1.0;
            }
        }
    }

    internal
        .iter()
        .zip(&totals)
        .map(|(l, d)| l / m - resolution * (d / (2.0 * m)).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeId, Relation};
    use rand::Rng;
    use std::collections::HashSet;

    fn link(graph: &mut TransactionGraph, a: &str, b: &str) {
        graph.add_edge(NodeId::account(a), NodeId::account(b), Relation::DeviceLink);
    }

    fn clique(graph: &mut TransactionGraph, prefix: &str, size: usize) {
        for i in 0..size {
            for j in (i + 1)..size {
                link(graph, &format!("{prefix}{i}"), &format!("{prefix}{j}"));
            }
        }
    }

    fn keys(graph: &TransactionGraph, community: &Community) -> Vec<String> {
        community
            .members()
            .iter()
            .map(|&n| graph.id(n).key.clone())
            .collect()
    }

    fn assert_partition(graph: &TransactionGraph, communities: &[Community]) {
        let mut seen = HashSet::new();
        for community in communities {
            assert!(!community.is_empty());
            for &node in community.members() {
                assert!(seen.insert(node), "node {node:?} in two communities");
            }
        }
        assert_eq!(seen.len(), graph.node_count());
    }

    fn random_graph(seed: u64, nodes: usize, edges: usize) -> TransactionGraph {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut graph = TransactionGraph::new();
        for i in 0..nodes {
            graph.add_node(NodeId::account(i.to_string()));
        }
        for _ in 0..edges {
            let a = rng.gen_range(0..nodes);
            let b = rng.gen_range(0..nodes);
            link(&mut graph, &a.to_string(), &b.to_string());
        }
        graph
    }

    #[test]
    fn test_empty_graph() {
        let detection = detect_communities(&TransactionGraph::new(), 1.0, 0);
        assert!(detection.communities.is_empty());
        assert_eq!(detection.modularity, 0.0);
        assert!(detection.warning.is_none());
    }

    #[test]
    fn test_single_node() {
        let mut graph = TransactionGraph::new();
        graph.add_node(NodeId::account("solo"));
        let detection = detect_communities(&graph, 1.0, 7);
        assert_eq!(detection.communities.len(), 1);
        assert_eq!(detection.communities[0].len(), 1);
    }

    #[test]
    fn test_two_cliques_with_bridge() {
        let mut graph = TransactionGraph::new();
        clique(&mut graph, "a", 5);
        clique(&mut graph, "b", 5);
        link(&mut graph, "a0", "b0");

        for seed in 0..5 {
            let detection = detect_communities(&graph, 1.0, seed);
            assert_eq!(detection.communities.len(), 2);
            assert_eq!(keys(&graph, &detection.communities[0]), ["a0", "a1", "a2", "a3", "a4"]);
            assert_eq!(keys(&graph, &detection.communities[1]), ["b0", "b1", "b2", "b3", "b4"]);
            assert!(detection.modularity > 0.4);
        }
    }

    #[test]
    fn test_components_are_never_merged() {
        let mut graph = TransactionGraph::new();
        link(&mut graph, "a", "b");
        link(&mut graph, "c", "d");
        graph.add_node(NodeId::account("lonely"));

        let detection = detect_communities(&graph, 1.0, 3);
        let found: Vec<Vec<String>> = detection
            .communities
            .iter()
            .map(|c| keys(&graph, c))
            .collect();
        assert_eq!(found, vec![vec!["a", "b"], vec!["c", "d"], vec!["lonely"]]);
    }

    #[test]
    fn test_high_resolution_keeps_singletons() {
        let mut graph = TransactionGraph::new();
        clique(&mut graph, "a", 5);
        clique(&mut graph, "b", 5);
        link(&mut graph, "a0", "b0");

        let detection = detect_communities(&graph, 10.0, 0);
        assert_eq!(detection.communities.len(), 10);
    }

    #[test]
    fn test_partition_covers_every_node() {
        for seed in 0..4 {
            let graph = random_graph(seed, 120, 400);
            let detection = detect_communities(&graph, 1.0, seed);
            assert_partition(&graph, &detection.communities);
            assert!(detection.warning.is_none());
        }
    }

    #[test]
    fn test_detection_is_deterministic_for_a_seed() {
        let graph = random_graph(11, 200, 700);
        let first = detect_communities(&graph, 1.0, 42);
        let second = detect_communities(&graph, 1.0, 42);
        assert_eq!(first, second);
    }

    #[test]
    fn test_pass_cap_reports_warning() {
        let graph = random_graph(5, 80, 240);
        let detection = Louvain::new(LouvainConfig {
            max_passes: 1,
            ..LouvainConfig::default()
        })
        .run(&graph);
        assert_partition(&graph, &detection.communities);
        assert_eq!(
            detection.warning,
            Some(ConvergenceWarning {
                stage: Stage::Louvain,
                iterations: 1
            })
        );
    }

    #[test]
    fn test_aggregate_preserves_total_weight() {
        let graph = random_graph(2, 40, 90);
        let level = LevelGraph::from_graph(&graph);
        let assignment: Vec<usize> = (0..level.node_count()).map(|i| i % 4).collect();
        let collapsed = level.aggregate(&assignment, 4);

        let total = |g: &LevelGraph| -> f64 { (0..g.node_count()).map(|i| g.strength(i)).sum() };
        assert!((total(&level) - total(&collapsed)).abs() < 1e-9);
        assert!((total(&level) - 2.0 * graph.undirected_edge_count() as f64).abs() < 1e-9);
    }

    #[test]
    fn test_modularity_of_singletons_is_negative() {
        let mut graph = TransactionGraph::new();
        clique(&mut graph, "a", 4);
        let membership: Vec<usize> = (0..4).collect();
        assert!(modularity(&graph, &membership, 1.0) < 0.0);
        assert!(modularity(&graph, &[0, 0, 0, 0], 1.0).abs() < 1e-12);
    }
}
