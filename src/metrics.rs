//! Structural metrics over a community's induced subgraph.
//!
//! Density, conductance and triangle rate feed the suspicion score. The rest
//! of [`CommunityFeatures`] is descriptive and goes to external classifiers.

use crate::graph::{KindCounts, SimpleGraph, TransactionGraph};
use petgraph::graph::NodeIndex;

pub const FEATURE_COUNT: usize = 15;

/// Order of [`CommunityFeatures::as_vector`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "n_nodes",
    "n_edges",
    "density",
    "cut_edges",
    "conductance",
    "inv_conductance",
    "triangles",
    "triangle_rate",
    "avg_degree",
    "max_degree",
    "avg_clustering",
    "accounts",
    "devices",
    "ips",
    "instruments",
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CommunityFeatures {
    pub node_count: usize,
    /// Edges of the undirected simple induced subgraph.
    pub edge_count: usize,
    pub density: f64,
    /// Stored edges of the full graph leaving or entering the community.
    pub cut_edges: usize,
    pub conductance: f64,
    pub inv_conductance: f64,
    pub triangles: usize,
    pub triangle_rate: f64,
    pub avg_degree: f64,
    pub max_degree: usize,
    pub avg_clustering: f64,
    pub kinds: KindCounts,
}

impl CommunityFeatures {
    pub fn as_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.node_count as f64,
            self.edge_count as f64,
            self.density,
            self.cut_edges as f64,
            self.conductance,
            self.inv_conductance,
            self.triangles as f64,
            self.triangle_rate,
            self.avg_degree,
            self.max_degree as f64,
            self.avg_clustering,
            self.kinds.accounts as f64,
            self.kinds.devices as f64,
            self.kinds.ips as f64,
            self.kinds.instruments as f64,
        ]
    }
}

/// `2m / (n(n-1))`, zero below two nodes.
pub fn density(nodes: usize, edges: usize) -> f64 {
    if nodes < 2 {
        return 0.0;
    }
    2.0 * edges as f64 / (nodes as f64 * (nodes as f64 - 1.0))
}

/// `cut / (2m + cut)`; a community with no edges at all is maximally leaky (1.0).
pub fn conductance(internal_edges: usize, cut_edges: usize) -> f64 {
    let denominator = 2 * internal_edges + cut_edges;
    if denominator == 0 {
        return 1.0;
    }
    cut_edges as f64 / denominator as f64
}

/// Triangles over the maximum possible `C(n, 3)`, zero below three nodes.
pub fn triangle_rate(nodes: usize, triangles: usize) -> f64 {
    if nodes < 3 {
        return 0.0;
    }
    let n = nodes as f64;
    triangles as f64 / (n * (n - 1.0) * (n - 2.0) / 6.0)
}

/// Triangles through each node.
///
/// Every triangle is enumerated once from its lowest vertex by merging
/// sorted adjacency lists.
pub fn node_triangles(graph: &SimpleGraph) -> Vec<usize> {
    let n = graph.node_count();
    let mut counts = vec![0; n];
    for u in 0..n {
        let nu = graph.neighbors(u);
        for &v in nu.iter().filter(|&&v| v > u) {
            let nv = graph.neighbors(v);
            let (mut i, mut j) = (0, 0);
            while i < nu.len() && j < nv.len() {
                match nu[i].cmp(&nv[j]) {
                    std::cmp::Ordering::Less => i += 1,
                    std::cmp::Ordering::Greater => j += 1,
                    std::cmp::Ordering::Equal => {
                        let w = nu[i];
                        if w > v {
                            counts[u] += 1;
                            counts[v] += 1;
                            counts[w] += 1;
                        }
                        i += 1;
                        j += 1;
                    }
                }
            }
        }
    }
    counts
}

/// Compute all features for the community made of `members`.
pub fn community_features(graph: &TransactionGraph, members: &[NodeIndex]) -> CommunityFeatures {
    let sub = graph.induced_subgraph(members);
    let simple = sub.simple();
    let n = simple.node_count();
    let m = simple.edge_count();
    let cut_edges = sub.cut_edges();

    let per_node = node_triangles(&simple);
    let triangles = per_node.iter().sum::<usize>() / 3;

    let mut max_degree = 0;
    let mut clustering_sum = 0.0;
    for (node, &t) in per_node.iter().enumerate() {
        let d = simple.degree(node);
        max_degree = max_degree.max(d);
        if d >= 2 {
            clustering_sum += 2.0 * t as f64 / (d * (d - 1)) as f64;
        }
    }
    let (avg_degree, avg_clustering) = if n > 0 {
        (2.0 * m as f64 / n as f64, clustering_sum / n as f64)
    } else {
        (0.0, 0.0)
    };

    let conductance = conductance(m, cut_edges);
    CommunityFeatures {
        node_count: n,
        edge_count: m,
        density: density(n, m),
        cut_edges,
        conductance,
        inv_conductance: 1.0 - conductance,
        triangles,
        triangle_rate: triangle_rate(n, triangles),
        avg_degree,
        max_degree,
        avg_clustering,
        kinds: graph.kind_counts(sub.members()),
    }
}
