//! HITS hub/authority scoring over the directed simple projection.

use crate::error::{ConvergenceWarning, Stage};
use crate::graph::{Direction, TransactionGraph};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitsConfig {
    pub max_iterations: usize,
    /// Stop once the summed L1 change of both vectors drops below this.
    pub tolerance: f64,
}

impl Default for HitsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

/// Hub and authority scores indexed by node index. Each vector has unit L2 norm.
#[derive(Debug, Clone, PartialEq)]
pub struct HitsScores {
    hubs: Vec<f64>,
    authorities: Vec<f64>,
    pub iterations: usize,
    pub warning: Option<ConvergenceWarning>,
}

impl HitsScores {
    pub fn hub(&self, idx: NodeIndex) -> f64 {
        self.hubs[idx.index()]
    }

    pub fn authority(&self, idx: NodeIndex) -> f64 {
        self.authorities[idx.index()]
    }

    pub fn hubs(&self) -> &[f64] {
        &self.hubs
    }

    pub fn authorities(&self) -> &[f64] {
        &self.authorities
    }

    pub fn top_hubs(&self, n: usize) -> Vec<(NodeIndex, f64)> {
        top(&self.hubs, n)
    }

    pub fn top_authorities(&self, n: usize) -> Vec<(NodeIndex, f64)> {
        top(&self.authorities, n)
    }
}

fn top(scores: &[f64], n: usize) -> Vec<(NodeIndex, f64)> {
    let mut ranked: Vec<(NodeIndex, f64)> = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| (NodeIndex::new(i), s))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

/// Scale to unit L2 norm. An all-zero vector becomes uniform.
fn normalize(values: &mut [f64]) {
    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    } else if !values.is_empty() {
        let uniform = 1.0 / (values.len() as f64).sqrt();
        values.iter_mut().for_each(|v| *v = uniform);
    }
}

fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

pub fn hits(graph: &TransactionGraph) -> HitsScores {
    Hits::new(HitsConfig::default()).run(graph)
}

#[derive(Debug, Clone, Default)]
pub struct Hits {
    config: HitsConfig,
}

impl Hits {
    pub fn new(config: HitsConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, graph: &TransactionGraph) -> HitsScores {
        let n = graph.node_count();
        if n == 0 {
            return HitsScores {
                hubs: Vec::new(),
                authorities: Vec::new(),
                iterations: 0,
                warning: None,
            };
        }

        let uniform = 1.0 / (n as f64).sqrt();
        let mut hubs = vec![uniform; n];
        let mut authorities = vec![uniform; n];
        let mut next_hubs = vec![0.0; n];
        let mut next_authorities = vec![0.0; n];

        for iteration in 1..=self.config.max_iterations {
            for v in graph.nodes() {
                next_authorities[v.index()] = graph
                    .neighbors(v, Direction::Incoming)
                    .iter()
                    .map(|u| hubs[u.index()])
                    .sum();
            }
            normalize(&mut next_authorities);

            for u in graph.nodes() {
                next_hubs[u.index()] = graph
                    .neighbors(u, Direction::Outgoing)
                    .iter()
                    .map(|v| next_authorities[v.index()])
                    .sum();
            }
            normalize(&mut next_hubs);

            let change =
                l1_distance(&hubs, &next_hubs) + l1_distance(&authorities, &next_authorities);
            std::mem::swap(&mut hubs, &mut next_hubs);
            std::mem::swap(&mut authorities, &mut next_authorities);

            if change < self.config.tolerance {
                debug!(iterations = iteration, change, "hits converged");
                return HitsScores {
                    hubs,
                    authorities,
                    iterations: iteration,
                    warning: None,
                };
            }
        }

        HitsScores {
            hubs,
            authorities,
            iterations: self.config.max_iterations,
            warning: Some(ConvergenceWarning {
                stage: Stage::Hits,
                iterations: self.config.max_iterations,
            }),
        }
    }
}
