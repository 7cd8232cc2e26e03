//! Suspicion scoring and ranking of detected communities.

use crate::classifier::Classifier;
use crate::community::Community;
use crate::error::ClassifierError;
use crate::graph::{NodeId, TransactionGraph};
use crate::metrics::{CommunityFeatures, community_features};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weights of the composite heuristic score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub density: f64,
    pub inv_conductance: f64,
    pub triangle_rate: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            density: 0.5,
            inv_conductance: 0.3,
            triangle_rate: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn score(&self, features: &CommunityFeatures) -> f64 {
        self.density * features.density
            + self.inv_conductance * features.inv_conductance
            + self.triangle_rate * features.triangle_rate
    }
}

/// Composite score with the default weights.
pub fn suspicion_score(features: &CommunityFeatures) -> f64 {
    ScoreWeights::default().score(features)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCommunity {
    pub heuristic_score: f64,
    pub community: Community,
    pub features: CommunityFeatures,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedCommunity {
    pub heuristic_score: f64,
    pub community: Community,
    pub features: CommunityFeatures,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker {
    weights: ScoreWeights,
}

impl Ranker {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Score every community and sort by score, descending.
    ///
    /// Equal scores fall back to the smallest member identifier, so the
    /// order is the same on every run. Metrics run in parallel per community.
    pub fn rank(&self, graph: &TransactionGraph, communities: &[Community]) -> Vec<ScoredCommunity> {
        let mut scored: Vec<(Option<&NodeId>, ScoredCommunity)> = communities
            .par_iter()
            .map(|community| {
                let features = community_features(graph, community.members());
                let anchor = community.members().iter().map(|&n| graph.id(n)).min();
                let scored = ScoredCommunity {
                    heuristic_score: self.weights.score(&features),
                    community: community.clone(),
                    features,
                };
                (anchor, scored)
            })
            .collect();

        scored.sort_by(|(a_id, a), (b_id, b)| {
            b.heuristic_score
                .total_cmp(&a.heuristic_score)
                .then_with(|| a_id.cmp(b_id))
        });

        if let Some((_, top)) = scored.first() {
            debug!(
                communities = scored.len(),
                top_score = top.heuristic_score,
                top_size = top.community.len(),
                "ranked communities"
            );
        }
        scored.into_iter().map(|(_, s)| s).collect()
    }
}

pub fn rank(graph: &TransactionGraph, communities: &[Community]) -> Vec<ScoredCommunity> {
    Ranker::default().rank(graph, communities)
}

/// Attach a classifier probability to each ranked community and re-sort by it.
///
/// The sort is stable: equal probabilities keep their heuristic order. The
/// first classifier error is returned as is.
pub fn rank_with_classifier<C>(
    ranked: &[ScoredCommunity],
    classifier: &C,
) -> Result<Vec<ClassifiedCommunity>, ClassifierError>
where
    C: Classifier + ?Sized,
{
    let mut classified = ranked
        .par_iter()
        .map(|scored| {
            let probability = classifier.classify(&scored.features)?;
            if !(0.0..=1.0).contains(&probability) {
                return Err(ClassifierError::ProbabilityOutOfRange(probability));
            }
            Ok(ClassifiedCommunity {
                heuristic_score: scored.heuristic_score,
                community: scored.community.clone(),
                features: scored.features,
                probability,
            })
        })
        .collect::<Result<Vec<_>, ClassifierError>>()?;

    classified.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    Ok(classified)
}
