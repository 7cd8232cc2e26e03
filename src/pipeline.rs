//! One analysis run: build → detect ‖ HITS → rank → optional classification.

use crate::classifier::Classifier;
use crate::community::{Detection, Louvain};
use crate::config::PipelineConfig;
use crate::error::{ConvergenceWarning, Result};
use crate::graph::{NodeId, TransactionGraph, build_graph};
use crate::hits::{Hits, HitsScores};
use crate::ranking::{ClassifiedCommunity, Ranker, ScoredCommunity, rank_with_classifier};
use crate::records::TransactionRecord;
use tracing::{info, info_span, warn};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub graph: TransactionGraph,
    pub detection: Detection,
    pub hits: HitsScores,
    /// Heuristic order.
    pub ranked: Vec<ScoredCommunity>,
    /// Probability order, present when a classifier ran.
    pub classified: Option<Vec<ClassifiedCommunity>>,
    pub warnings: Vec<ConvergenceWarning>,
}

impl PipelineOutput {
    pub fn top_hubs(&self, n: usize) -> Vec<(&NodeId, f64)> {
        self.hits
            .top_hubs(n)
            .into_iter()
            .map(|(idx, score)| (self.graph.id(idx), score))
            .collect()
    }

    pub fn top_authorities(&self, n: usize) -> Vec<(&NodeId, f64)> {
        self.hits
            .top_authorities(n)
            .into_iter()
            .map(|(idx, score)| (self.graph.id(idx), score))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the graph from records and analyze it.
    pub fn run(&self, records: &[TransactionRecord]) -> Result<PipelineOutput> {
        let graph = build_graph(records, self.config.graph.include_id_links)?;
        self.analyze(graph)
    }

    /// Analyze a built graph, classifying with the configured model if any.
    pub fn analyze(&self, graph: TransactionGraph) -> Result<PipelineOutput> {
        match &self.config.classifier {
            Some(model) => self.analyze_with(graph, Some(model)),
            None => self.analyze_with::<dyn Classifier>(graph, None),
        }
    }

    pub fn analyze_with<C>(
        &self,
        graph: TransactionGraph,
        classifier: Option<&C>,
    ) -> Result<PipelineOutput>
    where
        C: Classifier + ?Sized,
    {
        let _span = info_span!(
            "pipeline",
            nodes = graph.node_count(),
            edges = graph.edge_count()
        )
        .entered();

        // Link analysis shares only read access to the graph.
        let (detection, hits) = rayon::join(
            || Louvain::new(self.config.louvain).run(&graph),
            || Hits::new(self.config.hits).run(&graph),
        );

        let warnings: Vec<ConvergenceWarning> =
            detection.warning.into_iter().chain(hits.warning).collect();
        for warning in &warnings {
            warn!(%warning, "best-effort result");
        }

        let ranked = Ranker::new(self.config.scoring).rank(&graph, &detection.communities);
        let classified = classifier
            .map(|c| rank_with_classifier(&ranked, c))
            .transpose()?;

        if let Some(top) = ranked.first() {
            info!(
                communities = ranked.len(),
                top_score = top.heuristic_score,
                top_kinds = ?graph.kind_counts(top.community.members()),
                "analysis finished"
            );
        }

        Ok(PipelineOutput {
            graph,
            detection,
            hits,
            ranked,
            classified,
            warnings,
        })
    }
}
