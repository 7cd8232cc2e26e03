//! # Fraud Rings
//!
//! Detects collusive fraud rings in transaction data. Accounts, devices, IP
//! addresses and payment instruments form a heterogeneous graph which is
//! partitioned with Louvain modularity optimization; communities are then
//! ranked by a structural suspicion score.
//!
//! - **Graph store**: typed multigraph with directed and undirected simple views
//! - **Community detection**: seeded, deterministic Louvain
//! - **Subgraph metrics**: density, conductance, triangles, clustering
//! - **Link analysis**: HITS hub/authority scores
//! - **Ranking**: composite heuristic score, optional external classifier
//!
//! ```no_run
//! use fraud_rings::{build_graph, detect_communities, rank, RingScenario};
//!
//! let data = RingScenario::default().generate();
//! let graph = build_graph(&data.records, true)?;
//! let detection = detect_communities(&graph, 1.0, 0);
//! let ranked = rank(&graph, &detection.communities);
//! println!("top score {:.3}", ranked[0].heuristic_score);
//! # Ok::<(), fraud_rings::InputError>(())
//! ```

pub mod classifier;
pub mod community;
pub mod config;
pub mod error;
pub mod graph;
pub mod hits;
pub mod metrics;
pub mod pipeline;
pub mod ranking;
pub mod records;
pub mod simulate;

pub use classifier::{Classifier, LogisticModel};
pub use community::{Community, Detection, Louvain, LouvainConfig, detect_communities};
pub use config::PipelineConfig;
pub use error::{
    ClassifierError, ConfigError, ConvergenceWarning, Error, InputError, LoadError, Result, Stage,
};
pub use graph::{
    Direction, GraphBuilder, KindCounts, NodeId, NodeKind, Relation, Subgraph, TransactionGraph,
    TxnAttrs, build_graph,
};
pub use hits::{Hits, HitsConfig, HitsScores, hits};
pub use metrics::{CommunityFeatures, FEATURE_NAMES, community_features};
pub use pipeline::{Pipeline, PipelineOutput};
pub use ranking::{
    ClassifiedCommunity, Ranker, ScoreWeights, ScoredCommunity, rank, rank_with_classifier,
    suspicion_score,
};
pub use records::{TransactionRecord, load_graph, read_records, write_records};
pub use simulate::{RingScenario, SimulatedData};
