//! Pipeline configuration, loaded from TOML. Every field has a default.

use crate::classifier::LogisticModel;
use crate::community::LouvainConfig;
use crate::error::ConfigError;
use crate::hits::HitsConfig;
use crate::ranking::ScoreWeights;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub graph: GraphConfig,
    pub louvain: LouvainConfig,
    pub hits: HitsConfig,
    pub scoring: ScoreWeights,
    /// Pre-trained model. Without one, ranking is heuristic only.
    pub classifier: Option<LogisticModel>,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Add device/IP/instrument link edges.
    pub include_id_links: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            include_id_links: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { top: 10 }
    }
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let resolution = self.louvain.resolution;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "louvain.resolution must be positive, got {resolution}"
            )));
        }
        if self.louvain.max_passes == 0 || self.louvain.max_sweeps == 0 {
            return Err(ConfigError::Invalid(
                "louvain.max_passes and louvain.max_sweeps must be at least 1".into(),
            ));
        }
        if self.hits.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "hits.max_iterations must be at least 1".into(),
            ));
        }
        if !(self.hits.tolerance.is_finite() && self.hits.tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "hits.tolerance must be non-negative, got {}",
                self.hits.tolerance
            )));
        }
        let weights = [
            self.scoring.density,
            self.scoring.inv_conductance,
            self.scoring.triangle_rate,
        ];
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(ConfigError::Invalid("scoring weights must be finite".into()));
        }
        if let Some(model) = &self.classifier {
            model
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for PipelineConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
