//! Feature-vector → fraud-probability capability.
//!
//! The engine never trains anything. It only calls a [`Classifier`], which
//! can be a closure or a pre-trained [`LogisticModel`] loaded from config.

use crate::error::ClassifierError;
use crate::metrics::{CommunityFeatures, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait Classifier: Sync {
    /// Probability in `[0, 1]` that the community is fraudulent.
    fn classify(&self, features: &CommunityFeatures) -> Result<f64, ClassifierError>;
}

impl<F> Classifier for F
where
    F: Fn(&CommunityFeatures) -> Result<f64, ClassifierError> + Sync,
{
    fn classify(&self, features: &CommunityFeatures) -> Result<f64, ClassifierError> {
        self(features)
    }
}

/// Linear model over named features passed through a sigmoid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticModel {
    pub bias: f64,
    /// Keyed by names from [`FEATURE_NAMES`]. Absent features weigh zero.
    pub weights: BTreeMap<String, f64>,
}

impl LogisticModel {
    /// Reject weights naming features that do not exist.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        match self
            .weights
            .keys()
            .find(|name| !FEATURE_NAMES.contains(&name.as_str()))
        {
            Some(unknown) => Err(ClassifierError::InvalidFeatures(format!(
                "unknown feature `{unknown}`"
            ))),
            None => Ok(()),
        }
    }
}

impl Classifier for LogisticModel {
    fn classify(&self, features: &CommunityFeatures) -> Result<f64, ClassifierError> {
        self.validate()?;
        let vector = features.as_vector();
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(ClassifierError::InvalidFeatures(format!(
                "feature `{}` is not finite",
                FEATURE_NAMES[pos]
            )));
        }

        let z = FEATURE_NAMES
            .iter()
            .zip(vector)
            .filter_map(|(name, x)| self.weights.get(*name).map(|w| w * x))
            .sum::<f64>()
            + self.bias;
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(density: f64) -> CommunityFeatures {
        CommunityFeatures {
            node_count: 10,
            density,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_model_is_even_odds() {
        let model = LogisticModel::default();
        assert_eq!(model.classify(&features(0.3)).unwrap(), 0.5);
    }

    #[test]
    fn test_weights_are_applied_by_name() {
        let model = LogisticModel {
            bias: -1.0,
            weights: BTreeMap::from([("density".to_string(), 4.0)]),
        };
        let low = model.classify(&features(0.1)).unwrap();
        let high = model.classify(&features(0.9)).unwrap();
        assert!(high > low);
        assert!((high - 1.0 / (1.0 + (-2.6f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let model = LogisticModel {
            bias: 0.0,
            weights: BTreeMap::from([("pagerank".to_string(), 1.0)]),
        };
        assert!(matches!(
            model.classify(&features(0.5)),
            Err(ClassifierError::InvalidFeatures(_))
        ));
    }

    #[test]
    fn test_closures_are_classifiers() {
        let constant = |_: &CommunityFeatures| -> Result<f64, ClassifierError> { Ok(0.25) };
        assert_eq!(constant.classify(&features(0.0)).unwrap(), 0.25);
    }
}
