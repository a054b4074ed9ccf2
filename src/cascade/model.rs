//! Model capability boundary.
//!
//! The cascade consumes scoring capabilities only: a feature vector goes in,
//! a probability comes out. Training happens elsewhere; this module ships a
//! logistic-regression implementation loaded from JSON (with an embedded
//! default set) plus a constant-score model for wiring checks and tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::cascade::AttackFamily;

// Embedded fallback models, used when no model file is supplied.
const DEFAULT_MODELS_JSON: &str = include_str!("default_models.json");

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature vector length mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("model arrays disagree: {weights} weights, {means} means, {stds} stds")]
    InconsistentModel {
        weights: usize,
        means: usize,
        stds: usize,
    },

    #[error("model returned probability {0} outside [0, 1]")]
    OutOfRange(f64),
}

/// A trained scoring capability: feature vector in, probability out.
pub trait ScoreModel: Send + Sync {
    fn score(&self, features: &[f64]) -> Result<f64, ModelError>;

    /// Opaque version metadata, carried through to verdicts unopinionated.
    fn version(&self) -> &str;
}

/// Binary logistic-regression scorer with input standardization.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    pub version: String,
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl ScoreModel for LogisticModel {
    fn score(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.weights.len() {
            return Err(ModelError::ShapeMismatch {
                expected: self.weights.len(),
                got: features.len(),
            });
        }
        // A hand-edited model file can carry standardization arrays shorter
        // than the weight vector; that must degrade, not index out of bounds.
        if self.means.len() != self.weights.len() || self.stds.len() != self.weights.len() {
            return Err(ModelError::InconsistentModel {
                weights: self.weights.len(),
                means: self.means.len(),
                stds: self.stds.len(),
            });
        }

        let mut logit = self.bias;
        for (i, &x) in features.iter().enumerate() {
            let std = if self.stds[i].abs() < f64::EPSILON { 1.0 } else { self.stds[i] };
            logit += self.weights[i] * (x - self.means[i]) / std;
        }

        let p = 1.0 / (1.0 + (-logit).exp());
        if !(0.0..=1.0).contains(&p) {
            return Err(ModelError::OutOfRange(p));
        }
        Ok(p)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

/// Constant-score model. Used by tests and for dry wiring checks.
#[derive(Debug, Clone)]
pub struct FixedModel {
    pub probability: f64,
    pub version: String,
}

impl FixedModel {
    pub fn new(probability: f64, version: &str) -> Self {
        Self { probability, version: version.to_string() }
    }
}

impl ScoreModel for FixedModel {
    fn score(&self, _features: &[f64]) -> Result<f64, ModelError> {
        Ok(self.probability)
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Debug, Deserialize)]
struct ModelFile {
    stage1: LogisticModel,
    families: BTreeMap<AttackFamily, LogisticModel>,
}

/// The full capability set the cascade is constructed with.
pub struct ModelSet {
    pub normal_filter: Box<dyn ScoreModel>,
    pub families: Vec<(AttackFamily, Box<dyn ScoreModel>)>,
}

impl ModelSet {
    /// Load models from a JSON file, falling back to the embedded defaults
    /// if the file is missing or unparsable.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<ModelFile>(&content) {
                Ok(file) => {
                    info!(path = %path.display(), "loaded classifier models");
                    return Self::from_file(file);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse model file, using embedded defaults");
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "model file not readable, using embedded defaults");
            }
        }
        Self::embedded()
    }

    /// The embedded default model set.
    pub fn embedded() -> Self {
        let file: ModelFile = serde_json::from_str(DEFAULT_MODELS_JSON)
            .unwrap_or_else(|e| panic!("embedded default models are invalid JSON: {}", e));
        Self::from_file(file)
    }

    fn from_file(file: ModelFile) -> Self {
        let families = file
            .families
            .into_iter()
            .map(|(family, model)| (family, Box::new(model) as Box<dyn ScoreModel>))
            .collect();
        Self {
            normal_filter: Box::new(file.stage1),
            families,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{STAGE1_LAYOUT, STAGE2_LAYOUT};

    #[test]
    fn test_embedded_models_load() {
        let set = ModelSet::embedded();
        assert_eq!(set.families.len(), AttackFamily::ALL.len());
        assert!(!set.normal_filter.version().is_empty());
    }

    #[test]
    fn test_embedded_layouts_match_feature_schema() {
        let set = ModelSet::embedded();
        let zeroes1 = vec![0.0; STAGE1_LAYOUT.len()];
        let zeroes2 = vec![0.0; STAGE2_LAYOUT.len()];

        let p = set.normal_filter.score(&zeroes1).unwrap();
        assert!((0.0..=1.0).contains(&p));
        for (_, model) in &set.families {
            let p = model.score(&zeroes2).unwrap();
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_embedded_filter_separates_scan_from_browsing() {
        let set = ModelSet::embedded();

        // SYN burst: short gaps, tiny frames, all-SYN.
        let scan = vec![2.0, 40.0, 2400.0, 60.0, 20.0, 0.05, 0.02, 1.0];
        // Typical browsing flow: large frames, mixed flags.
        let browse = vec![5.0, 30.0, 45000.0, 1500.0, 6.0, 0.17, 0.1, 0.066];

        let p_scan = set.normal_filter.score(&scan).unwrap();
        let p_browse = set.normal_filter.score(&browse).unwrap();
        assert!(p_scan > 0.9, "scan anomaly probability was {}", p_scan);
        assert!(p_browse < 0.5, "browsing anomaly probability was {}", p_browse);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let set = ModelSet::embedded();
        let err = set.normal_filter.score(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ModelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_mismatched_internal_arrays_error_instead_of_panic() {
        let model = LogisticModel {
            version: "test".into(),
            feature_names: vec!["a".into(), "b".into()],
            weights: vec![1.0, 2.0],
            bias: 0.0,
            means: vec![0.0],
            stds: vec![1.0],
        };
        let err = model.score(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ModelError::InconsistentModel { .. }));
    }

    #[test]
    fn test_zero_std_does_not_divide_by_zero() {
        let model = LogisticModel {
            version: "test".into(),
            feature_names: vec!["a".into()],
            weights: vec![1.0],
            bias: 0.0,
            means: vec![0.0],
            stds: vec![0.0],
        };
        let p = model.score(&[3.0]).unwrap();
        assert!(p.is_finite());
    }

    #[test]
    fn test_load_falls_back_on_missing_file() {
        let set = ModelSet::load(Path::new("does/not/exist.json"));
        assert_eq!(set.families.len(), AttackFamily::ALL.len());
    }
}
