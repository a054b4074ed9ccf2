//! The cascade decision procedure.
//!
//! EVALUATE_STAGE1 -> Normal, or -> EVALUATE_STAGE2 -> Attack<family> /
//! Normal-by-low-confidence. Deterministic throughout: equal stage-2 scores
//! resolve via the configured family priority, never iteration order, and a
//! failing model degrades to score 0 instead of failing the classification.

use std::collections::BTreeMap;

use tracing::warn;

use crate::cascade::model::ModelSet;
use crate::cascade::overrides::OverrideStrategy;
use crate::cascade::{AttackFamily, Label, Verdict, DEFAULT_FAMILY_PRIORITY};
use crate::features::{Stage1Features, Stage2Features};
use crate::flow::FlowRecord;

/// Acceptance thresholds for both stages.
#[derive(Debug, Clone)]
pub struct CascadeThresholds {
    /// Stage-1 anomaly probability below this is accepted as normal.
    pub normal_acceptance: f64,
    /// Stage-2 fallback threshold for families without an override.
    pub default_attack: f64,
    /// Per-family threshold overrides.
    pub per_family: BTreeMap<AttackFamily, f64>,
}

impl Default for CascadeThresholds {
    fn default() -> Self {
        Self {
            normal_acceptance: 0.5,
            default_attack: 0.5,
            per_family: BTreeMap::new(),
        }
    }
}

impl CascadeThresholds {
    pub fn for_family(&self, family: AttackFamily) -> f64 {
        self.per_family
            .get(&family)
            .copied()
            .unwrap_or(self.default_attack)
    }
}

pub struct CascadeEngine {
    models: ModelSet,
    thresholds: CascadeThresholds,
    priority: Vec<AttackFamily>,
    overrides: Option<Box<dyn OverrideStrategy>>,
}

impl CascadeEngine {
    pub fn new(models: ModelSet, thresholds: CascadeThresholds) -> Self {
        Self {
            models,
            thresholds,
            priority: DEFAULT_FAMILY_PRIORITY.to_vec(),
            overrides: None,
        }
    }

    /// Replace the tie-break priority order.
    pub fn with_priority(mut self, priority: Vec<AttackFamily>) -> Self {
        self.priority = priority;
        self
    }

    /// Install an override strategy, consulted before stage 1.
    pub fn with_overrides(mut self, overrides: Box<dyn OverrideStrategy>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Classify one expired flow. Never fails: model errors degrade.
    pub fn classify(
        &self,
        record: &FlowRecord,
        stage1: &Stage1Features,
        stage2: &Stage2Features,
    ) -> Verdict {
        if let Some(overrides) = &self.overrides {
            if let Some(verdict) = overrides.check(record) {
                return verdict;
            }
        }

        let mut degraded: Vec<String> = Vec::new();

        // Stage 1: cheap normal filter.
        match self.models.normal_filter.score(&stage1.to_vector()) {
            Ok(p) if p < self.thresholds.normal_acceptance => {
                return Verdict {
                    is_attack: false,
                    label: Label::Normal,
                    confidence: 1.0 - p,
                    probabilities: None,
                    explanation: None,
                    model_version: self.models.normal_filter.version().to_string(),
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "stage-1 filter failed, escalating to stage 2");
                degraded.push(format!("stage-1 filter degraded ({})", e));
            }
        }

        // Stage 2: score every family.
        let vector = stage2.to_vector();
        let mut scores: BTreeMap<AttackFamily, f64> = BTreeMap::new();
        for (family, model) in &self.models.families {
            let score = match model.score(&vector) {
                Ok(p) => p,
                Err(e) => {
                    warn!(family = %family, error = %e, "family model failed, scoring 0");
                    degraded.push(format!("{} model degraded ({})", family, e));
                    0.0
                }
            };
            scores.insert(*family, score);
        }

        let Some((best_family, best_score)) = self.top_ranked(&scores) else {
            return Verdict {
                is_attack: false,
                label: Label::Normal,
                confidence: 1.0,
                probabilities: None,
                explanation: Some(join_notes(
                    "No attack models available".to_string(),
                    &degraded,
                )),
                model_version: self.models.normal_filter.version().to_string(),
            };
        };

        let model_version = self
            .models
            .families
            .iter()
            .find(|(f, _)| *f == best_family)
            .map(|(_, m)| m.version().to_string())
            .unwrap_or_default();

        let threshold = self.thresholds.for_family(best_family);
        if best_score < threshold {
            // False-positive suppression: a flow that only weakly resembles
            // one family is reported safe rather than alerted.
            let explanation = format!(
                "Low attack confidence ({:.2} < {}): strongest family {} suppressed, traffic categorized as safe",
                best_score, threshold, best_family
            );
            return Verdict {
                is_attack: false,
                label: Label::Normal,
                confidence: 1.0 - best_score,
                probabilities: Some(scores),
                explanation: Some(join_notes(explanation, &degraded)),
                model_version,
            };
        }

        Verdict {
            is_attack: true,
            label: Label::Attack(best_family),
            confidence: best_score,
            probabilities: Some(scores),
            explanation: if degraded.is_empty() {
                None
            } else {
                Some(degraded.join("; "))
            },
            model_version,
        }
    }

    /// Highest score wins; numerically equal scores resolve by priority.
    fn top_ranked(&self, scores: &BTreeMap<AttackFamily, f64>) -> Option<(AttackFamily, f64)> {
        scores
            .iter()
            .max_by(|(fa, sa), (fb, sb)| {
                sa.partial_cmp(sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        // Inverted: the *smaller* priority index must win the max.
                        self.priority_index(**fb).cmp(&self.priority_index(**fa))
                    })
            })
            .map(|(f, s)| (*f, *s))
    }

    fn priority_index(&self, family: AttackFamily) -> usize {
        self.priority
            .iter()
            .position(|f| *f == family)
            .unwrap_or(usize::MAX)
    }
}

fn join_notes(main: String, degraded: &[String]) -> String {
    if degraded.is_empty() {
        main
    } else {
        format!("{}; {}", main, degraded.join("; "))
    }
}
