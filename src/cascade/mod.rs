//! Two-stage classification cascade: a coarse normal/anomalous filter
//! followed by per-family attack discrimination.

pub mod engine;
pub mod model;
pub mod overrides;

pub use engine::{CascadeEngine, CascadeThresholds};
pub use model::{LogisticModel, ModelError, ModelSet, ScoreModel};

use serde::{Deserialize, Serialize};

/// The fixed set of attack families the stage-2 models discriminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttackFamily {
    #[serde(rename = "DoS")]
    Dos,
    #[serde(rename = "DDoS")]
    Ddos,
    PortScan,
    BruteForce,
    WebAttack,
}

impl AttackFamily {
    pub const ALL: [AttackFamily; 5] = [
        AttackFamily::Dos,
        AttackFamily::Ddos,
        AttackFamily::PortScan,
        AttackFamily::BruteForce,
        AttackFamily::WebAttack,
    ];
}

/// Tie-break order when two families score equally: higher-impact families
/// win. This is a fixed ranking, independent of model iteration order.
pub const DEFAULT_FAMILY_PRIORITY: [AttackFamily; 5] = [
    AttackFamily::Ddos,
    AttackFamily::Dos,
    AttackFamily::BruteForce,
    AttackFamily::WebAttack,
    AttackFamily::PortScan,
];

impl std::fmt::Display for AttackFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttackFamily::Dos => write!(f, "DoS"),
            AttackFamily::Ddos => write!(f, "DDoS"),
            AttackFamily::PortScan => write!(f, "PortScan"),
            AttackFamily::BruteForce => write!(f, "BruteForce"),
            AttackFamily::WebAttack => write!(f, "WebAttack"),
        }
    }
}

/// Final label of a classified flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Normal,
    Unknown,
    Attack(AttackFamily),
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Normal => write!(f, "Normal"),
            Label::Unknown => write!(f, "Unknown"),
            Label::Attack(family) => write!(f, "{}", family),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Immutable result of classifying one expired flow.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub is_attack: bool,
    pub label: Label,
    /// For attack verdicts this is the winning family's score; for normal
    /// verdicts it is the complement of the rejected anomaly score.
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<std::collections::BTreeMap<AttackFamily, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Version metadata of the model that decided, passed through untouched.
    pub model_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        assert_eq!(Label::Normal.to_string(), "Normal");
        assert_eq!(Label::Attack(AttackFamily::PortScan).to_string(), "PortScan");
        assert_eq!(Label::Attack(AttackFamily::Ddos).to_string(), "DDoS");
    }

    #[test]
    fn test_family_serde_names() {
        let json = serde_json::to_string(&AttackFamily::Dos).unwrap();
        assert_eq!(json, "\"DoS\"");
        let back: AttackFamily = serde_json::from_str("\"BruteForce\"").unwrap();
        assert_eq!(back, AttackFamily::BruteForce);
    }

    #[test]
    fn test_priority_covers_every_family() {
        for family in AttackFamily::ALL {
            assert!(DEFAULT_FAMILY_PRIORITY.contains(&family));
        }
    }
}
