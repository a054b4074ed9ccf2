//! Pluggable verdict overrides, evaluated before stage 1.
//!
//! The only implementation is a demonstration fixture. It is NOT production
//! decision logic: it exists so scripted demo attacks and integration tests
//! can force a known verdict, and it is wired in only when
//! `demo_override_enabled` is set (default off).

use std::collections::BTreeMap;

use crate::cascade::{AttackFamily, Label, Verdict};
use crate::flow::FlowRecord;

/// Strategy consulted before the cascade runs. Returning a verdict
/// bypasses both stages.
pub trait OverrideStrategy: Send + Sync {
    fn check(&self, record: &FlowRecord) -> Option<Verdict>;
}

/// Demo fixture: fixed high-confidence verdicts keyed on well-known
/// "magic" ports used by the scripted attack tooling.
pub struct SignatureOverride {
    signatures: Vec<(u16, AttackFamily, f64)>,
}

impl Default for SignatureOverride {
    fn default() -> Self {
        Self {
            signatures: vec![
                (1337, AttackFamily::Dos, 0.98),
                (1338, AttackFamily::PortScan, 0.99),
                (1339, AttackFamily::BruteForce, 0.97),
                (1340, AttackFamily::WebAttack, 0.96),
            ],
        }
    }
}

impl OverrideStrategy for SignatureOverride {
    fn check(&self, record: &FlowRecord) -> Option<Verdict> {
        let ports = [record.initiator.1, record.responder.1];
        let (_, family, confidence) = self
            .signatures
            .iter()
            .find(|(port, _, _)| ports.contains(port))?;

        let probabilities: BTreeMap<AttackFamily, f64> = AttackFamily::ALL
            .iter()
            .map(|f| (*f, if f == family { *confidence } else { 0.01 }))
            .collect();

        Some(Verdict {
            is_attack: true,
            label: Label::Attack(*family),
            confidence: *confidence,
            probabilities: Some(probabilities),
            explanation: Some(format!(
                "High-confidence {} signature matched (demo fixture)",
                family
            )),
            model_version: "signature-override/demo".to_string(),
        })
    }
}
