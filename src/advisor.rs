//! Remediation hints for the dashboard, one per verdict label.

use crate::cascade::{AttackFamily, Label, Verdict};

/// Human-readable mitigation hint for a classified flow.
pub fn suggestion(verdict: &Verdict, dst_port: u16) -> String {
    // Suppressed low-confidence verdicts surface their reasoning directly.
    if !verdict.is_attack {
        if let Some(explanation) = &verdict.explanation {
            return format!("Safe: {}", explanation);
        }
    }

    match verdict.label {
        Label::Normal => "System secure. Traffic appears benign.".to_string(),
        Label::Unknown => format!(
            "Unidentified anomalous traffic detected on port {}. Mitigation: investigate flow details and monitor for further suspicious patterns.",
            dst_port
        ),
        Label::Attack(AttackFamily::Dos) => format!(
            "Potential denial of service detected on port {}. Mitigation: enable rate limiting and check for volumetric anomalies.",
            dst_port
        ),
        Label::Attack(AttackFamily::Ddos) => format!(
            "Distributed denial of service signature identified on port {}. Mitigation: deploy cloud-based scrubbing or blackhole routing if necessary.",
            dst_port
        ),
        Label::Attack(AttackFamily::PortScan) => {
            "Port scanning activity detected from source. Mitigation: cloak common ports and implement temporary IP blocking for rapid scanners.".to_string()
        }
        Label::Attack(AttackFamily::BruteForce) => format!(
            "Brute force attempt detected on port {}. Mitigation: enforce multi-factor authentication and temporary account lockout.",
            dst_port
        ),
        Label::Attack(AttackFamily::WebAttack) => format!(
            "Web application attack detected on port {}. Mitigation: review WAF logs and sanitize input fields for SQLi/XSS.",
            dst_port
        ),
    }
}
