//! Detection sinks: where finished verdicts go.
//!
//! Emission is best-effort and fire-and-forget from the pipeline's side;
//! retry and backoff are a sink's own business.

use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cascade::{AttackFamily, Label, Verdict};
use crate::event::Protocol;

/// The externally reported detection shape. Ownership transfers to the
/// sink on emission; the core keeps no reference.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub src_addr: IpAddr,
    pub src_port: u16,
    pub dst_addr: IpAddr,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub attack_type: Label,
    pub is_attack: bool,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<AttackFamily, f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub model_version: String,
    pub suggestion: String,
}

impl DetectionRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        src: (IpAddr, u16),
        dst: (IpAddr, u16),
        protocol: Protocol,
        verdict: Verdict,
        suggestion: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            src_addr: src.0,
            src_port: src.1,
            dst_addr: dst.0,
            dst_port: dst.1,
            protocol,
            attack_type: verdict.label,
            is_attack: verdict.is_attack,
            confidence: verdict.confidence,
            probabilities: verdict.probabilities,
            explanation: verdict.explanation,
            model_version: verdict.model_version,
            suggestion,
        }
    }
}

/// Consumer of detection records.
#[async_trait]
pub trait DetectionSink: Send + Sync {
    async fn emit(&self, record: DetectionRecord);
}

/// Bounded in-memory history with oldest-first eviction.
///
/// This is the dashboard-facing buffer: `append`, `list`, `clear` with an
/// explicit capacity. It doubles as a sink so tests and embedded consumers
/// can capture pipeline output directly.
pub struct DetectionBuffer {
    records: Mutex<VecDeque<DetectionRecord>>,
    capacity: usize,
}

impl DetectionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn append(&self, record: DetectionRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Snapshot of buffered records, oldest first.
    pub fn list(&self) -> Vec<DetectionRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.clear();
    }

    pub fn len(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DetectionSink for DetectionBuffer {
    async fn emit(&self, record: DetectionRecord) {
        self.append(record);
    }
}

/// Sink that logs each record as a structured event.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl DetectionSink for LogSink {
    async fn emit(&self, record: DetectionRecord) {
        info!(
            flow = %format_args!(
                "{}:{} -> {}:{}",
                record.src_addr, record.src_port, record.dst_addr, record.dst_port
            ),
            protocol = %record.protocol,
            verdict = %record.attack_type,
            is_attack = record.is_attack,
            confidence = record.confidence,
            suggestion = %record.suggestion,
            "flow classified"
        );
    }
}

/// Sink that POSTs each record to a reporting endpoint as JSON.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl DetectionSink for HttpSink {
    async fn emit(&self, record: DetectionRecord) {
        let result = self
            .client
            .post(&self.endpoint)
            .json(&record)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(endpoint = %self.endpoint, status = %response.status(), "report rejected");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "failed to report detection");
            }
        }
    }
}

/// Emit to several sinks in order.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn DetectionSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn DetectionSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl DetectionSink for FanoutSink {
    async fn emit(&self, record: DetectionRecord) {
        for sink in &self.sinks {
            sink.emit(record.clone()).await;
        }
    }
}
