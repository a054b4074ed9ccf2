//! The detection pipeline: two cooperating tasks around one flow table.
//!
//! The ingest task drains the packet-event channel and updates the table;
//! the sweep task ticks on the evaluation period, pulls expired flows, and
//! runs extraction + cascade on each. Emission is spawned per record so a
//! slow sink never stalls flow processing; outstanding emissions are drained
//! before the sweep task exits.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::advisor;
use crate::cascade::CascadeEngine;
use crate::config::SentryConfig;
use crate::event::PacketEvent;
use crate::features;
use crate::flow::{FlowRecord, FlowTable, TableStats};
use crate::sink::{DetectionRecord, DetectionSink};

/// Handle to a running pipeline.
pub struct PipelineHandle {
    events: mpsc::Sender<PacketEvent>,
    cancel: CancellationToken,
    ingest_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
    table: Arc<Mutex<FlowTable>>,
}

impl PipelineHandle {
    /// Channel end for the capture collaborator.
    pub fn sender(&self) -> mpsc::Sender<PacketEvent> {
        self.events.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stats(&self) -> TableStats {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).stats
    }

    /// Stop both tasks. An in-flight sweep finishes emitting what already
    /// expired; flows still active are discarded, not flushed.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.ingest_task.await;
        let _ = self.sweep_task.await;

        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        info!(
            active_flows_discarded = table.len(),
            expired_total = table.stats.expired,
            malformed_dropped = table.stats.malformed_dropped,
            "pipeline stopped"
        );
    }
}

/// Wire up and start the pipeline.
pub fn start(
    config: &SentryConfig,
    engine: CascadeEngine,
    sink: Arc<dyn DetectionSink>,
) -> PipelineHandle {
    let (tx, rx) = mpsc::channel::<PacketEvent>(config.channel_capacity);
    let table = Arc::new(Mutex::new(FlowTable::new(config.flow_config())));
    let cancel = CancellationToken::new();
    let engine = Arc::new(engine);

    let ingest_task = tokio::spawn(run_ingest(rx, table.clone(), cancel.clone()));
    let sweep_task = tokio::spawn(run_sweep(
        table.clone(),
        engine,
        sink,
        config.evaluation_period(),
        cancel.clone(),
    ));

    PipelineHandle {
        events: tx,
        cancel,
        ingest_task,
        sweep_task,
        table,
    }
}

/// Ingest path: channel to flow table, non-blocking per event.
async fn run_ingest(
    mut rx: mpsc::Receiver<PacketEvent>,
    table: Arc<Mutex<FlowTable>>,
    cancel: CancellationToken,
) {
    info!("ingest path started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => match maybe {
                Some(event) => {
                    table.lock().unwrap_or_else(|e| e.into_inner()).ingest(&event);
                }
                None => {
                    debug!("event channel closed");
                    break;
                }
            }
        }
    }
    info!("ingest path stopped");
}

/// Evaluation path: periodic sweep, then extract/classify/emit per flow.
async fn run_sweep(
    table: Arc<Mutex<FlowTable>>,
    engine: Arc<CascadeEngine>,
    sink: Arc<dyn DetectionSink>,
    period: std::time::Duration,
    cancel: CancellationToken,
) {
    info!(period_ms = period.as_millis() as u64, "evaluation path started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut emissions = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let expired = {
                    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
                    table.sweep_expired(Utc::now())
                };
                if !expired.is_empty() {
                    debug!(count = expired.len(), "flows expired");
                }
                for record in expired {
                    evaluate(&engine, &sink, record, &mut emissions);
                }
                // Reap finished emission tasks without blocking the sweep.
                while emissions.try_join_next().is_some() {}
            }
        }
    }

    // In-flight emissions from the last sweep finish before shutdown
    // completes.
    while emissions.join_next().await.is_some() {}
    info!("evaluation path stopped");
}

/// Classify one expired flow and hand the result to the sink.
fn evaluate(
    engine: &Arc<CascadeEngine>,
    sink: &Arc<dyn DetectionSink>,
    record: FlowRecord,
    emissions: &mut JoinSet<()>,
) {
    let (src, dst) = (record.initiator, record.responder);
    let (stage1, stage2) = features::extract(&record, dst.1, src.1);
    let verdict = engine.classify(&record, &stage1, &stage2);
    let suggestion = advisor::suggestion(&verdict, dst.1);

    debug!(
        flow = %record.key,
        verdict = %verdict.label,
        confidence = verdict.confidence,
        "flow evaluated"
    );

    let detection = DetectionRecord::new(
        Utc::now(),
        src,
        dst,
        record.key.protocol,
        verdict,
        suggestion,
    );

    // Sink latency must never back-pressure the sweep; the handles are
    // drained when the sweep task stops.
    let sink = sink.clone();
    emissions.spawn(async move {
        sink.emit(detection).await;
    });
}
