//! End-to-end pipeline scenarios: packets in, detection records out.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use flowsentry::cascade::model::{FixedModel, ModelSet, ScoreModel};
use flowsentry::cascade::AttackFamily;
use flowsentry::config::SentryConfig;
use flowsentry::event::{PacketEvent, Protocol, TcpFlags};
use flowsentry::sink::{DetectionBuffer, DetectionRecord, DetectionSink};

fn test_config() -> SentryConfig {
    SentryConfig {
        idle_timeout_secs: 1,
        evaluation_period_ms: 200,
        ..Default::default()
    }
}

fn models(stage1_p: f64, family_scores: &[(AttackFamily, f64)]) -> ModelSet {
    ModelSet {
        normal_filter: Box::new(FixedModel::new(stage1_p, "stub-s1/v1")),
        families: family_scores
            .iter()
            .map(|(f, p)| {
                let version = format!("stub-{}/v1", f);
                (*f, Box::new(FixedModel { probability: *p, version }) as Box<dyn ScoreModel>)
            })
            .collect(),
    }
}

/// A packet timestamped far enough in the past to expire on the next sweep.
fn aged_packet(src_port: u16, dst_port: u16, offset_ms: i64, len: u32, flags: TcpFlags) -> PacketEvent {
    PacketEvent {
        src_addr: IpAddr::V4(Ipv4Addr::new(192, 168, 0, 2)),
        dst_addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        src_port,
        dst_port,
        protocol: Protocol::Tcp,
        timestamp: Utc::now() - chrono::Duration::seconds(10) + chrono::Duration::milliseconds(offset_ms),
        byte_length: len,
        flags,
    }
}

async fn wait_for_records(buffer: &DetectionBuffer, count: usize) {
    for _ in 0..200 {
        if buffer.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {} detection records, have {}", count, buffer.len());
}

#[tokio::test]
async fn test_syn_burst_is_reported_as_portscan() {
    let config = test_config();
    let sink = Arc::new(DetectionBuffer::new(16));
    let set = models(
        0.9,
        &[(AttackFamily::PortScan, 0.8), (AttackFamily::Dos, 0.2)],
    );
    let handle = flowsentry::start_pipeline(&config, set, sink.clone());
    let sender = handle.sender();

    // 40 SYN packets over 2 seconds between the same 5-tuple, tiny frames.
    let syn = TcpFlags { syn: true, ..Default::default() };
    for i in 0..40 {
        sender
            .send(aged_packet(40000, 80, i * 50, 60, syn))
            .await
            .unwrap();
    }

    wait_for_records(&sink, 1).await;
    handle.shutdown().await;

    let records = sink.list();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.is_attack);
    assert_eq!(record.attack_type.to_string(), "PortScan");
    assert!((record.confidence - 0.8).abs() < 1e-9);
    assert!(record.suggestion.contains("Port scanning"));
    let probs = record.probabilities.as_ref().expect("probability map");
    assert_eq!(probs.len(), 2);
}

#[tokio::test]
async fn test_browsing_flow_is_reported_normal() {
    let config = test_config();
    let sink = Arc::new(DetectionBuffer::new(16));
    let set = models(0.2, &[(AttackFamily::PortScan, 0.9)]);
    let handle = flowsentry::start_pipeline(&config, set, sink.clone());
    let sender = handle.sender();

    // Typical web browsing: a handful of large frames, mixed flags.
    for i in 0..10 {
        let flags = if i == 0 {
            TcpFlags { syn: true, ..Default::default() }
        } else {
            TcpFlags { ack: true, ..Default::default() }
        };
        sender
            .send(aged_packet(50000, 443, i * 300, 1400, flags))
            .await
            .unwrap();
    }

    wait_for_records(&sink, 1).await;
    handle.shutdown().await;

    let records = sink.list();
    let record = &records[0];
    assert!(!record.is_attack);
    assert_eq!(record.attack_type.to_string(), "Normal");
    assert!((record.confidence - 0.8).abs() < 1e-9);
    assert!(record.suggestion.contains("benign"));
}

#[tokio::test]
async fn test_weak_attack_resemblance_is_suppressed() {
    let config = test_config();
    let sink = Arc::new(DetectionBuffer::new(16));
    let set = models(0.9, &[(AttackFamily::BruteForce, 0.3)]);
    let handle = flowsentry::start_pipeline(&config, set, sink.clone());

    handle
        .sender()
        .send(aged_packet(40000, 22, 0, 100, TcpFlags { syn: true, ..Default::default() }))
        .await
        .unwrap();

    wait_for_records(&sink, 1).await;
    handle.shutdown().await;

    let records = sink.list();
    let record = &records[0];
    assert!(!record.is_attack);
    assert_eq!(record.attack_type.to_string(), "Normal");
    assert!((record.confidence - 0.7).abs() < 1e-9);
    let explanation = record.explanation.as_ref().expect("explanation present");
    assert!(explanation.contains("BruteForce"));
    assert!(record.suggestion.starts_with("Safe:"));
}

#[tokio::test]
async fn test_demo_override_fires_only_when_enabled() {
    // Models that would never alert on their own.
    let quiet = || models(0.0, &[(AttackFamily::Dos, 0.0)]);

    // Disabled (default): magic port is ignored.
    let config = test_config();
    let sink = Arc::new(DetectionBuffer::new(16));
    let handle = flowsentry::start_pipeline(&config, quiet(), sink.clone());
    handle
        .sender()
        .send(aged_packet(40000, 1338, 0, 60, TcpFlags::default()))
        .await
        .unwrap();
    wait_for_records(&sink, 1).await;
    handle.shutdown().await;
    assert!(!sink.list()[0].is_attack);

    // Enabled: the signature wins regardless of model output.
    let config = SentryConfig { demo_override_enabled: true, ..test_config() };
    let sink = Arc::new(DetectionBuffer::new(16));
    let handle = flowsentry::start_pipeline(&config, quiet(), sink.clone());
    handle
        .sender()
        .send(aged_packet(40000, 1338, 0, 60, TcpFlags::default()))
        .await
        .unwrap();
    wait_for_records(&sink, 1).await;
    handle.shutdown().await;

    let records = sink.list();
    assert!(records[0].is_attack);
    assert_eq!(records[0].attack_type.to_string(), "PortScan");
    assert!((records[0].confidence - 0.99).abs() < 1e-9);
}

#[tokio::test]
async fn test_each_flow_is_reported_once() {
    let config = test_config();
    let sink = Arc::new(DetectionBuffer::new(16));
    let set = models(0.2, &[(AttackFamily::Dos, 0.1)]);
    let handle = flowsentry::start_pipeline(&config, set, sink.clone());
    let sender = handle.sender();

    // Two distinct flows, interleaved events.
    for i in 0..5 {
        sender.send(aged_packet(1111, 80, i * 100, 100, TcpFlags::default())).await.unwrap();
        sender.send(aged_packet(2222, 443, i * 100, 100, TcpFlags::default())).await.unwrap();
    }

    wait_for_records(&sink, 2).await;

    // Several more sweep periods: no duplicates may appear.
    tokio::time::sleep(Duration::from_millis(600)).await;
    handle.shutdown().await;

    let records = sink.list();
    assert_eq!(records.len(), 2);
    let mut ports: Vec<u16> = records.iter().map(|r| r.src_port).collect();
    ports.sort_unstable();
    assert_eq!(ports, vec![1111, 2222]);
}

/// Sink that takes a while per record, backed by a buffer for assertions.
struct SlowSink {
    inner: Arc<DetectionBuffer>,
}

#[async_trait::async_trait]
impl DetectionSink for SlowSink {
    async fn emit(&self, record: DetectionRecord) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.inner.emit(record).await;
    }
}

#[tokio::test]
async fn test_shutdown_delivers_records_from_final_sweep() {
    let config = test_config();
    let buffer = Arc::new(DetectionBuffer::new(16));
    let sink = Arc::new(SlowSink { inner: buffer.clone() });
    let set = models(0.2, &[(AttackFamily::Dos, 0.1)]);
    let handle = flowsentry::start_pipeline(&config, set, sink);

    handle
        .sender()
        .send(aged_packet(1111, 80, 0, 100, TcpFlags::default()))
        .await
        .unwrap();

    // Wait until the sweep has picked the flow up, then stop while the
    // slow sink is still working on it.
    for _ in 0..200 {
        if handle.stats().expired >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(handle.stats().expired, 1);
    handle.shutdown().await;

    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.list()[0].src_port, 1111);
}

#[tokio::test]
async fn test_malformed_events_are_counted_not_fatal() {
    let config = test_config();
    let sink = Arc::new(DetectionBuffer::new(16));
    let set = models(0.2, &[(AttackFamily::Dos, 0.1)]);
    let handle = flowsentry::start_pipeline(&config, set, sink.clone());
    let sender = handle.sender();

    let mut bad = aged_packet(1111, 80, 0, 100, TcpFlags::default());
    bad.byte_length = 0;
    sender.send(bad).await.unwrap();
    sender
        .send(aged_packet(2222, 80, 0, 100, TcpFlags::default()))
        .await
        .unwrap();

    wait_for_records(&sink, 1).await;
    let stats = handle.stats();
    assert_eq!(stats.malformed_dropped, 1);
    assert_eq!(stats.ingested, 1);
    handle.shutdown().await;

    assert_eq!(sink.list().len(), 1);
    assert_eq!(sink.list()[0].src_port, 2222);
}
