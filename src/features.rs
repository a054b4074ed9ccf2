//! Per-flow feature extraction for the classification cascade.
//!
//! Both vectors are pure functions of the flow record's accumulated
//! counters. Layout is a versioned contract shared with the trained models:
//! reordering or resizing either vector is a breaking change that requires
//! coordinated model retraining.

use serde::Serialize;

use crate::flow::FlowRecord;

/// Bumped whenever either layout below changes.
pub const FEATURE_SCHEMA_VERSION: u8 = 1;

/// Stage-1 layout: reduced set for the binary normal/anomalous filter.
pub const STAGE1_LAYOUT: &[&str] = &[
    "duration_secs",
    "total_packets",
    "total_bytes",
    "bytes_per_packet",
    "packets_per_sec",
    "iat_mean",
    "iat_std",
    "syn_ratio",
];

/// Stage-2 layout: richer set for attack-family discrimination.
pub const STAGE2_LAYOUT: &[&str] = &[
    "duration_secs",
    "fwd_packets",
    "bwd_packets",
    "fwd_bytes",
    "bwd_bytes",
    "bytes_per_packet",
    "packets_per_sec",
    "down_up_ratio",
    "iat_mean",
    "iat_std",
    "iat_min",
    "iat_max",
    "syn_count",
    "ack_count",
    "fin_count",
    "rst_count",
    "psh_count",
    "urg_count",
    "dst_port",
    "src_port",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stage1Features {
    pub duration_secs: f64,
    pub total_packets: f64,
    pub total_bytes: f64,
    pub bytes_per_packet: f64,
    pub packets_per_sec: f64,
    pub iat_mean: f64,
    pub iat_std: f64,
    pub syn_ratio: f64,
}

impl Stage1Features {
    /// Fixed-order vector matching [`STAGE1_LAYOUT`].
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.duration_secs,
            self.total_packets,
            self.total_bytes,
            self.bytes_per_packet,
            self.packets_per_sec,
            self.iat_mean,
            self.iat_std,
            self.syn_ratio,
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stage2Features {
    pub duration_secs: f64,
    pub fwd_packets: f64,
    pub bwd_packets: f64,
    pub fwd_bytes: f64,
    pub bwd_bytes: f64,
    pub bytes_per_packet: f64,
    pub packets_per_sec: f64,
    pub down_up_ratio: f64,
    pub iat_mean: f64,
    pub iat_std: f64,
    pub iat_min: f64,
    pub iat_max: f64,
    pub syn_count: f64,
    pub ack_count: f64,
    pub fin_count: f64,
    pub rst_count: f64,
    pub psh_count: f64,
    pub urg_count: f64,
    pub dst_port: f64,
    pub src_port: f64,
}

impl Stage2Features {
    /// Fixed-order vector matching [`STAGE2_LAYOUT`].
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.duration_secs,
            self.fwd_packets,
            self.bwd_packets,
            self.fwd_bytes,
            self.bwd_bytes,
            self.bytes_per_packet,
            self.packets_per_sec,
            self.down_up_ratio,
            self.iat_mean,
            self.iat_std,
            self.iat_min,
            self.iat_max,
            self.syn_count,
            self.ack_count,
            self.fin_count,
            self.rst_count,
            self.psh_count,
            self.urg_count,
            self.dst_port,
            self.src_port,
        ]
    }
}

/// Extract both stage vectors from an expired flow record.
///
/// Ports are passed in resolved to the flow's orientation (destination =
/// the responder side the initiator was talking to).
pub fn extract(
    record: &FlowRecord,
    dst_port: u16,
    src_port: u16,
) -> (Stage1Features, Stage2Features) {
    let duration = record.duration_secs();
    let packets = record.total_packets() as f64;
    let bytes = record.total_bytes() as f64;
    let bytes_per_packet = if packets > 0.0 { bytes / packets } else { 0.0 };
    let packets_per_sec = if duration > 0.0 { packets / duration } else { packets };
    let syn_ratio = if packets > 0.0 {
        f64::from(record.flags.syn) / packets
    } else {
        0.0
    };
    let down_up_ratio = if record.fwd_bytes > 0 {
        record.bwd_bytes as f64 / record.fwd_bytes as f64
    } else {
        0.0
    };

    let stage1 = Stage1Features {
        duration_secs: duration,
        total_packets: packets,
        total_bytes: bytes,
        bytes_per_packet,
        packets_per_sec,
        iat_mean: record.iat.mean(),
        iat_std: record.iat.std_dev(),
        syn_ratio,
    };

    let stage2 = Stage2Features {
        duration_secs: duration,
        fwd_packets: record.fwd_packets as f64,
        bwd_packets: record.bwd_packets as f64,
        fwd_bytes: record.fwd_bytes as f64,
        bwd_bytes: record.bwd_bytes as f64,
        bytes_per_packet,
        packets_per_sec,
        down_up_ratio,
        iat_mean: record.iat.mean(),
        iat_std: record.iat.std_dev(),
        iat_min: record.iat.min(),
        iat_max: record.iat.max(),
        syn_count: f64::from(record.flags.syn),
        ack_count: f64::from(record.flags.ack),
        fin_count: f64::from(record.flags.fin),
        rst_count: f64::from(record.flags.rst),
        psh_count: f64::from(record.flags.psh),
        urg_count: f64::from(record.flags.urg),
        dst_port: f64::from(dst_port),
        src_port: f64::from(src_port),
    };

    (stage1, stage2)
}
