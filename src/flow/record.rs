//! Per-flow aggregate state, accumulated incrementally per packet.
//!
//! No raw packet history is retained; every derived statistic (inter-arrival
//! moments, flag histogram, per-direction counters) is folded in as packets
//! arrive.

use crate::event::{PacketEvent, Protocol};
use crate::flow::{Direction, Endpoint, FlowKey};
use chrono::{DateTime, Utc};

/// Histogram of TCP flags seen across the whole flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagCounts {
    pub syn: u32,
    pub ack: u32,
    pub fin: u32,
    pub rst: u32,
    pub psh: u32,
    pub urg: u32,
}

/// Running inter-arrival statistics (Welford's online algorithm).
#[derive(Debug, Clone, Copy, Default)]
pub struct IatStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl IatStats {
    fn record(&mut self, delta_secs: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = delta_secs;
            self.max = delta_secs;
        } else {
            self.min = self.min.min(delta_secs);
            self.max = self.max.max(delta_secs);
        }
        let d = delta_secs - self.mean;
        self.mean += d / self.count as f64;
        self.m2 += d * (delta_secs - self.mean);
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Mutable aggregate for one active flow.
///
/// Owned exclusively by the flow table: only the ingest path mutates it, and
/// the expiry sweep reads it exactly once on removal.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub key: FlowKey,
    /// Source endpoint of the first packet; resolves direction of the rest.
    pub initiator: Endpoint,
    pub responder: Endpoint,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub fwd_packets: u64,
    pub fwd_bytes: u64,
    pub bwd_packets: u64,
    pub bwd_bytes: u64,
    pub flags: FlagCounts,
    pub iat: IatStats,
}

impl FlowRecord {
    pub fn new(event: &PacketEvent) -> Self {
        let initiator = (event.src_addr, event.src_port);
        let responder = (event.dst_addr, event.dst_port);
        let mut record = Self {
            key: FlowKey::new(initiator, responder, event.protocol),
            initiator,
            responder,
            created: event.timestamp,
            last_seen: event.timestamp,
            fwd_packets: 0,
            fwd_bytes: 0,
            bwd_packets: 0,
            bwd_bytes: 0,
            flags: FlagCounts::default(),
            iat: IatStats::default(),
        };
        record.count(event, Direction::Forward);
        record
    }

    /// Fold a packet into the aggregate. Returns the resolved direction.
    pub fn update(&mut self, event: &PacketEvent) -> Direction {
        let direction = self.direction_of(event);
        let delta = (event.timestamp - self.last_seen)
            .num_microseconds()
            .unwrap_or(i64::MAX) as f64
            / 1_000_000.0;
        // Out-of-order capture timestamps contribute a zero gap.
        self.iat.record(delta.max(0.0));
        if event.timestamp > self.last_seen {
            self.last_seen = event.timestamp;
        }
        self.count(event, direction);
        direction
    }

    fn count(&mut self, event: &PacketEvent, direction: Direction) {
        match direction {
            Direction::Forward => {
                self.fwd_packets += 1;
                self.fwd_bytes += u64::from(event.byte_length);
            }
            Direction::Backward => {
                self.bwd_packets += 1;
                self.bwd_bytes += u64::from(event.byte_length);
            }
        }
        if event.protocol == Protocol::Tcp {
            let f = &event.flags;
            self.flags.syn += u32::from(f.syn);
            self.flags.ack += u32::from(f.ack);
            self.flags.fin += u32::from(f.fin);
            self.flags.rst += u32::from(f.rst);
            self.flags.psh += u32::from(f.psh);
            self.flags.urg += u32::from(f.urg);
        }
    }

    fn direction_of(&self, event: &PacketEvent) -> Direction {
        if (event.src_addr, event.src_port) == self.initiator {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.last_seen - self.created)
            .num_microseconds()
            .unwrap_or(i64::MAX)
            .max(0) as f64
            / 1_000_000.0
    }

    pub fn total_packets(&self) -> u64 {
        self.fwd_packets + self.bwd_packets
    }

    pub fn total_bytes(&self) -> u64 {
        self.fwd_bytes + self.bwd_bytes
    }

    /// Whether the flow exceeded either expiry bound at `now`.
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        idle_timeout: chrono::Duration,
        max_lifetime: chrono::Duration,
    ) -> bool {
        now - self.last_seen > idle_timeout || now - self.created > max_lifetime
    }
}
