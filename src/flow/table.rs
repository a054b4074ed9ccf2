//! Flow table: keyed store of in-progress flows with timeout-driven expiry.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::event::PacketEvent;
use crate::flow::{FlowKey, FlowRecord};

/// Expiry policy and capacity bounds for the flow table.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Inactivity after which a flow is considered finished.
    pub idle_timeout: Duration,
    /// Absolute cap on flow duration regardless of activity.
    pub max_lifetime: Duration,
    /// Hard bound on concurrently tracked flows.
    pub max_flows: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::seconds(10),
            max_lifetime: Duration::seconds(120),
            max_flows: 100_000,
        }
    }
}

/// Table counters, exposed for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub ingested: u64,
    pub created: u64,
    pub updated: u64,
    pub expired: u64,
    pub evicted: u64,
    pub malformed_dropped: u64,
}

/// Mutable store of active flows keyed by normalized 5-tuple.
pub struct FlowTable {
    flows: HashMap<FlowKey, FlowRecord>,
    config: FlowConfig,
    pub stats: TableStats,
}

impl FlowTable {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            flows: HashMap::with_capacity(config.max_flows.min(65_536)),
            config,
            stats: TableStats::default(),
        }
    }

    /// Fold one packet event into the table.
    ///
    /// Malformed events are dropped and counted; they never surface as an
    /// error to the caller. O(1) amortized.
    pub fn ingest(&mut self, event: &PacketEvent) {
        if let Err(e) = event.validate() {
            self.stats.malformed_dropped += 1;
            debug!(error = %e, "dropping malformed packet event");
            return;
        }
        self.stats.ingested += 1;

        let key = FlowKey::new(
            (event.src_addr, event.src_port),
            (event.dst_addr, event.dst_port),
            event.protocol,
        );

        if let Some(record) = self.flows.get_mut(&key) {
            record.update(event);
            self.stats.updated += 1;
            return;
        }

        if self.flows.len() >= self.config.max_flows {
            self.evict_oldest();
        }
        self.flows.insert(key, FlowRecord::new(event));
        self.stats.created += 1;
    }

    /// Remove and return every flow past its idle timeout or max lifetime.
    ///
    /// Removal is atomic with the read: a returned key is gone from the
    /// table, so each flow appears in at most one sweep.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<FlowRecord> {
        let idle = self.config.idle_timeout;
        let max = self.config.max_lifetime;

        let expired_keys: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, record)| record.is_expired(now, idle, max))
            .map(|(key, _)| key.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some(record) = self.flows.remove(&key) {
                self.stats.expired += 1;
                expired.push(record);
            }
        }
        expired
    }

    /// Evict the flow idle the longest (only when the table is full).
    fn evict_oldest(&mut self) {
        if let Some(key) = self
            .flows
            .iter()
            .min_by_key(|(_, record)| record.last_seen)
            .map(|(key, _)| key.clone())
        {
            warn!(flow = %key, "flow table full, evicting oldest flow");
            self.flows.remove(&key);
            self.stats.evicted += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
