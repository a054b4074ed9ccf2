//! Flow lifecycle: keys, records, and the timeout-driven flow table.

pub mod record;
pub mod table;

pub use record::FlowRecord;
pub use table::{FlowTable, TableStats};

use crate::event::Protocol;
use serde::Serialize;
use std::net::IpAddr;

/// Direction of a packet relative to the flow's initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Initiator -> responder (same orientation as the flow's first packet).
    Forward,
    /// Responder -> initiator.
    Backward,
}

/// One endpoint of a flow.
pub type Endpoint = (IpAddr, u16);

/// Normalized flow identity.
///
/// Endpoints are stored sorted so a flow and its reverse direction hash to
/// the same key. Direction lives on the record, never in the key: two
/// packets belong to the same flow iff their normalized keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FlowKey {
    pub lo: Endpoint,
    pub hi: Endpoint,
    pub protocol: Protocol,
}

impl FlowKey {
    pub fn new(src: Endpoint, dst: Endpoint, protocol: Protocol) -> Self {
        if src <= dst {
            Self { lo: src, hi: dst, protocol }
        } else {
            Self { lo: dst, hi: src, protocol }
        }
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}<->{}:{}/{}",
            self.lo.0, self.lo.1, self.hi.0, self.hi.1, self.protocol
        )
    }
}
