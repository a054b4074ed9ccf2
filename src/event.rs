//! Inbound packet-event boundary.
//!
//! The capture subsystem (external) hands the core parsed events only:
//! 5-tuple, timestamp, frame length, transport flags. Anything missing or
//! nonsensical is rejected here with a typed error; the flow table drops
//! and counts such events instead of propagating a fault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("unspecified {side} address")]
    UnspecifiedAddress { side: &'static str },

    #[error("{protocol} event with port 0")]
    MissingPort { protocol: Protocol },

    #[error("zero-length frame")]
    EmptyFrame,
}

/// Transport protocol of a packet event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl Protocol {
    /// Whether the protocol addresses endpoints by port.
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Other(n) => write!(f, "PROTO({})", n),
        }
    }
}

/// Decoded TCP header flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub urg: bool,
}

impl TcpFlags {
    /// Decode from the raw flag byte of a TCP header.
    pub fn from_bits(bits: u8) -> Self {
        Self {
            fin: bits & 0x01 != 0,
            syn: bits & 0x02 != 0,
            rst: bits & 0x04 != 0,
            psh: bits & 0x08 != 0,
            ack: bits & 0x10 != 0,
            urg: bits & 0x20 != 0,
        }
    }
}

/// A single parsed packet as delivered by the capture collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketEvent {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub timestamp: DateTime<Utc>,
    /// Frame length on the wire, in bytes.
    pub byte_length: u32,
    #[serde(default)]
    pub flags: TcpFlags,
}

impl PacketEvent {
    /// Check the event carries everything flow accounting needs.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.src_addr.is_unspecified() {
            return Err(EventError::UnspecifiedAddress { side: "source" });
        }
        if self.dst_addr.is_unspecified() {
            return Err(EventError::UnspecifiedAddress { side: "destination" });
        }
        if self.protocol.has_ports() && (self.src_port == 0 || self.dst_port == 0) {
            return Err(EventError::MissingPort { protocol: self.protocol });
        }
        if self.byte_length == 0 {
            return Err(EventError::EmptyFrame);
        }
        Ok(())
    }
}
