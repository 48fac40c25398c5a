//! Drop counters shared by every forwarding decision.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::config::DropAccounting;
use crate::ipv6::{IP_PROTO_ICMP6, IP_PROTO_TCP, IP_PROTO_UDP};

/// Per-layer drop counters. Monotonic; the forwarder never resets them.
#[derive(Debug, Default)]
pub struct NetStats {
    ipv6_drop: AtomicU32,
    tcp_drop: AtomicU32,
    udp_drop: AtomicU32,
    icmpv6_drop: AtomicU32,
}

/// Point-in-time copy of the counters, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetStatsSnapshot {
    pub ipv6_drop: u32,
    pub tcp_drop: u32,
    pub udp_drop: u32,
    pub icmpv6_drop: u32,
}

impl NetStatsSnapshot {
    pub fn total(&self) -> u64 {
        self.ipv6_drop as u64 + self.tcp_drop as u64 + self.udp_drop as u64 + self.icmpv6_drop as u64
    }
}

static GLOBAL: OnceLock<Arc<NetStats>> = OnceLock::new();

impl NetStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide counters, created on first use.
    pub fn global() -> Arc<NetStats> {
        GLOBAL.get_or_init(|| Arc::new(NetStats::new())).clone()
    }

    pub fn ipv6_dropped(&self) {
        bump(&self.ipv6_drop);
    }

    /// Charge a dropped packet of transport protocol `proto`.
    pub fn drop_packet(&self, policy: DropAccounting, proto: u8) {
        match policy {
            DropAccounting::Blanket => {
                bump(&self.icmpv6_drop);
                bump(&self.udp_drop);
                bump(&self.tcp_drop);
            }
            DropAccounting::PerProtocol => match proto {
                IP_PROTO_TCP => bump(&self.tcp_drop),
                IP_PROTO_UDP => bump(&self.udp_drop),
                IP_PROTO_ICMP6 => bump(&self.icmpv6_drop),
                _ => {}
            },
        }
        bump(&self.ipv6_drop);
    }

    pub fn snapshot(&self) -> NetStatsSnapshot {
        NetStatsSnapshot {
            ipv6_drop: self.ipv6_drop.load(Ordering::Relaxed),
            tcp_drop: self.tcp_drop.load(Ordering::Relaxed),
            udp_drop: self.udp_drop.load(Ordering::Relaxed),
            icmpv6_drop: self.icmpv6_drop.load(Ordering::Relaxed),
        }
    }
}

fn bump(c: &AtomicU32) {
    c.fetch_add(1, Ordering::Relaxed);
}
