//! IPv6 forwarding decision engine for small embedded network stacks.
//! Host-driven: the input path hands in a received frame; the engine picks the egress
//! device, converts, stages and hands off, or drops and counts. No I/O of its own.

pub mod config;
pub mod error;
pub mod ffi;
pub mod forward;
pub mod hdrsize;
pub mod iob;
pub mod ipv6;
pub mod netdev;
pub mod sixlowpan;
pub mod stats;

pub use config::{Capabilities, DropAccounting};
pub use error::ForwardError;
pub use forward::{Forward, ForwardPath, Forwarder, HeaderCopy, UnsupportedPaths};
pub use iob::{IobChain, IobPool};
pub use ipv6::{Ipv6Hdr, RxFrame};
pub use netdev::{DevId, LinkType, NetDev, NetDevTable, RouteResolver};
pub use sixlowpan::{LinkAdapter, NoLinkAdapter};
pub use stats::{NetStats, NetStatsSnapshot};
