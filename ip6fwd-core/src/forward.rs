//! IPv6 forwarding: called from the input path for packets not addressed to us.
//!
//! The packet may be relayed to another device, converted for a different link
//! layer, or sent back out the device it came in on, depending on configuration,
//! routing and the networks each device serves.

use std::sync::Arc;

use crate::config::Capabilities;
use crate::error::ForwardError;
use crate::hdrsize::hdrsize;
use crate::iob::{stage_payload, IobChain, IobPool};
use crate::ipv6::{Ipv6Hdr, RxFrame, IP_PROTO_TCP, MAX_L3L4_HDRLEN};
use crate::netdev::{select_egress, DevId, NetDev, RouteResolver};
use crate::sixlowpan::{packet_conversion, Conversion, LinkAdapter, NoLinkAdapter};
use crate::stats::NetStats;

/// Verbatim copy of the IPv6 + transport headers of a forwarded packet.
#[derive(Clone)]
pub struct HeaderCopy {
    bytes: [u8; MAX_L3L4_HDRLEN],
    len: usize,
}

impl HeaderCopy {
    pub fn from_slice(src: &[u8]) -> Option<Self> {
        if src.len() > MAX_L3L4_HDRLEN {
            return None;
        }
        let mut bytes = [0u8; MAX_L3L4_HDRLEN];
        bytes[..src.len()].copy_from_slice(src);
        Some(Self {
            bytes,
            len: src.len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn ipv6(&self) -> Result<Ipv6Hdr, ForwardError> {
        Ipv6Hdr::parse(self.as_bytes())
    }
}

impl std::fmt::Debug for HeaderCopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderCopy").field("len", &self.len).finish()
    }
}

/// Everything a send path needs once the receive buffer has been reused:
/// the egress device, a copy of the headers and the staged payload.
///
/// Whoever holds this owns the payload chain; dropping it returns the buffers to the pool.
#[derive(Debug)]
pub struct Forward {
    egress: DevId,
    hdr: HeaderCopy,
    iob: Option<IobChain>,
}

impl Forward {
    pub fn egress(&self) -> DevId {
        self.egress
    }

    pub fn header(&self) -> &HeaderCopy {
        &self.hdr
    }

    /// Staged payload; `None` for a header-only packet.
    pub fn payload(&self) -> Option<&IobChain> {
        self.iob.as_ref()
    }

    pub fn payload_len(&self) -> usize {
        self.iob.as_ref().map_or(0, IobChain::len)
    }

    pub fn into_parts(self) -> (DevId, HeaderCopy, Option<IobChain>) {
        (self.egress, self.hdr, self.iob)
    }
}

/// Protocol-specific send paths for packets leaving through a different device.
///
/// A path takes the `Forward` by value. On success it keeps it until the egress device
/// polls for data; on failure the `Forward` is dropped and its buffers released.
///
/// Neither path exists yet: both need link-address resolution (neighbor discovery)
/// and link header rewriting, and TCP must additionally obey ACK and window rules.
pub trait ForwardPath {
    fn tcp_forward(&mut self, ingress: &NetDev, fwd: Forward) -> Result<(), ForwardError> {
        log::warn!(
            "TCP forwarding from {} to dev {} not yet supported",
            ingress.name,
            fwd.egress().0
        );
        Err(ForwardError::UnsupportedForwardingPath)
    }

    fn dev_forward(&mut self, ingress: &NetDev, fwd: Forward) -> Result<(), ForwardError> {
        log::warn!(
            "UDP/ICMPv6 forwarding from {} to dev {} not yet supported",
            ingress.name,
            fwd.egress().0
        );
        Err(ForwardError::UnsupportedForwardingPath)
    }
}

/// The stock send paths: both report `UnsupportedForwardingPath`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPaths;

impl ForwardPath for UnsupportedPaths {}

/// Forwarding decision engine. Holds the capability descriptor and its collaborators.
pub struct Forwarder<R, P = UnsupportedPaths, A = NoLinkAdapter> {
    caps: Capabilities,
    resolver: R,
    pool: IobPool,
    paths: P,
    adapter: A,
    stats: Arc<NetStats>,
}

impl<R: RouteResolver> Forwarder<R> {
    /// Pool sized from `caps`, process-wide counters, stock paths, no link adapter.
    pub fn new(caps: Capabilities, resolver: R) -> Self {
        let pool = IobPool::from_caps(&caps);
        Self {
            caps,
            resolver,
            pool,
            paths: UnsupportedPaths,
            adapter: NoLinkAdapter,
            stats: NetStats::global(),
        }
    }
}

impl<R, P, A> Forwarder<R, P, A>
where
    R: RouteResolver,
    P: ForwardPath,
    A: LinkAdapter,
{
    pub fn with_pool(mut self, pool: IobPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_stats(mut self, stats: Arc<NetStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_paths<P2: ForwardPath>(self, paths: P2) -> Forwarder<R, P2, A> {
        Forwarder {
            caps: self.caps,
            resolver: self.resolver,
            pool: self.pool,
            paths,
            adapter: self.adapter,
            stats: self.stats,
        }
    }

    pub fn with_adapter<A2: LinkAdapter>(self, adapter: A2) -> Forwarder<R, P, A2> {
        Forwarder {
            caps: self.caps,
            resolver: self.resolver,
            pool: self.pool,
            paths: self.paths,
            adapter,
            stats: self.stats,
        }
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub fn pool(&self) -> &IobPool {
        &self.pool
    }

    pub fn stats(&self) -> &Arc<NetStats> {
        &self.stats
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    pub fn paths(&self) -> &P {
        &self.paths
    }

    pub fn paths_mut(&mut self) -> &mut P {
        &mut self.paths
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Forward a packet received on `dev` that is not addressed to this host.
    ///
    /// On input `frame` holds the packet with the L1 header already stripped.
    ///
    /// `Ok` with `frame` consumed: handed to an egress path, converted, or deliberately
    /// dropped by the link adapter. `Ok` with the length unchanged: send it back out
    /// `dev` as-is. `Err`: dropped, counted, and `frame` consumed.
    pub fn forward(&mut self, dev: &NetDev, frame: &mut RxFrame<'_>) -> Result<(), ForwardError> {
        let proto = frame.packet().get(6).copied().unwrap_or(0);
        match self.route(dev, frame) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("dropping packet from {}: {}", dev.name, e);
                self.dropstats(proto);
                frame.consume();
                Err(e)
            }
        }
    }

    fn route(&mut self, dev: &NetDev, frame: &mut RxFrame<'_>) -> Result<(), ForwardError> {
        let hdr = Ipv6Hdr::parse(frame.packet())?;
        let egress = select_egress(&self.resolver, &self.caps, dev, &hdr)?;
        let conv = packet_conversion(
            &self.caps,
            dev,
            egress.dev,
            &hdr,
            frame,
            &mut self.adapter,
            &self.stats,
        );
        if conv == Conversion::Handled {
            return Ok(());
        }

        if self.caps.multinic && !egress.same_as_ingress {
            let to = egress.dev.id;
            return self.dispatch(dev, to, &hdr, frame);
        }

        // Back out the ingress device. The driver resends d_buf as-is; the link header
        // (source/destination MAC via neighbor discovery) is not rewritten here.
        log::debug!("passing {} bytes back out {}", frame.len(), dev.name);
        Ok(())
    }

    /// Stage the payload and hand it to the protocol send path for `egress`.
    fn dispatch(
        &mut self,
        dev: &NetDev,
        egress: DevId,
        hdr: &Ipv6Hdr,
        frame: &mut RxFrame<'_>,
    ) -> Result<(), ForwardError> {
        let packet = frame.packet();
        let hdrsize = hdrsize(&self.caps, packet)?;
        let iob = stage_payload(&self.pool, packet, hdrsize)?;
        let hdr_copy = HeaderCopy::from_slice(&packet[..hdrsize]).ok_or(ForwardError::Truncated)?;
        let fwd = Forward {
            egress,
            hdr: hdr_copy,
            iob,
        };
        log::debug!(
            "forwarding proto {} to dev {}: {} header + {} payload bytes",
            hdr.proto,
            egress.0,
            hdrsize,
            fwd.payload_len()
        );
        if hdr.proto == IP_PROTO_TCP {
            self.paths.tcp_forward(dev, fwd)?;
        } else {
            self.paths.dev_forward(dev, fwd)?;
        }
        frame.consume();
        Ok(())
    }

    fn dropstats(&self, proto: u8) {
        if self.caps.statistics {
            self.stats.drop_packet(self.caps.drop_accounting, proto);
        }
    }
}
