//! Output conversion hook. Only IEEE 802.15.4 (6LoWPAN) needs one for now, but this is
//! where other link-layer conversions would plug in.

use crate::config::Capabilities;
use crate::ipv6::{Ipv6Hdr, RxFrame, IP_PROTO_TCP, IP_PROTO_UDP};
use crate::netdev::{LinkType, NetDev};
use crate::stats::NetStats;

/// Link-specific transmit routines. Each does its own fragmentation, compression and
/// framing and queues the result on `egress`; transmission happens later.
///
/// Returns true if the packet was taken. A refused packet is counted as dropped.
pub trait LinkAdapter {
    fn tcp_send(&mut self, ingress: &NetDev, egress: &NetDev, packet: &[u8]) -> bool;
    fn udp_send(&mut self, ingress: &NetDev, egress: &NetDev, packet: &[u8]) -> bool;
}

/// Adapter for stacks built without any link conversion. Refuses every packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLinkAdapter;

impl LinkAdapter for NoLinkAdapter {
    fn tcp_send(&mut self, _ingress: &NetDev, egress: &NetDev, _packet: &[u8]) -> bool {
        log::warn!("no link adapter for {}, TCP packet refused", egress.name);
        false
    }

    fn udp_send(&mut self, _ingress: &NetDev, egress: &NetDev, _packet: &[u8]) -> bool {
        log::warn!("no link adapter for {}, UDP packet refused", egress.name);
        false
    }
}

/// Outcome of the conversion hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// The frame was converted and queued, or dropped; it has been consumed.
    Handled,
    /// The egress link needs no conversion; forward normally.
    NotApplicable,
}

/// Whether a frame leaving through `egress` must go through 6LoWPAN.
pub fn needs_conversion(caps: &Capabilities, frame: &RxFrame<'_>, egress: &NetDev) -> bool {
    if !caps.sixlowpan || frame.is_empty() {
        return false;
    }
    // Without multi-link support every device is 6LoWPAN.
    !caps.multilink || egress.lltype == LinkType::Ieee802154
}

/// Let the link adapter take the frame if the egress link requires conversion.
///
/// Protocols the adapter cannot carry, and packets it refuses, are dropped here and
/// charged to the IPv6 counter; that still counts as handled.
pub fn packet_conversion<A: LinkAdapter + ?Sized>(
    caps: &Capabilities,
    ingress: &NetDev,
    egress: &NetDev,
    hdr: &Ipv6Hdr,
    frame: &mut RxFrame<'_>,
    adapter: &mut A,
    stats: &NetStats,
) -> Conversion {
    if !needs_conversion(caps, frame, egress) {
        return Conversion::NotApplicable;
    }
    let packet = frame.packet();
    let taken = match hdr.proto {
        IP_PROTO_TCP if caps.tcp => adapter.tcp_send(ingress, egress, packet),
        IP_PROTO_UDP if caps.udp => adapter.udp_send(ingress, egress, packet),
        proto => {
            log::warn!("dropping, unsupported 6LoWPAN protocol: {}", proto);
            false
        }
    };
    if !taken && caps.statistics {
        stats.ipv6_dropped();
    }
    frame.consume();
    Conversion::Handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipv6::testutil::*;
    use std::net::Ipv6Addr;

    #[derive(Default)]
    struct Recorder {
        tcp: Vec<Vec<u8>>,
        udp: Vec<Vec<u8>>,
    }

    impl LinkAdapter for Recorder {
        fn tcp_send(&mut self, _ingress: &NetDev, _egress: &NetDev, packet: &[u8]) -> bool {
            self.tcp.push(packet.to_vec());
            true
        }
        fn udp_send(&mut self, _ingress: &NetDev, _egress: &NetDev, packet: &[u8]) -> bool {
            self.udp.push(packet.to_vec());
            true
        }
    }

    fn devs() -> (NetDev, NetDev) {
        (
            NetDev::new(0, "eth0", LinkType::Ethernet, "fd00::1".parse().unwrap(), 64),
            NetDev::new(1, "wpan0", LinkType::Ieee802154, "fd01::1".parse().unwrap(), 64),
        )
    }

    fn sixlowpan_caps(multilink: bool) -> Capabilities {
        Capabilities {
            sixlowpan: true,
            multilink,
            ..Capabilities::default()
        }
    }

    fn addrs() -> (Ipv6Addr, Ipv6Addr) {
        ("fd00::2".parse().unwrap(), "fd01::2".parse().unwrap())
    }

    #[test]
    fn udp_goes_to_adapter() {
        let (eth, wpan) = devs();
        let (src, dst) = addrs();
        let pkt = udp_packet(src, dst, b"payload");
        let hdr = Ipv6Hdr::parse(&pkt).unwrap();
        let mut frame = RxFrame::from_packet(&pkt);
        let mut rec = Recorder::default();
        let stats = NetStats::new();
        let r = packet_conversion(&sixlowpan_caps(true), &eth, &wpan, &hdr, &mut frame, &mut rec, &stats);
        assert_eq!(r, Conversion::Handled);
        assert!(frame.is_empty());
        assert_eq!(rec.udp, vec![pkt.clone()]);
        assert!(rec.tcp.is_empty());
        assert_eq!(stats.snapshot().total(), 0);
    }

    #[test]
    fn tcp_goes_to_adapter() {
        let (eth, wpan) = devs();
        let (src, dst) = addrs();
        let pkt = tcp_packet(src, dst, b"seg");
        let hdr = Ipv6Hdr::parse(&pkt).unwrap();
        let mut frame = RxFrame::from_packet(&pkt);
        let mut rec = Recorder::default();
        let stats = NetStats::new();
        let r = packet_conversion(&sixlowpan_caps(true), &eth, &wpan, &hdr, &mut frame, &mut rec, &stats);
        assert_eq!(r, Conversion::Handled);
        assert_eq!(rec.tcp.len(), 1);
    }

    #[test]
    fn unsupported_protocol_dropped_but_handled() {
        let (eth, wpan) = devs();
        let (src, dst) = addrs();
        let pkt = icmp6_packet(src, dst, b"ping");
        let hdr = Ipv6Hdr::parse(&pkt).unwrap();
        let mut frame = RxFrame::from_packet(&pkt);
        let mut rec = Recorder::default();
        let stats = NetStats::new();
        let r = packet_conversion(&sixlowpan_caps(true), &eth, &wpan, &hdr, &mut frame, &mut rec, &stats);
        assert_eq!(r, Conversion::Handled);
        assert!(frame.is_empty());
        assert!(rec.tcp.is_empty() && rec.udp.is_empty());
        assert_eq!(stats.snapshot().ipv6_drop, 1);
        assert_eq!(stats.snapshot().total(), 1);
    }

    #[test]
    fn refused_packet_counted_as_drop() {
        let (eth, wpan) = devs();
        let (src, dst) = addrs();
        let pkt = tcp_packet(src, dst, b"seg");
        let hdr = Ipv6Hdr::parse(&pkt).unwrap();
        let mut frame = RxFrame::from_packet(&pkt);
        let stats = NetStats::new();
        let r = packet_conversion(
            &sixlowpan_caps(true),
            &eth,
            &wpan,
            &hdr,
            &mut frame,
            &mut NoLinkAdapter,
            &stats,
        );
        assert_eq!(r, Conversion::Handled);
        assert!(frame.is_empty());
        assert_eq!(stats.snapshot().ipv6_drop, 1);
    }

    #[test]
    fn ethernet_egress_not_applicable_with_multilink() {
        let (eth, wpan) = devs();
        let (src, dst) = addrs();
        let pkt = udp_packet(src, dst, b"x");
        let hdr = Ipv6Hdr::parse(&pkt).unwrap();
        let mut frame = RxFrame::from_packet(&pkt);
        let mut rec = Recorder::default();
        let stats = NetStats::new();
        let r = packet_conversion(&sixlowpan_caps(true), &wpan, &eth, &hdr, &mut frame, &mut rec, &stats);
        assert_eq!(r, Conversion::NotApplicable);
        assert_eq!(frame.len(), pkt.len());
        assert!(rec.udp.is_empty());
    }

    #[test]
    fn every_device_converts_without_multilink() {
        let (eth, _) = devs();
        let (src, dst) = addrs();
        let pkt = udp_packet(src, dst, b"x");
        let frame = RxFrame::from_packet(&pkt);
        assert!(needs_conversion(&sixlowpan_caps(false), &frame, &eth));
        assert!(!needs_conversion(&Capabilities::default(), &frame, &eth));
    }

    #[test]
    fn empty_frame_not_applicable() {
        let (_, wpan) = devs();
        let frame = RxFrame::new(&[], 0);
        assert!(!needs_conversion(&sixlowpan_caps(true), &frame, &wpan));
    }
}
