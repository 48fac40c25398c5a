//! IPv6 header view and the receive frame handed in by the input path.

use std::net::Ipv6Addr;

use crate::error::ForwardError;

/// Fixed IPv6 header length.
pub const IPV6_HDRLEN: usize = 40;
pub const UDP_HDRLEN: usize = 8;
pub const ICMPV6_HDRLEN: usize = 4;
/// Minimum TCP header (data offset 5).
pub const TCP_HDRLEN: usize = 20;
/// Largest TCP header the data offset can encode (15 words).
pub const TCP_MAX_HDRLEN: usize = 60;
/// Largest IPv6 + transport header the classifier can report.
pub const MAX_L3L4_HDRLEN: usize = IPV6_HDRLEN + TCP_MAX_HDRLEN;

pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;
pub const IP_PROTO_ICMP6: u8 = 58;

/// Parsed copy of the fixed IPv6 header fields the forwarder looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Hdr {
    pub payload_len: u16,
    /// Next header; without extension headers this is the transport protocol.
    pub proto: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
}

impl Ipv6Hdr {
    pub fn parse(packet: &[u8]) -> Result<Self, ForwardError> {
        if packet.len() < IPV6_HDRLEN {
            return Err(ForwardError::Truncated);
        }
        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&packet[8..24]);
        dst.copy_from_slice(&packet[24..40]);
        Ok(Self {
            payload_len: u16::from_be_bytes([packet[4], packet[5]]),
            proto: packet[6],
            hop_limit: packet[7],
            src: Ipv6Addr::from(src),
            dst: Ipv6Addr::from(dst),
        })
    }
}

/// The device receive buffer (`d_buf`) and the length still to be handled (`d_len`).
///
/// The link-layer header has already been stripped, so byte 0 is the IPv6 header.
/// A length of zero tells the caller that nothing is left to transmit.
#[derive(Debug)]
pub struct RxFrame<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> RxFrame<'a> {
    /// `len` is clamped to the buffer size.
    pub fn new(buf: &'a [u8], len: usize) -> Self {
        Self {
            buf,
            len: len.min(buf.len()),
        }
    }

    /// Frame covering the whole buffer.
    pub fn from_packet(buf: &'a [u8]) -> Self {
        Self::new(buf, buf.len())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of the current packet (empty once consumed).
    pub fn packet(&self) -> &'a [u8] {
        &self.buf[..self.len]
    }

    /// Mark the frame as fully handled.
    pub fn consume(&mut self) {
        self.len = 0;
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn parse_header_fields() {
        let src: Ipv6Addr = "fd00::1".parse().unwrap();
        let dst: Ipv6Addr = "fd01::2".parse().unwrap();
        let pkt = udp_packet(src, dst, b"hello");
        let hdr = Ipv6Hdr::parse(&pkt).unwrap();
        assert_eq!(hdr.proto, IP_PROTO_UDP);
        assert_eq!(hdr.payload_len, (UDP_HDRLEN + 5) as u16);
        assert_eq!(hdr.hop_limit, 64);
        assert_eq!(hdr.src, src);
        assert_eq!(hdr.dst, dst);
    }

    #[test]
    fn parse_short_packet_is_truncated() {
        assert_eq!(Ipv6Hdr::parse(&[0x60; 39]), Err(ForwardError::Truncated));
    }

    #[test]
    fn frame_len_clamped_and_consumed() {
        let buf = [0u8; 16];
        let mut frame = RxFrame::new(&buf, 100);
        assert_eq!(frame.len(), 16);
        assert_eq!(frame.packet().len(), 16);
        frame.consume();
        assert!(frame.is_empty());
        assert!(frame.packet().is_empty());
    }
}
