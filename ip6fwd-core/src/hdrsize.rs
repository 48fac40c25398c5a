//! Size of the IPv6 header plus the transport header that follows it.

use crate::config::Capabilities;
use crate::error::ForwardError;
use crate::ipv6::{
    ICMPV6_HDRLEN, IPV6_HDRLEN, IP_PROTO_ICMP6, IP_PROTO_TCP, IP_PROTO_UDP, UDP_HDRLEN,
};

/// Offset of the data-offset byte inside the TCP header.
const TCP_OFFSET_FIELD: usize = 12;

/// Return the combined IPv6 + L4 header size of `packet`. The payload starts at this offset.
///
/// Only protocols enabled in `caps` are recognized; anything else is `UnsupportedProtocol`.
pub fn hdrsize(caps: &Capabilities, packet: &[u8]) -> Result<usize, ForwardError> {
    if packet.len() < IPV6_HDRLEN {
        return Err(ForwardError::Truncated);
    }
    let proto = packet[6];
    match proto {
        IP_PROTO_TCP if caps.tcp => {
            let tcpoffset = *packet
                .get(IPV6_HDRLEN + TCP_OFFSET_FIELD)
                .ok_or(ForwardError::Truncated)?;
            // Upper nibble counts 32-bit words.
            let tcpsize = ((tcpoffset >> 4) as usize) << 2;
            Ok(IPV6_HDRLEN + tcpsize)
        }
        IP_PROTO_UDP if caps.udp => Ok(IPV6_HDRLEN + UDP_HDRLEN),
        IP_PROTO_ICMP6 if caps.icmpv6 => Ok(IPV6_HDRLEN + ICMPV6_HDRLEN),
        _ => {
            log::warn!("unrecognized proto: {}", proto);
            Err(ForwardError::UnsupportedProtocol(proto))
        }
    }
}
