//! C ABI for linking ip6fwd-core as a static library into a C network stack.
//! Exposes the header classifier and the process-wide drop counters for reporting.

use std::os::raw::c_int;
use std::slice;

use crate::config::Capabilities;
use crate::hdrsize::hdrsize;
use crate::stats::NetStats;

/// Version of this C ABI. Bumped when a signature or `Ip6fwdNetStats` changes.
pub const FFI_ABI_VERSION: u8 = 1;

/// Drop counters as laid out for C readers.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ip6fwdNetStats {
    pub ipv6_drop: u32,
    pub tcp_drop: u32,
    pub udp_drop: u32,
    pub icmpv6_drop: u32,
}

#[no_mangle]
pub extern "C" fn ip6fwd_version() -> u8 {
    FFI_ABI_VERSION
}

/// Size of the IPv6 + transport headers of the packet at `buf`, with every protocol enabled.
/// Returns the size, or a negated errno (-EPROTONOSUPPORT, -EINVAL).
#[no_mangle]
pub extern "C" fn ip6fwd_hdrsize(buf: *const u8, len: usize) -> c_int {
    if buf.is_null() {
        return crate::error::ForwardError::Truncated.errno();
    }
    let packet = unsafe { slice::from_raw_parts(buf, len) };
    match hdrsize(&Capabilities::default(), packet) {
        Ok(n) => n as c_int,
        Err(e) => e.errno(),
    }
}

/// Copy the process-wide drop counters into `out`. Returns 0, or -1 if `out` is null.
#[no_mangle]
pub extern "C" fn ip6fwd_netstats(out: *mut Ip6fwdNetStats) -> c_int {
    if out.is_null() {
        return -1;
    }
    let snap = NetStats::global().snapshot();
    let c = Ip6fwdNetStats {
        ipv6_drop: snap.ipv6_drop,
        tcp_drop: snap.tcp_drop,
        udp_drop: snap.udp_drop,
        icmpv6_drop: snap.icmpv6_drop,
    };
    unsafe {
        out.write(c);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipv6::testutil::*;

    #[test]
    fn hdrsize_over_c_abi() {
        let pkt = udp_packet("fd00::1".parse().unwrap(), "fd00::2".parse().unwrap(), b"x");
        assert_eq!(ip6fwd_hdrsize(pkt.as_ptr(), pkt.len()), 48);
        assert_eq!(ip6fwd_hdrsize(pkt.as_ptr(), 10), -22);
        assert_eq!(ip6fwd_hdrsize(std::ptr::null(), 0), -22);
    }

    #[test]
    fn hdrsize_unknown_protocol_errno() {
        let pkt = packet(
            132,
            "fd00::1".parse().unwrap(),
            "fd00::2".parse().unwrap(),
            &[0u8; 12],
            &[],
        );
        assert_eq!(ip6fwd_hdrsize(pkt.as_ptr(), pkt.len()), -93);
    }

    #[test]
    fn netstats_reads_global_counters() {
        let before = NetStats::global().snapshot().ipv6_drop;
        NetStats::global().ipv6_dropped();
        let mut out = Ip6fwdNetStats::default();
        assert_eq!(ip6fwd_netstats(&mut out), 0);
        assert!(out.ipv6_drop > before);
        assert_eq!(ip6fwd_netstats(std::ptr::null_mut()), -1);
    }

    #[test]
    fn version_exported() {
        assert_eq!(ip6fwd_version(), FFI_ABI_VERSION);
    }
}
