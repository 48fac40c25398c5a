//! Network devices and egress selection.

use std::net::Ipv6Addr;

use crate::config::Capabilities;
use crate::error::ForwardError;
use crate::ipv6::Ipv6Hdr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevId(pub u8);

/// Link-layer technology of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// IEEE 802.15.4; needs 6LoWPAN fragmentation and header compression.
    Ieee802154,
    Tun,
    Loopback,
}

/// A network device as seen by the forwarder: identity, link type and its IPv6 subnet.
#[derive(Debug, Clone)]
pub struct NetDev {
    pub id: DevId,
    pub name: String,
    pub lltype: LinkType,
    pub addr: Ipv6Addr,
    pub prefixlen: u8,
    pub up: bool,
}

impl NetDev {
    pub fn new(id: u8, name: &str, lltype: LinkType, addr: Ipv6Addr, prefixlen: u8) -> Self {
        Self {
            id: DevId(id),
            name: name.to_string(),
            lltype,
            addr,
            prefixlen,
            up: true,
        }
    }

    /// True if `addr` is on this device's subnet.
    pub fn serves(&self, addr: &Ipv6Addr) -> bool {
        prefix_match(&self.addr, addr, self.prefixlen)
    }
}

/// Compare the leading `len` bits of two addresses.
pub fn prefix_match(a: &Ipv6Addr, b: &Ipv6Addr, len: u8) -> bool {
    let len = len.min(128) as u32;
    if len == 0 {
        return true;
    }
    let mask = u128::MAX << (128 - len);
    (u128::from(*a) & mask) == (u128::from(*b) & mask)
}

/// Resolves a destination (and, with several devices, the source) to the device that should send it.
pub trait RouteResolver {
    fn find_by_ipv6addr(&self, src: Option<&Ipv6Addr>, dst: &Ipv6Addr) -> Option<&NetDev>;
}

/// Static route: packets for `prefix/prefixlen` go via `router`.
#[derive(Debug, Clone)]
pub struct Route {
    pub prefix: Ipv6Addr,
    pub prefixlen: u8,
    pub router: Ipv6Addr,
}

/// Device list plus static routes. The first device that is up acts as the default device.
#[derive(Debug, Default)]
pub struct NetDevTable {
    devs: Vec<NetDev>,
    routes: Vec<Route>,
}

impl NetDevTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dev(&mut self, dev: NetDev) {
        self.devs.retain(|d| d.id != dev.id);
        self.devs.push(dev);
    }

    pub fn add_route(&mut self, prefix: Ipv6Addr, prefixlen: u8, router: Ipv6Addr) {
        self.routes.push(Route {
            prefix,
            prefixlen,
            router,
        });
    }

    pub fn get(&self, id: DevId) -> Option<&NetDev> {
        self.devs.iter().find(|d| d.id == id)
    }

    /// Bring a device up or down. Returns false if no such device.
    pub fn set_up(&mut self, id: DevId, up: bool) -> bool {
        match self.devs.iter_mut().find(|d| d.id == id) {
            Some(d) => {
                d.up = up;
                true
            }
            None => false,
        }
    }

    pub fn devices(&self) -> &[NetDev] {
        &self.devs
    }

    fn by_subnet(&self, addr: &Ipv6Addr) -> Option<&NetDev> {
        self.devs.iter().find(|d| d.up && d.serves(addr))
    }

    fn default_dev(&self) -> Option<&NetDev> {
        self.devs.iter().find(|d| d.up)
    }

    fn by_route(&self, dst: &Ipv6Addr) -> Option<&NetDev> {
        self.routes
            .iter()
            .filter(|r| prefix_match(&r.prefix, dst, r.prefixlen))
            .max_by_key(|r| r.prefixlen)
            .and_then(|r| self.by_subnet(&r.router))
    }
}

impl RouteResolver for NetDevTable {
    fn find_by_ipv6addr(&self, src: Option<&Ipv6Addr>, dst: &Ipv6Addr) -> Option<&NetDev> {
        if dst.is_multicast() || dst.is_unspecified() {
            // No unicast route; pick by the sender's subnet, else the default device.
            return src
                .filter(|s| !s.is_unspecified())
                .and_then(|s| self.by_subnet(s))
                .or_else(|| self.default_dev());
        }
        self.by_subnet(dst).or_else(|| self.by_route(dst))
    }
}

/// Device chosen to send a forwarded packet.
#[derive(Debug, Clone, Copy)]
pub struct Egress<'r> {
    pub dev: &'r NetDev,
    pub same_as_ingress: bool,
}

/// Find the egress device for `hdr`. The source address is only consulted with several devices.
pub fn select_egress<'r, R: RouteResolver + ?Sized>(
    resolver: &'r R,
    caps: &Capabilities,
    ingress: &NetDev,
    hdr: &Ipv6Hdr,
) -> Result<Egress<'r>, ForwardError> {
    let src = caps.multinic.then_some(&hdr.src);
    let dev = resolver
        .find_by_ipv6addr(src, &hdr.dst)
        .ok_or(ForwardError::RouteNotFound)?;
    let same_as_ingress = dev.id == ingress.id;
    log::debug!(
        "{} -> {} via {}{}",
        hdr.src,
        hdr.dst,
        dev.name,
        if same_as_ingress { " (ingress)" } else { "" }
    );
    Ok(Egress {
        dev,
        same_as_ingress,
    })
}
