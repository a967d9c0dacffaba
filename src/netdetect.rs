use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;

/// IPv4 configuration of one local network device.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub device: String,
    pub id: Option<u32>,
    #[serde(rename = "ipv4")]
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub prefix: u8,
}

impl InterfaceInfo {
    pub fn network(&self) -> Ipv4Net {
        // prefix comes from a real netmask, so it is always <= 32
        Ipv4Net::new(self.ip, self.prefix)
            .map(|n| n.trunc())
            .unwrap_or_else(|_| ipv4_to_default_cidr(self.ip))
    }
}

/// All IPv4 addresses bound to local devices, loopback included, sorted by device then address.
pub fn list_interfaces() -> io::Result<Vec<InterfaceInfo>> {
    let mut out: Vec<InterfaceInfo> = get_if_addrs()?
        .into_iter()
        .filter_map(|iface| match iface.addr {
            IfAddr::V4(v4) => Some(InterfaceInfo {
                device: iface.name,
                id: iface.index,
                ip: v4.ip,
                mask: v4.netmask,
                prefix: netmask_prefix(v4.netmask),
            }),
            IfAddr::V6(_) => None,
        })
        .collect();
    out.sort_by(|a, b| a.device.cmp(&b.device).then(a.ip.cmp(&b.ip)));
    Ok(out)
}

/// IPv4 configuration of the device called `name`, if it has one.
pub fn interface_info(name: &str) -> io::Result<Option<InterfaceInfo>> {
    Ok(list_interfaces()?.into_iter().find(|i| i.device == name))
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 CIDR network.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> io::Result<Vec<IpNet>> {
    let set: HashSet<Ipv4Net> = list_interfaces()?
        .into_iter()
        .filter(|i| !i.ip.is_loopback())
        .map(|i| ipv4_to_default_cidr(i.ip))
        .collect();
    let mut cidrs: Vec<Ipv4Net> = set.into_iter().collect();
    cidrs.sort_by_key(|n| (u32::from(n.network()), n.prefix_len()));
    Ok(cidrs.into_iter().map(IpNet::V4).collect())
}

/// Expand a CIDR into individual host addresses.
///
/// For IPv4, excludes the network and broadcast addresses except for /31 and
/// /32, where every address is a host. IPv6 blocks are not expanded.
pub fn expand_cidr_to_ips(cidr: IpNet) -> Vec<IpAddr> {
    match cidr {
        IpNet::V4(n4) => expand_ipv4net_hosts(n4)
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        IpNet::V6(_) => Vec::new(),
    }
}

/// Convert an IPv4 address into its /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    let net = Ipv4Addr::new(o[0], o[1], o[2], 0);
    Ipv4Net::new(net, 24).unwrap_or_else(|_| Ipv4Net::from(net))
}

fn netmask_prefix(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

fn expand_ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if net.prefix_len() >= 31 {
        return (start..=end).map(Ipv4Addr::from).collect();
    }
    (start + 1..end).map(Ipv4Addr::from).collect()
}
