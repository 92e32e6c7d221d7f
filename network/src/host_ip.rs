//! Discovery of the host address that shares a subnet with the guest.

use crate::error::NetworkError;
use ipnet::Ipv4Net;
use std::io;
use std::net::Ipv4Addr;

/// An IPv4 address bound to a local interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
    pub point_to_point: bool,
}

impl InterfaceAddress {
    pub fn new(ip: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            ip,
            prefix_len,
            point_to_point: false,
        }
    }

    pub fn point_to_point(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            prefix_len: 32,
            point_to_point: true,
        }
    }

    /// The subnet this address sits in. Point-to-point links only cover
    /// their own address.
    pub fn network(&self) -> Option<Ipv4Net> {
        let prefix = if self.point_to_point {
            32
        } else {
            self.prefix_len
        };
        Ipv4Net::new(self.ip, prefix).ok().map(|net| net.trunc())
    }
}

/// Interfaces in enumeration order, each with its address listing.
pub type InterfaceTable = Vec<(String, io::Result<Vec<InterfaceAddress>>)>;

/// Enumerates local interfaces and their IPv4 addresses.
pub trait InterfaceSource: Send + Sync {
    fn interface_names(&self) -> io::Result<Vec<String>>;

    fn addresses(&self, interface: &str) -> io::Result<Vec<InterfaceAddress>>;

    /// Names and addresses taken together. Sources that can read both from
    /// one snapshot should override this.
    fn table(&self) -> io::Result<InterfaceTable> {
        Ok(self
            .interface_names()?
            .into_iter()
            .map(|name| {
                let addresses = self.addresses(&name);
                (name, addresses)
            })
            .collect())
    }
}

/// Return the host's address on the first interface, in enumeration order,
/// whose subnet contains `guest`.
pub fn find_host_ip(source: &dyn InterfaceSource, guest: Ipv4Addr) -> Result<Ipv4Addr, NetworkError> {
    let table = source.table().map_err(NetworkError::InterfaceEnumeration)?;

    for (name, addresses) in table {
        let addresses = addresses.map_err(|source| NetworkError::InterfaceAddresses {
            name: name.clone(),
            source,
        })?;

        for addr in addresses {
            if addr.network().is_some_and(|net| net.contains(&guest)) {
                tracing::debug!(interface = %name, host_ip = %addr.ip, %guest, "found host address");
                return Ok(addr.ip);
            }
        }
    }

    Err(NetworkError::NoContainingSubnet(guest))
}

/// Interfaces of the running host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

#[cfg(unix)]
impl InterfaceSource for SystemInterfaces {
    fn interface_names(&self) -> io::Result<Vec<String>> {
        Ok(self.table()?.into_iter().map(|(name, _)| name).collect())
    }

    fn addresses(&self, interface: &str) -> io::Result<Vec<InterfaceAddress>> {
        self.table()?
            .into_iter()
            .find(|(name, _)| name == interface)
            .map(|(_, addresses)| addresses)
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// One `getifaddrs` call, grouped by interface in first-seen order.
    fn table(&self) -> io::Result<InterfaceTable> {
        let mut grouped: Vec<(String, Vec<InterfaceAddress>)> = Vec::new();
        for ifaddr in nix::ifaddrs::getifaddrs().map_err(io::Error::from)? {
            let address = ipv4_address(&ifaddr);
            let index = match grouped.iter().position(|(name, _)| *name == ifaddr.interface_name) {
                Some(index) => index,
                None => {
                    grouped.push((ifaddr.interface_name.clone(), Vec::new()));
                    grouped.len() - 1
                }
            };
            grouped[index].1.extend(address);
        }
        Ok(grouped
            .into_iter()
            .map(|(name, addresses)| (name, Ok(addresses)))
            .collect())
    }
}

#[cfg(unix)]
fn ipv4_address(ifaddr: &nix::ifaddrs::InterfaceAddress) -> Option<InterfaceAddress> {
    use nix::net::if_::InterfaceFlags;
    use std::net::SocketAddrV4;

    let sin = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in())?;
    let ip = *SocketAddrV4::from(*sin).ip();

    if ifaddr.flags.contains(InterfaceFlags::IFF_POINTOPOINT) {
        return Some(InterfaceAddress::point_to_point(ip));
    }

    let prefix_len = ifaddr
        .netmask
        .as_ref()
        .and_then(|m| m.as_sockaddr_in())
        .and_then(|m| ipnet::ipv4_mask_to_prefix(*SocketAddrV4::from(*m).ip()).ok())
        .unwrap_or(32);
    Some(InterfaceAddress::new(ip, prefix_len))
}

#[cfg(not(unix))]
impl InterfaceSource for SystemInterfaces {
    fn interface_names(&self) -> io::Result<Vec<String>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interface enumeration is only available on unix hosts",
        ))
    }

    fn addresses(&self, _interface: &str) -> io::Result<Vec<InterfaceAddress>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interface enumeration is only available on unix hosts",
        ))
    }
}

/// A fixed interface table.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces {
    interfaces: Vec<(String, Option<Vec<InterfaceAddress>>)>,
    unavailable: bool,
}

impl StaticInterfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, addresses: Vec<InterfaceAddress>) -> Self {
        self.interfaces.push((name.to_string(), Some(addresses)));
        self
    }

    /// An interface whose address listing fails.
    pub fn with_broken(mut self, name: &str) -> Self {
        self.interfaces.push((name.to_string(), None));
        self
    }

    /// Enumeration itself fails.
    pub fn unavailable() -> Self {
        Self {
            interfaces: Vec::new(),
            unavailable: true,
        }
    }
}

impl InterfaceSource for StaticInterfaces {
    fn interface_names(&self) -> io::Result<Vec<String>> {
        if self.unavailable {
            return Err(io::Error::other("interface table unavailable"));
        }
        Ok(self.interfaces.iter().map(|(name, _)| name.clone()).collect())
    }

    fn addresses(&self, interface: &str) -> io::Result<Vec<InterfaceAddress>> {
        self.interfaces
            .iter()
            .find(|(name, _)| name == interface)
            .and_then(|(_, addrs)| addrs.clone())
            .ok_or_else(|| io::Error::other(format!("cannot list addresses of {}", interface)))
    }
}
