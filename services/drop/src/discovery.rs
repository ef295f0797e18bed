//! LAN address discovery for building share URLs.

use crate::error::{DropError, Result};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, instrument};

/// Enumerates host interface addresses reachable from other devices
#[derive(Debug, Clone, Default)]
pub struct AddressDiscovery;

impl AddressDiscovery {
    pub fn new() -> Self {
        Self
    }

    /// Non-loopback IPv4 addresses of every interface, in enumeration order.
    ///
    /// A host without any qualifying interface yields an empty list.
    #[instrument(skip(self))]
    pub fn list_local_addresses(&self) -> Result<Vec<Ipv4Addr>> {
        let interfaces = if_addrs::get_if_addrs().map_err(DropError::Discovery)?;
        let addresses = routable_ipv4(interfaces.iter().map(|iface| iface.ip()));

        debug!(count = addresses.len(), "Discovered local addresses");
        Ok(addresses)
    }

    /// `http://<ip>:<port>` for each discovered address
    pub fn share_urls(&self, port: u16) -> Result<Vec<String>> {
        Ok(self
            .list_local_addresses()?
            .into_iter()
            .map(|ip| format!("http://{}:{}", ip, port))
            .collect())
    }
}

/// Keep IPv4, non-loopback addresses, first occurrence wins
pub fn routable_ipv4(addresses: impl IntoIterator<Item = IpAddr>) -> Vec<Ipv4Addr> {
    let mut result: Vec<Ipv4Addr> = Vec::new();
    for address in addresses {
        if let IpAddr::V4(v4) = address {
            if !v4.is_loopback() && !v4.is_unspecified() && !result.contains(&v4) {
                result.push(v4);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_filters_loopback_and_ipv6() {
        let input = vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V6("fe80::1".parse().unwrap()),
            IpAddr::V4(Ipv4Addr::new(127, 0, 1, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
        ];

        assert_eq!(
            routable_ipv4(input),
            vec![Ipv4Addr::new(192, 168, 1, 20), Ipv4Addr::new(10, 0, 0, 7)]
        );
    }

    #[test]
    fn test_no_qualifying_interface_is_empty() {
        let input = vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)];
        assert!(routable_ipv4(input).is_empty());
    }

    #[test]
    fn test_duplicates_collapsed() {
        let ip = IpAddr::V4(Ipv4Addr::new(172, 16, 0, 2));
        assert_eq!(routable_ipv4(vec![ip, ip]).len(), 1);
    }

    #[test]
    fn test_host_enumeration_excludes_loopback() {
        let addresses = AddressDiscovery::new().list_local_addresses().unwrap();
        for ip in &addresses {
            assert!(!ip.is_loopback());
            assert!(!ip.to_string().contains(':'));
        }
    }

    #[test]
    fn test_share_urls_format() {
        let urls = AddressDiscovery::new().share_urls(27149).unwrap();
        for url in urls {
            assert!(url.starts_with("http://"));
            assert!(url.ends_with(":27149"));
        }
    }
}
