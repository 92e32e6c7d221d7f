use crate::error::NetworkError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use windsor_core::{ForwardingCheck, Runtime, keys};
use windsor_store::ConfigStore;

/// Network settings for the active context, as read from the config store.
///
/// Values are kept as configured and validated by the accessor that needs
/// them, so a malformed setting only fails the operations that use it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub cidr_block: Option<String>,
    pub guest_address: Option<String>,
    pub runtime: Option<String>,
    pub vm_engine: Option<String>,
    pub dns_domain: Option<String>,
    pub dns_address: Option<String>,
    pub dns_enabled: Option<String>,
    pub forwarding_check: Option<String>,
}

impl NetworkConfig {
    pub fn load(store: &dyn ConfigStore) -> Result<Self, NetworkError> {
        Ok(Self {
            cidr_block: read(store, keys::NETWORK_CIDR_BLOCK)?,
            guest_address: read_first(store, &keys::GUEST_ADDRESS)?,
            runtime: read_first(store, &keys::RUNTIME)?,
            vm_engine: read(store, keys::VM_ENGINE)?,
            dns_domain: read(store, keys::DNS_DOMAIN)?,
            dns_address: read(store, keys::DNS_ADDRESS)?,
            dns_enabled: read(store, keys::DNS_ENABLED)?,
            forwarding_check: read(store, keys::NETWORK_FORWARDING_CHECK)?,
        })
    }

    pub fn cidr(&self) -> Result<Ipv4Net, NetworkError> {
        let cidr = self
            .cidr_block
            .as_deref()
            .ok_or_else(|| NetworkError::configuration("network CIDR is required"))?;
        parse_cidr(cidr)
    }

    pub fn guest_address(&self) -> Result<Option<Ipv4Addr>, NetworkError> {
        self.guest_address
            .as_deref()
            .map(|addr| parse_address("guest address", addr))
            .transpose()
    }

    pub fn require_guest_address(&self) -> Result<Ipv4Addr, NetworkError> {
        self.guest_address()?
            .ok_or_else(|| NetworkError::configuration("guest address is required"))
    }

    pub fn runtime(&self) -> Result<Option<Runtime>, NetworkError> {
        self.runtime
            .as_deref()
            .map(|r| Runtime::parse(r, self.vm_engine.as_deref()))
            .transpose()
            .map_err(|e| NetworkError::configuration(e.to_string()))
    }

    pub fn is_localhost(&self) -> Result<bool, NetworkError> {
        Ok(matches!(self.runtime()?, Some(Runtime::Localhost)))
    }

    pub fn require_dns_domain(&self) -> Result<&str, NetworkError> {
        self.dns_domain
            .as_deref()
            .ok_or_else(|| NetworkError::configuration("DNS domain is required"))
    }

    /// DNS reconciliation runs unless explicitly disabled.
    pub fn dns_enabled(&self) -> Result<bool, NetworkError> {
        match self.dns_enabled.as_deref() {
            None => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(NetworkError::configuration(format!(
                "invalid dns.enabled: {}",
                v
            ))),
        }
    }

    /// The address DNS queries for the domain should go to: the configured
    /// override, else loopback for a localhost runtime.
    pub fn resolver_address(&self) -> Result<Ipv4Addr, NetworkError> {
        if let Some(addr) = self.dns_address.as_deref() {
            return parse_address("DNS address", addr);
        }
        if self.is_localhost()? {
            return Ok(Ipv4Addr::LOCALHOST);
        }
        Err(NetworkError::configuration("DNS address not configured"))
    }

    pub fn forwarding_check(&self) -> Result<ForwardingCheck, NetworkError> {
        match self.forwarding_check.as_deref() {
            Some(mode) => mode
                .parse()
                .map_err(|e: windsor_core::CoreError| NetworkError::configuration(e.to_string())),
            None => Ok(ForwardingCheck::default()),
        }
    }
}

/// Parse a CIDR block, clearing any host bits so the result names the
/// network itself.
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Net, NetworkError> {
    cidr.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|e| NetworkError::InvalidCidr {
            cidr: cidr.to_string(),
            reason: e.to_string(),
        })
}

fn parse_address(what: &str, addr: &str) -> Result<Ipv4Addr, NetworkError> {
    addr.trim()
        .parse()
        .map_err(|_| NetworkError::configuration(format!("invalid {}: {}", what, addr)))
}

fn read(store: &dyn ConfigStore, key: &str) -> Result<Option<String>, NetworkError> {
    Ok(store
        .get_string(key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

fn read_first(store: &dyn ConfigStore, keys: &[&str]) -> Result<Option<String>, NetworkError> {
    for key in keys {
        if let Some(value) = read(store, key)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use windsor_core::ContainerEngine;
    use windsor_store::MemoryConfigStore;

    fn load(pairs: &[(&str, &str)]) -> NetworkConfig {
        let store = MemoryConfigStore::from_pairs(pairs.iter().copied()).unwrap();
        NetworkConfig::load(&store).unwrap()
    }

    #[test]
    fn test_newer_keys_win() {
        let config = load(&[
            ("vm.address", "192.168.5.2"),
            ("workstation.address", "192.168.6.2"),
            ("vm.driver", "colima"),
            ("workstation.runtime", "docker-desktop"),
        ]);
        assert_eq!(config.guest_address.as_deref(), Some("192.168.6.2"));
        assert_eq!(config.runtime().unwrap(), Some(Runtime::Localhost));
    }

    #[test]
    fn test_legacy_keys() {
        let config = load(&[
            ("vm.address", "192.168.5.2"),
            ("vm.driver", "colima"),
            ("vm.runtime", "incus"),
        ]);
        assert_eq!(
            config.require_guest_address().unwrap(),
            Ipv4Addr::new(192, 168, 5, 2)
        );
        assert_eq!(
            config.runtime().unwrap(),
            Some(Runtime::Colima(ContainerEngine::Incus))
        );
    }

    #[test]
    fn test_blank_values_are_absent() {
        let config = load(&[("vm.address", "  "), ("dns.domain", "")]);
        assert_eq!(config.guest_address, None);
        assert!(matches!(
            config.require_guest_address(),
            Err(NetworkError::Configuration(msg)) if msg == "guest address is required"
        ));
        assert!(config.require_dns_domain().is_err());
    }

    #[test]
    fn test_resolver_address_precedence() {
        let config = load(&[("dns.address", "10.5.0.3"), ("provider", "docker-desktop")]);
        assert_eq!(
            config.resolver_address().unwrap(),
            Ipv4Addr::new(10, 5, 0, 3)
        );

        let config = load(&[("provider", "docker-desktop")]);
        assert_eq!(config.resolver_address().unwrap(), Ipv4Addr::LOCALHOST);

        let config = load(&[("provider", "colima")]);
        assert!(matches!(
            config.resolver_address(),
            Err(NetworkError::Configuration(msg)) if msg == "DNS address not configured"
        ));
    }

    #[test]
    fn test_invalid_values() {
        let config = load(&[
            ("network.cidr_block", "10.5.0.0/99"),
            ("vm.address", "not-an-ip"),
            ("provider", "lima"),
            ("network.forwarding_check", "maybe"),
        ]);
        assert!(matches!(config.cidr(), Err(NetworkError::InvalidCidr { .. })));
        assert!(config.guest_address().is_err());
        assert!(config.runtime().is_err());
        assert!(config.forwarding_check().is_err());
    }

    #[test]
    fn test_dns_enabled_default() {
        assert!(load(&[]).dns_enabled().unwrap());
        assert!(!load(&[("dns.enabled", "false")]).dns_enabled().unwrap());
        assert!(load(&[("dns.enabled", "TRUE")]).dns_enabled().unwrap());
    }

    #[test]
    fn test_malformed_dns_enabled_fails_only_its_accessor() {
        let config = load(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("vm.address", "192.168.5.2"),
            ("dns.enabled", "maybe"),
        ]);
        assert!(matches!(
            config.dns_enabled(),
            Err(NetworkError::Configuration(msg)) if msg == "invalid dns.enabled: maybe"
        ));
        assert_eq!(config.cidr().unwrap().to_string(), "10.5.0.0/16");
        assert!(config.guest_address().unwrap().is_some());
    }

    #[test]
    fn test_cidr_host_bits_are_cleared() {
        let config = load(&[("network.cidr_block", "10.5.3.9/16")]);
        assert_eq!(config.cidr().unwrap().to_string(), "10.5.0.0/16");
        assert_eq!(parse_cidr(" 192.168.5.77/24 ").unwrap().to_string(), "192.168.5.0/24");
    }
}
