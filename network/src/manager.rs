use crate::allocator::{AddressAllocator, SequentialAllocator};
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::guest::GuestForwarder;
use crate::host_ip::InterfaceSource;
use crate::platform::HostPlatform;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::sync::Arc;
use windsor_core::{PortAllocator, Service, keys};
use windsor_shell::Shell;
use windsor_store::ConfigStore;

/// Entry point for the network subsystem.
///
/// Every operation reloads configuration from the store and re-probes the
/// system; nothing is cached between calls. Each `configure_*` operation is
/// idempotent and only mutates when its diff reports a change.
pub struct NetworkManager {
    store: Arc<dyn ConfigStore>,
    platform: Arc<dyn HostPlatform>,
    guest: GuestForwarder,
    allocator: Box<dyn AddressAllocator>,
}

impl NetworkManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        shell: Arc<dyn Shell>,
        platform: Arc<dyn HostPlatform>,
        interfaces: Arc<dyn InterfaceSource>,
        context: &str,
    ) -> Self {
        Self {
            store,
            platform,
            guest: GuestForwarder::new(shell, interfaces, context),
            allocator: Box::new(SequentialAllocator),
        }
    }

    pub fn with_allocator(mut self, allocator: impl AddressAllocator + 'static) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    pub fn config(&self) -> Result<NetworkConfig, NetworkError> {
        NetworkConfig::load(self.store.as_ref())
    }

    pub fn platform(&self) -> &dyn HostPlatform {
        self.platform.as_ref()
    }

    /// Assign every service an address in the configured network.
    ///
    /// When no CIDR is configured the default is written back to the store
    /// first, so later runs allocate from the same range.
    pub fn assign_ips(
        &self,
        services: &mut [Box<dyn Service>],
        ports: &mut PortAllocator,
    ) -> Result<(), NetworkError> {
        let cidr = match self.config()?.cidr_block {
            Some(cidr) => cidr,
            None => {
                self.store
                    .set_string(keys::NETWORK_CIDR_BLOCK, keys::DEFAULT_CIDR_BLOCK)?;
                tracing::info!(cidr = keys::DEFAULT_CIDR_BLOCK, "using default network CIDR");
                keys::DEFAULT_CIDR_BLOCK.to_string()
            }
        };

        tracing::debug!(%cidr, services = services.len(), "assigning service addresses");
        self.allocator.allocate(services, &cidr, ports)
    }

    /// Whether the host is missing a route to the container network via the
    /// guest.
    pub async fn route_diff(&self, config: &NetworkConfig) -> Result<bool, NetworkError> {
        let (cidr, guest) = route_target(config)?;
        Ok(!self.platform.check_route(&cidr, guest).await?)
    }

    pub async fn configure_host_route(&self) -> Result<(), NetworkError> {
        let config = self.config()?;
        let (cidr, guest) = route_target(&config)?;

        if !self.route_diff(&config).await? {
            tracing::debug!(%cidr, gateway = %guest, "host route already present");
            return Ok(());
        }

        tracing::warn!(%cidr, gateway = %guest, "adding host route; elevated credentials may be required");
        self.platform.add_route(&cidr, guest).await?;
        tracing::info!(%cidr, gateway = %guest, "added host route");
        Ok(())
    }

    /// Whether queries for the configured domain are not yet sent to the
    /// resolver address.
    pub async fn dns_diff(&self, config: &NetworkConfig) -> Result<bool, NetworkError> {
        let (domain, address) = resolver_target(config)?;
        Ok(!self.platform.check_resolver(domain, address).await?)
    }

    pub async fn configure_dns(&self) -> Result<(), NetworkError> {
        let config = self.config()?;
        let (domain, address) = resolver_target(&config)?;

        if !self.dns_diff(&config).await? {
            tracing::debug!(%domain, %address, "resolver already configured");
            return Ok(());
        }

        tracing::warn!(%domain, %address, "configuring resolver; elevated credentials may be required");
        self.platform.apply_resolver(domain, address).await
    }

    pub async fn configure_guest(&self) -> Result<(), NetworkError> {
        self.guest.configure(&self.config()?).await
    }
}

fn route_target(config: &NetworkConfig) -> Result<(Ipv4Net, Ipv4Addr), NetworkError> {
    let guest = config.require_guest_address()?;
    let cidr = config.cidr()?;
    Ok((cidr, guest))
}

fn resolver_target(config: &NetworkConfig) -> Result<(&str, Ipv4Addr), NetworkError> {
    let domain = validate_domain(config.require_dns_domain()?)?;
    let address = config.resolver_address()?;
    Ok((domain, address))
}

/// Domains end up in file paths and shell commands, so only hostname
/// characters are accepted.
fn validate_domain(domain: &str) -> Result<&str, NetworkError> {
    let valid = !domain.starts_with(['.', '-'])
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid {
        return Err(NetworkError::configuration(format!(
            "invalid DNS domain: {}",
            domain
        )));
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_ip::{InterfaceAddress, StaticInterfaces};
    use crate::platform;
    use windsor_core::NamedService;
    use windsor_shell::{MemoryFs, MockShell};
    use windsor_store::MemoryConfigStore;

    struct Fixture {
        store: Arc<MemoryConfigStore>,
        shell: Arc<MockShell>,
        fs: Arc<MemoryFs>,
    }

    impl Fixture {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self::with_fs(pairs, MemoryFs::new())
        }

        fn with_fs(pairs: &[(&str, &str)], fs: MemoryFs) -> Self {
            Self {
                store: Arc::new(MemoryConfigStore::from_pairs(pairs.iter().copied()).unwrap()),
                shell: Arc::new(MockShell::new()),
                fs: Arc::new(fs),
            }
        }

        fn manager(&self, os: &str) -> NetworkManager {
            let platform = platform::for_os(os, self.shell.clone(), self.fs.clone()).unwrap();
            let interfaces = StaticInterfaces::new().with(
                "bridge100",
                vec![InterfaceAddress::new(Ipv4Addr::new(192, 168, 5, 1), 24)],
            );
            NetworkManager::new(
                self.store.clone(),
                self.shell.clone(),
                platform,
                Arc::new(interfaces),
                "local",
            )
        }
    }

    fn services(names: &[&str]) -> Vec<Box<dyn Service>> {
        names
            .iter()
            .map(|n| Box::new(NamedService::new(*n)) as Box<dyn Service>)
            .collect()
    }

    #[test]
    fn test_assign_ips_persists_default_cidr() {
        let fx = Fixture::new(&[]);
        let mut svcs = services(&["web", "db"]);

        fx.manager("linux")
            .assign_ips(&mut svcs, &mut PortAllocator::new())
            .unwrap();

        assert_eq!(
            fx.store.get_string(keys::NETWORK_CIDR_BLOCK).unwrap(),
            Some("10.5.0.0/16".to_string())
        );
        assert_eq!(svcs[1].address(), Some(Ipv4Addr::new(10, 5, 0, 2)));
        assert_eq!(svcs[0].address(), Some(Ipv4Addr::new(10, 5, 0, 3)));
    }

    #[test]
    fn test_assign_ips_uses_configured_cidr() {
        let fx = Fixture::new(&[("network.cidr_block", "10.9.0.0/24")]);
        let mut svcs = services(&["db"]);

        fx.manager("linux")
            .assign_ips(&mut svcs, &mut PortAllocator::new())
            .unwrap();

        assert_eq!(svcs[0].address(), Some(Ipv4Addr::new(10, 9, 0, 2)));
    }

    #[test]
    fn test_assign_ips_with_injected_allocator() {
        struct Fixed;

        impl AddressAllocator for Fixed {
            fn allocate(
                &self,
                services: &mut [Box<dyn Service>],
                _cidr: &str,
                ports: &mut PortAllocator,
            ) -> Result<(), NetworkError> {
                for service in services.iter_mut() {
                    service
                        .set_address(Ipv4Addr::new(172, 16, 0, 9), ports)
                        .map_err(|e| NetworkError::configuration(e.to_string()))?;
                }
                Ok(())
            }
        }

        let fx = Fixture::new(&[("network.cidr_block", "10.5.0.0/16")]);
        let mut svcs = services(&["db"]);
        fx.manager("linux")
            .with_allocator(Fixed)
            .assign_ips(&mut svcs, &mut PortAllocator::new())
            .unwrap();

        assert_eq!(svcs[0].address(), Some(Ipv4Addr::new(172, 16, 0, 9)));
    }

    #[tokio::test]
    async fn test_host_route_requires_guest_address() {
        let fx = Fixture::new(&[("network.cidr_block", "10.5.0.0/16")]);

        let err = fx.manager("linux").configure_host_route().await.unwrap_err();

        assert!(matches!(err, NetworkError::Configuration(_)));
        assert!(err.to_string().contains("guest address is required"));
        assert!(fx.shell.calls().is_empty());
    }

    #[tokio::test]
    async fn test_host_route_requires_cidr() {
        let fx = Fixture::new(&[("vm.address", "192.168.5.2")]);

        assert!(matches!(
            fx.manager("macos").configure_host_route().await,
            Err(NetworkError::Configuration(_))
        ));
        assert!(fx.shell.calls().is_empty());
    }

    #[tokio::test]
    async fn test_host_route_already_present() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("vm.address", "192.168.5.2"),
        ]);
        fx.shell
            .on_stdout("ip route show", "10.5.0.0/16 via 192.168.5.2 dev col0\n");

        fx.manager("linux").configure_host_route().await.unwrap();

        assert_eq!(fx.shell.calls().len(), 1);
        assert!(fx.shell.elevated_calls().is_empty());
    }

    #[tokio::test]
    async fn test_host_route_added() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("workstation.address", "192.168.5.2"),
        ]);

        fx.manager("linux").configure_host_route().await.unwrap();

        assert_eq!(
            fx.shell.elevated_calls(),
            vec!["ip route add 10.5.0.0/16 via 192.168.5.2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_host_route_clears_cidr_host_bits() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.3.9/16"),
            ("vm.address", "192.168.5.2"),
        ]);
        let mut svcs = services(&["db"]);
        let manager = fx.manager("linux");

        manager
            .assign_ips(&mut svcs, &mut PortAllocator::new())
            .unwrap();
        manager.configure_host_route().await.unwrap();

        assert_eq!(svcs[0].address(), Some(Ipv4Addr::new(10, 5, 0, 2)));
        assert!(fx.shell.was_called("ip route show 10.5.0.0/16"));
        assert_eq!(
            fx.shell.elevated_calls(),
            vec!["ip route add 10.5.0.0/16 via 192.168.5.2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_host_route_ignores_malformed_dns_flag() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("vm.address", "192.168.5.2"),
            ("dns.enabled", "maybe"),
        ]);

        fx.manager("linux").configure_host_route().await.unwrap();
        assert_eq!(
            fx.shell.elevated_calls(),
            vec!["ip route add 10.5.0.0/16 via 192.168.5.2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_host_route_probe_failure_is_terminal() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("vm.address", "192.168.5.2"),
        ]);
        fx.shell.on_status("ip route show", 1, "Error: any valid prefix is expected");

        assert!(matches!(
            fx.manager("linux").configure_host_route().await,
            Err(NetworkError::Probe { .. })
        ));
        assert!(fx.shell.elevated_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dns_already_configured_only_reads() {
        let fs = MemoryFs::new().with_file("/etc/resolver/test", "nameserver 1.2.3.4\n");
        let fx = Fixture::with_fs(&[("dns.domain", "test"), ("dns.address", "1.2.3.4")], fs);

        fx.manager("macos").configure_dns().await.unwrap();

        assert!(fx.shell.calls().is_empty());
        assert!(fx.fs.writes().is_empty());
        assert_eq!(fx.fs.reads().len(), 1);
    }

    #[tokio::test]
    async fn test_dns_localhost_uses_loopback() {
        let fx = Fixture::new(&[("dns.domain", "test"), ("provider", "docker-desktop")]);

        fx.manager("macos").configure_dns().await.unwrap();

        assert_eq!(
            fx.fs.contents("/tmp/windsor-resolver-test.0"),
            Some("nameserver 127.0.0.1\n".to_string())
        );
        assert!(fx.shell.was_called("mv /tmp/windsor-resolver-test.0 /etc/resolver/test"));
    }

    #[tokio::test]
    async fn test_dns_requires_address_for_vm_runtime() {
        let fx = Fixture::new(&[("dns.domain", "test"), ("vm.driver", "colima")]);

        let err = fx.manager("macos").configure_dns().await.unwrap_err();
        assert!(err.to_string().contains("DNS address not configured"));
        assert!(fx.fs.reads().is_empty());
    }

    #[tokio::test]
    async fn test_dns_rejects_unsafe_domain() {
        let fx = Fixture::new(&[("dns.domain", "test; rm -rf /"), ("dns.address", "10.5.0.3")]);

        assert!(matches!(
            fx.manager("linux").configure_dns().await,
            Err(NetworkError::Configuration(_))
        ));
        assert!(fx.shell.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dns_linux_without_stub_resolver() {
        let fx = Fixture::new(&[("dns.domain", "test"), ("dns.address", "10.5.0.3")]);
        fx.shell
            .on_stdout("readlink /etc/resolv.conf", "/run/NetworkManager/resolv.conf\n");

        let err = fx.manager("linux").configure_dns().await.unwrap_err();

        assert!(matches!(err, NetworkError::StubResolverMissing { .. }));
        assert!(err.to_string().contains("configure DNS for test manually"));
        assert!(fx.shell.elevated_calls().is_empty());
    }

    #[tokio::test]
    async fn test_configure_guest_no_bridge() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("vm.address", "192.168.5.2"),
            ("vm.driver", "colima"),
        ]);
        fx.shell.on_stdout("ls /sys/class/net", "eth0\nlo\nwlan0");

        assert!(matches!(
            fx.manager("macos").configure_guest().await,
            Err(NetworkError::NoBridgeInterface)
        ));
        assert!(!fx.shell.was_called("iptables"));
    }

    #[tokio::test]
    async fn test_configure_guest_adds_rule() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.0.0/16"),
            ("vm.address", "192.168.5.2"),
            ("vm.driver", "colima"),
        ]);
        fx.shell
            .on_stdout("ls /sys/class/net", "br-4f2a9c\n")
            .on_status("iptables -t filter -C", 1, "");

        fx.manager("macos").configure_guest().await.unwrap();

        assert!(fx.shell.was_called("--profile windsor-local"));
        assert!(fx.shell.was_called(
            "sudo iptables -t filter -A FORWARD -i col0 -o br-4f2a9c -s 192.168.5.1 -d 10.5.0.0/16 -j ACCEPT"
        ));
    }

    #[tokio::test]
    async fn test_configure_guest_matches_network_not_host() {
        let fx = Fixture::new(&[
            ("network.cidr_block", "10.5.3.9/16"),
            ("vm.address", "192.168.5.2"),
            ("vm.driver", "colima"),
        ]);
        fx.shell
            .on_stdout("ls /sys/class/net", "br-4f2a9c\n")
            .on_status("iptables -t filter -C", 1, "");

        fx.manager("macos").configure_guest().await.unwrap();

        assert!(fx.shell.was_called("-d 10.5.0.0/16 -j ACCEPT"));
        assert!(!fx.shell.was_called("10.5.3.9"));
    }

    #[test]
    fn test_validate_domain() {
        assert!(validate_domain("test").is_ok());
        assert!(validate_domain("dev.example-1.com").is_ok());
        assert!(validate_domain(".test").is_err());
        assert!(validate_domain("te st").is_err());
        assert!(validate_domain("test'").is_err());
    }
}
