//! Linux: iproute2 routes and systemd-resolved drop-ins.

use super::{HostPlatform, elevated, probe};
use crate::error::NetworkError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use windsor_shell::{FileSystem, Shell};

const RESOLV_CONF: &str = "/etc/resolv.conf";
const STUB_RESOLVER_SUFFIX: &str = "systemd/resolve/stub-resolv.conf";
const DROP_IN_DIR: &str = "/etc/systemd/resolved.conf.d";

pub struct Linux {
    shell: Arc<dyn Shell>,
    fs: Arc<dyn FileSystem>,
}

impl Linux {
    pub fn new(shell: Arc<dyn Shell>, fs: Arc<dyn FileSystem>) -> Self {
        Self { shell, fs }
    }

    fn drop_in_path(domain: &str) -> PathBuf {
        Path::new(DROP_IN_DIR).join(format!("dns-override-{}.conf", domain))
    }

    fn drop_in_content(domain: &str, address: Ipv4Addr) -> String {
        format!("[Resolve]\nDNS={}\nDomains=~{}\n", address, domain)
    }

    /// Fails unless `/etc/resolv.conf` points at the systemd-resolved stub.
    async fn require_stub_resolver(
        &self,
        domain: &str,
        address: Ipv4Addr,
    ) -> Result<(), NetworkError> {
        let output = self
            .shell
            .exec("readlink", &[RESOLV_CONF])
            .await
            .map_err(|e| NetworkError::probe("inspect /etc/resolv.conf", e.to_string()))?;

        if !output.success() || !output.stdout.trim().ends_with(STUB_RESOLVER_SUFFIX) {
            return Err(NetworkError::StubResolverMissing {
                domain: domain.to_string(),
                address,
            });
        }
        Ok(())
    }
}

/// Whether `ip route show` output contains a route via `gateway`.
fn routes_via(output: &str, gateway: Ipv4Addr) -> bool {
    let via = format!("via {}", gateway);
    output.lines().any(|line| {
        line.split_once(via.as_str())
            .is_some_and(|(_, rest)| rest.is_empty() || rest.starts_with(' '))
    })
}

#[async_trait]
impl HostPlatform for Linux {
    fn name(&self) -> &'static str {
        "linux"
    }

    async fn check_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<bool, NetworkError> {
        let cidr = cidr.to_string();
        let output = probe(
            self.shell.as_ref(),
            "query host route",
            "ip",
            &["route", "show", cidr.as_str()],
        )
        .await?;
        Ok(routes_via(&output.stdout, gateway))
    }

    async fn add_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<(), NetworkError> {
        let cidr = cidr.to_string();
        let gateway = gateway.to_string();
        elevated(
            self.shell.as_ref(),
            "add host route",
            "ip",
            &["route", "add", cidr.as_str(), "via", gateway.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn check_resolver(
        &self,
        domain: &str,
        address: Ipv4Addr,
    ) -> Result<bool, NetworkError> {
        self.require_stub_resolver(domain, address).await?;

        match self.fs.read_to_string(&Self::drop_in_path(domain)).await {
            Ok(current) => Ok(current == Self::drop_in_content(domain, address)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NetworkError::probe("read resolved drop-in", e.to_string())),
        }
    }

    async fn apply_resolver(&self, domain: &str, address: Ipv4Addr) -> Result<(), NetworkError> {
        let shell = self.shell.as_ref();
        let path = Self::drop_in_path(domain).to_string_lossy().into_owned();
        let script = format!(
            "printf '%s' '{}' > {}",
            Self::drop_in_content(domain, address),
            path
        );

        elevated(shell, "create resolved drop-in directory", "mkdir", &["-p", DROP_IN_DIR]).await?;
        elevated(shell, "write resolved drop-in", "sh", &["-c", script.as_str()]).await?;
        elevated(
            shell,
            "restart systemd-resolved",
            "systemctl",
            &["restart", "systemd-resolved"],
        )
        .await?;

        tracing::info!(%domain, %address, "configured resolved drop-in at {}", path);
        Ok(())
    }
}
