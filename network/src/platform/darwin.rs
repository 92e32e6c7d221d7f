//! macOS: BSD `route` and per-domain files under `/etc/resolver`.

use super::{HostPlatform, elevated, probe};
use crate::error::NetworkError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use windsor_shell::{FileSystem, Shell};

const RESOLVER_DIR: &str = "/etc/resolver";

pub struct Darwin {
    shell: Arc<dyn Shell>,
    fs: Arc<dyn FileSystem>,
}

impl Darwin {
    pub fn new(shell: Arc<dyn Shell>, fs: Arc<dyn FileSystem>) -> Self {
        Self { shell, fs }
    }

    fn resolver_path(domain: &str) -> PathBuf {
        Path::new(RESOLVER_DIR).join(domain)
    }

    fn resolver_content(address: Ipv4Addr) -> String {
        format!("nameserver {}\n", address)
    }
}

/// Parse `route -n get` output into its `key: value` fields.
fn parse_route_get(output: &str) -> HashMap<&str, &str> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[async_trait]
impl HostPlatform for Darwin {
    fn name(&self) -> &'static str {
        "darwin"
    }

    async fn check_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<bool, NetworkError> {
        let network = cidr.network().to_string();
        let output = probe(
            self.shell.as_ref(),
            "query host route",
            "route",
            &["-n", "get", network.as_str()],
        )
        .await?;

        let fields = parse_route_get(&output.stdout);
        let gateway = gateway.to_string();
        // A lookup that falls through to the default route does not count.
        Ok(fields.get("gateway") == Some(&gateway.as_str())
            && fields.get("destination") != Some(&"default"))
    }

    async fn add_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<(), NetworkError> {
        let cidr = cidr.to_string();
        let gateway = gateway.to_string();
        elevated(
            self.shell.as_ref(),
            "add host route",
            "route",
            &["-nv", "add", "-net", cidr.as_str(), gateway.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn check_resolver(
        &self,
        domain: &str,
        address: Ipv4Addr,
    ) -> Result<bool, NetworkError> {
        match self.fs.read_to_string(&Self::resolver_path(domain)).await {
            Ok(current) => Ok(current == Self::resolver_content(address)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NetworkError::probe("read resolver file", e.to_string())),
        }
    }

    async fn apply_resolver(&self, domain: &str, address: Ipv4Addr) -> Result<(), NetworkError> {
        let shell = self.shell.as_ref();
        let target = Self::resolver_path(domain).to_string_lossy().into_owned();

        if !self.fs.exists(Path::new(RESOLVER_DIR)).await {
            elevated(shell, "create resolver directory", "mkdir", &["-p", RESOLVER_DIR]).await?;
        }

        let staged = self
            .fs
            .stage(
                &format!("windsor-resolver-{}.", domain),
                &Self::resolver_content(address),
            )
            .await
            .map_err(|e| NetworkError::mutation("stage resolver file", e.to_string()))?;
        let staged = staged.to_string_lossy().into_owned();

        elevated(
            shell,
            "install resolver file",
            "mv",
            &[staged.as_str(), target.as_str()],
        )
        .await?;
        elevated(shell, "flush DNS cache", "dscacheutil", &["-flushcache"]).await?;
        elevated(
            shell,
            "reload mDNSResponder",
            "killall",
            &["-HUP", "mDNSResponder"],
        )
        .await?;

        tracing::info!(%domain, %address, "configured resolver at {}", target);
        Ok(())
    }
}
