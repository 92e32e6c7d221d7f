//! Windows: NetTCPIP routes and Name Resolution Policy Table rules, all
//! driven through PowerShell.

use super::{HostPlatform, elevated, probe};
use crate::error::NetworkError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::sync::Arc;
use windsor_shell::{CommandOutput, Shell};

const POWERSHELL: &str = "powershell";

pub struct Windows {
    shell: Arc<dyn Shell>,
}

impl Windows {
    pub fn new(shell: Arc<dyn Shell>) -> Self {
        Self { shell }
    }

    async fn query(&self, operation: &str, script: &str) -> Result<CommandOutput, NetworkError> {
        probe(self.shell.as_ref(), operation, POWERSHELL, &["-Command", script]).await
    }

    async fn run_elevated(&self, operation: &str, script: &str) -> Result<(), NetworkError> {
        elevated(self.shell.as_ref(), operation, POWERSHELL, &["-Command", script]).await?;
        Ok(())
    }
}

/// NRPT namespaces are dot-prefixed domain suffixes.
fn namespace(domain: &str) -> String {
    format!(".{}", domain)
}

fn route_query(cidr: &Ipv4Net, gateway: Ipv4Addr) -> String {
    format!(
        "Get-NetRoute -DestinationPrefix {} -ErrorAction SilentlyContinue | Where-Object {{ $_.NextHop -eq '{}' }}",
        cidr, gateway
    )
}

fn name_server_query(domain: &str) -> String {
    format!(
        "Get-DnsClientNrptRule | Where-Object {{ $_.Namespace -eq '{}' }} | Select-Object -ExpandProperty NameServers",
        namespace(domain)
    )
}

fn upsert_rule_script(domain: &str, address: Ipv4Addr) -> String {
    let namespace = namespace(domain);
    format!(
        "$rule = Get-DnsClientNrptRule | Where-Object {{ $_.Namespace -eq '{ns}' }} | Select-Object -First 1; \
         if ($rule) {{ Set-DnsClientNrptRule -Name $rule.Name -NameServers '{ip}' }} \
         else {{ Add-DnsClientNrptRule -Namespace '{ns}' -NameServers '{ip}' }}",
        ns = namespace,
        ip = address
    )
}

fn name_servers(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

#[async_trait]
impl HostPlatform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn check_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<bool, NetworkError> {
        let output = self
            .query("query host route", &route_query(cidr, gateway))
            .await?;
        Ok(!output.stdout.trim().is_empty())
    }

    async fn add_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<(), NetworkError> {
        let script = format!(
            "New-NetRoute -DestinationPrefix {} -NextHop {} -RouteMetric 1",
            cidr, gateway
        );
        self.run_elevated("add host route", &script).await
    }

    async fn check_resolver(
        &self,
        domain: &str,
        address: Ipv4Addr,
    ) -> Result<bool, NetworkError> {
        let output = self
            .query("query NRPT rules", &name_server_query(domain))
            .await?;
        let expected = address.to_string();
        Ok(name_servers(&output.stdout) == [expected.as_str()])
    }

    async fn apply_resolver(&self, domain: &str, address: Ipv4Addr) -> Result<(), NetworkError> {
        self.run_elevated("set NRPT rule", &upsert_rule_script(domain, address))
            .await?;
        self.run_elevated("clear DNS client cache", "Clear-DnsClientCache")
            .await?;

        tracing::info!(%domain, %address, "configured NRPT rule for {}", namespace(domain));
        Ok(())
    }
}
