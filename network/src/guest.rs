//! Forwarding from the host into the container network inside a colima VM.
//!
//! Every guest command runs through `colima ssh` with a timeout, so a wedged
//! VM cannot hang the caller.

use crate::allocator::gateway_address;
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::host_ip::{InterfaceSource, find_host_ip};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use windsor_core::{ContainerEngine, ForwardingCheck, Runtime};
use windsor_shell::{CommandOutput, Shell, ShellError};

/// Docker names its user-defined bridges `br-<network id>`.
pub const BRIDGE_PREFIX: &str = "br-";
/// The guest NIC that carries traffic from the host.
pub const HOST_FACING_INTERFACE: &str = "col0";
pub const INCUS_NETWORK: &str = "incusbr0";

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const SYSCTL_TIMEOUT: Duration = Duration::from_secs(10);
const INCUS_TIMEOUT: Duration = Duration::from_secs(15);
const IPTABLES_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote command channel into the VM for one context.
pub struct GuestChannel {
    shell: Arc<dyn Shell>,
    profile: String,
}

impl GuestChannel {
    pub fn new(shell: Arc<dyn Shell>, context: &str) -> Self {
        Self {
            shell,
            profile: format!("windsor-{}", context),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, ShellError> {
        tracing::debug!(profile = %self.profile, %command, "running guest command");
        self.shell
            .exec_with_timeout(
                "colima",
                &["ssh", "--profile", self.profile.as_str(), "--", "sh", "-c", command],
                timeout,
            )
            .await
    }

    async fn probe(
        &self,
        operation: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, NetworkError> {
        let output = self
            .run(command, timeout)
            .await
            .map_err(|e| NetworkError::probe(operation, e.to_string()))?;
        if !output.success() {
            return Err(NetworkError::probe(operation, output.combined()));
        }
        Ok(output)
    }

    async fn mutate(
        &self,
        operation: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, NetworkError> {
        let output = self
            .run(command, timeout)
            .await
            .map_err(|e| NetworkError::mutation(operation, e.to_string()))?;
        if !output.success() {
            return Err(NetworkError::mutation(operation, output.combined()));
        }
        Ok(output)
    }
}

/// An `ACCEPT` rule in the guest's `FORWARD` chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingRule {
    pub input: String,
    pub output: String,
    pub source: Ipv4Addr,
    pub destination: Ipv4Net,
}

impl ForwardingRule {
    pub fn new(output: impl Into<String>, source: Ipv4Addr, destination: Ipv4Net) -> Self {
        Self {
            input: HOST_FACING_INTERFACE.to_string(),
            output: output.into(),
            source,
            destination,
        }
    }

    fn iptables(&self, action: &str) -> String {
        format!(
            "sudo iptables -t filter {} FORWARD -i {} -o {} -s {} -d {} -j ACCEPT",
            action, self.input, self.output, self.source, self.destination
        )
    }

    pub fn check_command(&self) -> String {
        self.iptables("-C")
    }

    pub fn add_command(&self) -> String {
        self.iptables("-A")
    }
}

/// First entry of a `ls /sys/class/net` listing that looks like a Docker bridge.
fn find_bridge(listing: &str) -> Option<&str> {
    listing
        .split_whitespace()
        .find(|name| name.starts_with(BRIDGE_PREFIX))
}

pub struct GuestForwarder {
    channel: GuestChannel,
    interfaces: Arc<dyn InterfaceSource>,
}

impl GuestForwarder {
    pub fn new(shell: Arc<dyn Shell>, interfaces: Arc<dyn InterfaceSource>, context: &str) -> Self {
        Self {
            channel: GuestChannel::new(shell, context),
            interfaces,
        }
    }

    /// Make the guest forward traffic from the host into the container
    /// network. A no-op unless a guest address is configured and the runtime
    /// is a colima VM.
    pub async fn configure(&self, config: &NetworkConfig) -> Result<(), NetworkError> {
        let Some(guest) = config.guest_address()? else {
            tracing::debug!("no guest address configured, skipping guest forwarding");
            return Ok(());
        };
        let engine = match config.runtime()? {
            Some(Runtime::Colima(engine)) => engine,
            other => {
                tracing::debug!(runtime = ?other, "runtime has no guest VM, skipping guest forwarding");
                return Ok(());
            }
        };
        let cidr = config.cidr()?;
        let mode = config.forwarding_check()?;

        let output = match engine {
            ContainerEngine::Docker => self.docker_bridge().await?,
            ContainerEngine::Incus => {
                self.configure_incus_network(&cidr).await?;
                INCUS_NETWORK.to_string()
            }
        };

        let host_ip = find_host_ip(self.interfaces.as_ref(), guest)?;
        self.enable_ip_forwarding().await?;

        let rule = ForwardingRule::new(output, host_ip, cidr);
        if self.forwarding_rule_diff(&rule, mode).await? {
            self.channel
                .mutate("add forwarding rule", &rule.add_command(), IPTABLES_TIMEOUT)
                .await?;
            tracing::info!(
                output = %rule.output,
                source = %rule.source,
                destination = %rule.destination,
                "added guest forwarding rule"
            );
        } else {
            tracing::debug!(output = %rule.output, "guest forwarding rule already present");
        }
        Ok(())
    }

    async fn docker_bridge(&self) -> Result<String, NetworkError> {
        let listing = self
            .channel
            .probe("list guest interfaces", "ls /sys/class/net", LIST_TIMEOUT)
            .await?;
        find_bridge(&listing.stdout)
            .map(str::to_string)
            .ok_or(NetworkError::NoBridgeInterface)
    }

    async fn configure_incus_network(&self, cidr: &Ipv4Net) -> Result<(), NetworkError> {
        let gateway = gateway_address(cidr).ok_or_else(|| {
            NetworkError::configuration(format!("{} has no usable gateway address", cidr))
        })?;
        let command = format!(
            "sudo incus network set {} ipv4.address {}/{}",
            INCUS_NETWORK,
            gateway,
            cidr.prefix_len()
        );
        self.channel
            .mutate("configure incus network", &command, INCUS_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn enable_ip_forwarding(&self) -> Result<(), NetworkError> {
        self.channel
            .mutate(
                "enable IP forwarding in guest",
                "sudo sysctl -w net.ipv4.ip_forward=1",
                SYSCTL_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    /// Whether `rule` is missing from the guest and has to be added.
    pub async fn forwarding_rule_diff(
        &self,
        rule: &ForwardingRule,
        mode: ForwardingCheck,
    ) -> Result<bool, NetworkError> {
        let output = self
            .channel
            .run(&rule.check_command(), IPTABLES_TIMEOUT)
            .await
            .map_err(|e| NetworkError::probe("check forwarding rule", e.to_string()))?;

        match (output.status, mode) {
            (Some(0), _) => Ok(false),
            (Some(1), _) => Ok(true),
            (_, ForwardingCheck::Lenient) => {
                tracing::warn!(
                    status = ?output.status,
                    "forwarding rule check failed, assuming the rule is absent"
                );
                Ok(true)
            }
            (_, ForwardingCheck::Strict) => Err(NetworkError::probe(
                "check forwarding rule",
                output.combined(),
            )),
        }
    }
}
