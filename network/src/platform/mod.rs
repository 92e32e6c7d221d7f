//! Host operating system strategies for routing and DNS.
//!
//! Every variant is compiled on every host; the one matching the running OS
//! is chosen at startup by [`detect`].

mod darwin;
mod linux;
mod windows;

pub use darwin::Darwin;
pub use linux::Linux;
pub use windows::Windows;

use crate::error::NetworkError;
use async_trait::async_trait;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::sync::Arc;
use windsor_shell::{CommandOutput, FileSystem, Shell};

#[async_trait]
pub trait HostPlatform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the host already routes `cidr` through `gateway`.
    async fn check_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<bool, NetworkError>;

    async fn add_route(&self, cidr: &Ipv4Net, gateway: Ipv4Addr) -> Result<(), NetworkError>;

    /// Whether queries for `domain` are already sent to `address`.
    async fn check_resolver(&self, domain: &str, address: Ipv4Addr)
    -> Result<bool, NetworkError>;

    /// Point `domain` at `address`. Only called after [`check_resolver`]
    /// has reported a difference.
    ///
    /// [`check_resolver`]: HostPlatform::check_resolver
    async fn apply_resolver(&self, domain: &str, address: Ipv4Addr) -> Result<(), NetworkError>;
}

/// Select the strategy for the running host.
pub fn detect(
    shell: Arc<dyn Shell>,
    fs: Arc<dyn FileSystem>,
) -> Result<Arc<dyn HostPlatform>, NetworkError> {
    for_os(std::env::consts::OS, shell, fs)
}

pub fn for_os(
    os: &str,
    shell: Arc<dyn Shell>,
    fs: Arc<dyn FileSystem>,
) -> Result<Arc<dyn HostPlatform>, NetworkError> {
    let platform: Arc<dyn HostPlatform> = match os {
        "macos" => Arc::new(Darwin::new(shell, fs)),
        "linux" => Arc::new(Linux::new(shell, fs)),
        "windows" => Arc::new(Windows::new(shell)),
        other => return Err(NetworkError::UnsupportedPlatform(other.to_string())),
    };
    tracing::debug!(platform = platform.name(), "selected host platform");
    Ok(platform)
}

/// Run a read-only command; a non-zero exit is a probe failure.
pub(crate) async fn probe(
    shell: &dyn Shell,
    operation: &str,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, NetworkError> {
    let output = shell
        .exec(program, args)
        .await
        .map_err(|e| NetworkError::probe(operation, e.to_string()))?;
    if !output.success() {
        return Err(NetworkError::probe(operation, output.combined()));
    }
    Ok(output)
}

/// Run an elevated command; a non-zero exit is a mutation failure carrying
/// the command's output.
pub(crate) async fn elevated(
    shell: &dyn Shell,
    operation: &str,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, NetworkError> {
    let output = shell
        .exec_elevated(operation, program, args)
        .await
        .map_err(|e| NetworkError::mutation(operation, e.to_string()))?;
    if !output.success() {
        return Err(NetworkError::mutation(operation, output.combined()));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use windsor_shell::{MemoryFs, MockShell};

    #[test]
    fn test_for_os() {
        let shell: Arc<dyn Shell> = Arc::new(MockShell::new());
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFs::new());

        for (os, name) in [("macos", "darwin"), ("linux", "linux"), ("windows", "windows")] {
            let platform = for_os(os, shell.clone(), fs.clone()).unwrap();
            assert_eq!(platform.name(), name);
        }

        assert!(matches!(
            for_os("freebsd", shell, fs),
            Err(NetworkError::UnsupportedPlatform(os)) if os == "freebsd"
        ));
    }

    #[tokio::test]
    async fn test_probe_and_elevated_wrap_output() {
        let shell = MockShell::new();
        shell
            .on_status("ip route show", 2, "Error: invalid prefix")
            .on_status("ip route add", 2, "RTNETLINK answers: Operation not permitted");

        match probe(&shell, "query routes", "ip", &["route", "show", "x"]).await {
            Err(NetworkError::Probe { operation, output }) => {
                assert_eq!(operation, "query routes");
                assert_eq!(output, "Error: invalid prefix");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        match elevated(&shell, "add route", "ip", &["route", "add", "x"]).await {
            Err(NetworkError::Mutation { output, .. }) => {
                assert!(output.contains("Operation not permitted"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(shell.elevated_calls(), vec!["ip route add x".to_string()]);
    }
}
