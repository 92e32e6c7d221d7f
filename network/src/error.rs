use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid CIDR {cidr}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    #[error("not enough addresses in {cidr}: {assigned} of {requested} services assigned")]
    AddressExhaustion {
        cidr: String,
        assigned: usize,
        requested: usize,
    },

    #[error("failed to set address {address} on service {service}: {source}")]
    ServiceAddress {
        service: String,
        address: Ipv4Addr,
        #[source]
        source: windsor_core::SetterError,
    },

    #[error("failed to {operation}: {output}")]
    Probe { operation: String, output: String },

    #[error("failed to {operation}: {output}")]
    Mutation { operation: String, output: String },

    #[error("no docker bridge interface found in guest")]
    NoBridgeInterface,

    #[error("no local interface has a subnet containing {0}")]
    NoContainingSubnet(Ipv4Addr),

    #[error("failed to enumerate network interfaces: {0}")]
    InterfaceEnumeration(#[source] std::io::Error),

    #[error("failed to list addresses of interface {name}: {source}")]
    InterfaceAddresses {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "/etc/resolv.conf is not managed by systemd-resolved; configure DNS for {domain} manually (point it at {address})"
    )]
    StubResolverMissing { domain: String, address: Ipv4Addr },

    #[error("unsupported host platform: {0}")]
    UnsupportedPlatform(String),

    #[error("shell error: {0}")]
    Shell(#[from] windsor_shell::ShellError),

    #[error("store error: {0}")]
    Store(#[from] windsor_store::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetworkError {
    pub(crate) fn probe(operation: impl Into<String>, output: impl Into<String>) -> Self {
        NetworkError::Probe {
            operation: operation.into(),
            output: output.into(),
        }
    }

    pub(crate) fn mutation(operation: impl Into<String>, output: impl Into<String>) -> Self {
        NetworkError::Mutation {
            operation: operation.into(),
            output: output.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        NetworkError::Configuration(message.into())
    }
}
