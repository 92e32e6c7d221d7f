//! Host and guest network reconciliation for local development contexts.
//!
//! [`NetworkManager`] is the entry point. It allocates service addresses,
//! routes the container network through the guest VM, scopes a DNS domain
//! to a resolver, and configures forwarding inside the guest. Each
//! operation probes current state first and only mutates on a difference.

mod allocator;
mod config;
mod error;
mod guest;
mod host_ip;
mod manager;
pub mod platform;
mod privilege;

pub use allocator::{AddressAllocator, SequentialAllocator, gateway_address};
pub use config::{NetworkConfig, parse_cidr};
pub use error::NetworkError;
pub use guest::{ForwardingRule, GuestChannel, GuestForwarder};
pub use host_ip::{
    InterfaceAddress, InterfaceSource, InterfaceTable, StaticInterfaces, SystemInterfaces,
    find_host_ip,
};
pub use manager::NetworkManager;
pub use platform::HostPlatform;
