//! Configuration keys read by the network subsystem.
//!
//! Where a setting has been renamed between configuration generations, the
//! newer key is listed first and is consulted before the legacy one.

pub const CONTEXT: &str = "context";

pub const NETWORK_CIDR_BLOCK: &str = "network.cidr_block";
pub const NETWORK_FORWARDING_CHECK: &str = "network.forwarding_check";

pub const GUEST_ADDRESS: [&str; 2] = ["workstation.address", "vm.address"];
pub const RUNTIME: [&str; 3] = ["workstation.runtime", "vm.driver", "provider"];
pub const VM_ENGINE: &str = "vm.runtime";

pub const DNS_DOMAIN: &str = "dns.domain";
pub const DNS_ADDRESS: &str = "dns.address";
pub const DNS_ENABLED: &str = "dns.enabled";

/// CIDR written back to the store when none is configured.
pub const DEFAULT_CIDR_BLOCK: &str = "10.5.0.0/16";
