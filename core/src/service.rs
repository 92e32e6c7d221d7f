use crate::error::CoreError;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Error returned by a service's address setter.
pub type SetterError = Box<dyn std::error::Error + Send + Sync>;

/// A named service that receives an address from the network allocator.
///
/// Names are unique across a registry and are used as the allocation sort key.
pub trait Service: Send {
    fn name(&self) -> &str;

    fn address(&self) -> Option<Ipv4Addr>;

    /// Record the assigned address. Implementations may claim host ports from
    /// the shared allocator while doing so.
    fn set_address(&mut self, address: Ipv4Addr, ports: &mut PortAllocator)
    -> Result<(), SetterError>;

    /// Host port claimed while the address was set, if any.
    fn host_port(&self) -> Option<u16> {
        None
    }
}

/// Hands out host ports, moving past any port already claimed.
#[derive(Debug, Default)]
pub struct PortAllocator {
    taken: BTreeSet<u16>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `requested`, or the next free port above it.
    pub fn claim(&mut self, requested: u16) -> Result<u16, CoreError> {
        let mut port = requested;
        while self.taken.contains(&port) {
            port = port
                .checked_add(1)
                .ok_or(CoreError::PortsExhausted(requested))?;
        }
        self.taken.insert(port);
        Ok(port)
    }

    pub fn is_taken(&self, port: u16) -> bool {
        self.taken.contains(&port)
    }
}

/// A service described only by its name and an optional host port.
#[derive(Debug, Clone, Default)]
pub struct NamedService {
    name: String,
    address: Option<Ipv4Addr>,
    requested_port: Option<u16>,
    host_port: Option<u16>,
}

impl NamedService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.requested_port = Some(port);
        self
    }
}

impl Service for NamedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    fn set_address(
        &mut self,
        address: Ipv4Addr,
        ports: &mut PortAllocator,
    ) -> Result<(), SetterError> {
        if let Some(requested) = self.requested_port {
            let port = ports.claim(requested)?;
            tracing::debug!(service = %self.name, requested, port, "claimed host port");
            self.host_port = Some(port);
        }
        self.address = Some(address);
        Ok(())
    }

    fn host_port(&self) -> Option<u16> {
        self.host_port
    }
}
