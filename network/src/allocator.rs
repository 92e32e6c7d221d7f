//! Deterministic assignment of service addresses within a CIDR.
//!
//! Services are ordered by name and handed consecutive addresses starting
//! two past the network address; the first usable address is left for the
//! gateway. For prefixes shorter than /31 the broadcast address is never
//! handed out.

use crate::config::parse_cidr;
use crate::error::NetworkError;
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use windsor_core::{PortAllocator, Service};

/// Strategy for assigning addresses to a set of services.
pub trait AddressAllocator: Send + Sync {
    /// Assign an address to every service, stopping at the first failure.
    ///
    /// Services assigned before a failure keep their new address.
    fn allocate(
        &self,
        services: &mut [Box<dyn Service>],
        cidr: &str,
        ports: &mut PortAllocator,
    ) -> Result<(), NetworkError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialAllocator;

impl AddressAllocator for SequentialAllocator {
    fn allocate(
        &self,
        services: &mut [Box<dyn Service>],
        cidr: &str,
        ports: &mut PortAllocator,
    ) -> Result<(), NetworkError> {
        let net = parse_cidr(cidr)?;

        let mut ordered: Vec<&mut Box<dyn Service>> = services.iter_mut().collect();
        ordered.sort_by(|a, b| a.name().cmp(b.name()));

        let requested = ordered.len();
        let mut candidate = first_assignable(&net);

        for (assigned, service) in ordered.into_iter().enumerate() {
            let address = candidate
                .filter(|addr| is_assignable(&net, *addr))
                .ok_or_else(|| NetworkError::AddressExhaustion {
                    cidr: net.to_string(),
                    assigned,
                    requested,
                })?;

            service
                .set_address(address, ports)
                .map_err(|source| NetworkError::ServiceAddress {
                    service: service.name().to_string(),
                    address,
                    source,
                })?;

            tracing::debug!(service = %service.name(), %address, "assigned address");
            candidate = next(address);
        }

        Ok(())
    }
}

/// The network address advanced past itself and the gateway.
fn first_assignable(net: &Ipv4Net) -> Option<Ipv4Addr> {
    u32::from(net.network()).checked_add(2).map(Ipv4Addr::from)
}

fn next(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    u32::from(addr).checked_add(1).map(Ipv4Addr::from)
}

fn is_assignable(net: &Ipv4Net, addr: Ipv4Addr) -> bool {
    if !net.contains(&addr) {
        return false;
    }
    net.prefix_len() >= 31 || addr != net.broadcast()
}

/// The first usable host address of a network, conventionally its gateway.
pub fn gateway_address(net: &Ipv4Net) -> Option<Ipv4Addr> {
    next(net.network()).filter(|addr| net.contains(addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use windsor_core::{NamedService, SetterError};

    struct FailingService;

    impl Service for FailingService {
        fn name(&self) -> &str {
            "cache"
        }

        fn address(&self) -> Option<Ipv4Addr> {
            None
        }

        fn set_address(
            &mut self,
            _address: Ipv4Addr,
            _ports: &mut PortAllocator,
        ) -> Result<(), SetterError> {
            Err("port 6379 unavailable".into())
        }
    }

    fn services(names: &[&str]) -> Vec<Box<dyn Service>> {
        names
            .iter()
            .map(|n| Box::new(NamedService::new(*n)) as Box<dyn Service>)
            .collect()
    }

    fn address_of(services: &[Box<dyn Service>], name: &str) -> Option<Ipv4Addr> {
        services
            .iter()
            .find(|s| s.name() == name)
            .and_then(|s| s.address())
    }

    #[test]
    fn test_assigns_in_name_order() {
        let mut svcs = services(&["web", "db"]);
        SequentialAllocator
            .allocate(&mut svcs, "10.5.0.0/16", &mut PortAllocator::new())
            .unwrap();

        assert_eq!(address_of(&svcs, "db"), Some(Ipv4Addr::new(10, 5, 0, 2)));
        assert_eq!(address_of(&svcs, "web"), Some(Ipv4Addr::new(10, 5, 0, 3)));
        // Caller's ordering is left alone.
        assert_eq!(svcs[0].name(), "web");
    }

    #[test]
    fn test_host_bits_in_cidr_are_ignored() {
        let mut svcs = services(&["dns"]);
        SequentialAllocator
            .allocate(&mut svcs, "10.5.3.9/16", &mut PortAllocator::new())
            .unwrap();
        assert_eq!(address_of(&svcs, "dns"), Some(Ipv4Addr::new(10, 5, 0, 2)));
    }

    #[test]
    fn test_exhaustion() {
        let mut svcs = services(&["db", "web"]);
        let result =
            SequentialAllocator.allocate(&mut svcs, "10.5.0.0/30", &mut PortAllocator::new());

        assert!(matches!(
            result,
            Err(NetworkError::AddressExhaustion {
                assigned: 1,
                requested: 2,
                ..
            })
        ));
        assert_eq!(address_of(&svcs, "db"), Some(Ipv4Addr::new(10, 5, 0, 2)));
        assert_eq!(address_of(&svcs, "web"), None);
    }

    #[test]
    fn test_tiny_networks_have_no_room() {
        for cidr in ["10.5.0.0/31", "10.5.0.7/32", "255.255.255.255/32"] {
            let mut svcs = services(&["db"]);
            let result =
                SequentialAllocator.allocate(&mut svcs, cidr, &mut PortAllocator::new());
            assert!(
                matches!(result, Err(NetworkError::AddressExhaustion { .. })),
                "{} should be exhausted",
                cidr
            );
        }
    }

    #[test]
    fn test_invalid_cidr_calls_no_setter() {
        let mut svcs = services(&["db", "web"]);
        let result =
            SequentialAllocator.allocate(&mut svcs, "not-a-cidr", &mut PortAllocator::new());

        assert!(matches!(result, Err(NetworkError::InvalidCidr { .. })));
        assert!(svcs.iter().all(|s| s.address().is_none()));
    }

    #[test]
    fn test_setter_failure_stops_allocation() {
        let mut svcs = services(&["api", "web"]);
        svcs.push(Box::new(FailingService));

        let result =
            SequentialAllocator.allocate(&mut svcs, "10.5.0.0/16", &mut PortAllocator::new());

        match result {
            Err(NetworkError::ServiceAddress {
                service, address, ..
            }) => {
                assert_eq!(service, "cache");
                assert_eq!(address, Ipv4Addr::new(10, 5, 0, 3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(address_of(&svcs, "api"), Some(Ipv4Addr::new(10, 5, 0, 2)));
        assert_eq!(address_of(&svcs, "web"), None);
    }

    #[test]
    fn test_empty_service_list() {
        let mut svcs = services(&[]);
        SequentialAllocator
            .allocate(&mut svcs, "10.5.0.0/30", &mut PortAllocator::new())
            .unwrap();
    }

    #[test]
    fn test_gateway_address() {
        let net: Ipv4Net = "10.5.0.0/16".parse().unwrap();
        assert_eq!(gateway_address(&net), Some(Ipv4Addr::new(10, 5, 0, 1)));
        let net: Ipv4Net = "10.5.0.4/32".parse().unwrap();
        assert_eq!(gateway_address(&net), None);
    }
}
