use super::Session;
use crate::utils::{parse_service, port_column};
use windsor_core::{PortAllocator, Service};

pub fn assign(session: &Session, specs: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut services = specs
        .iter()
        .map(|spec| parse_service(spec).map(|s| Box::new(s) as Box<dyn Service>))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ports = PortAllocator::new();
    session
        .manager
        .assign_ips(&mut services, &mut ports)
        .map_err(|e| format!("Failed to assign addresses: {}", e))?;

    println!("{:<24} {:<16} {:<6}", "SERVICE", "ADDRESS", "PORT");
    for service in &services {
        let address = service
            .address()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<16} {:<6}",
            service.name(),
            address,
            port_column(service.host_port())
        );
    }

    Ok(())
}

pub async fn needs_privilege(session: &Session) {
    println!("{}", session.manager.needs_privilege().await);
}
