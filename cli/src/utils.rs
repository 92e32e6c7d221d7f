use windsor_core::NamedService;

/// Parse a `NAME` or `NAME:PORT` service argument.
pub fn parse_service(spec: &str) -> Result<NamedService, String> {
    let (name, port) = match spec.split_once(':') {
        Some((name, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("Invalid port in service '{}'", spec))?;
            (name, Some(port))
        }
        None => (spec, None),
    };

    if name.is_empty() {
        return Err(format!("Missing service name in '{}'", spec));
    }

    let service = NamedService::new(name);
    Ok(match port {
        Some(port) => service.with_port(port),
        None => service,
    })
}

pub fn port_column(port: Option<u16>) -> String {
    port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("unset")
}
