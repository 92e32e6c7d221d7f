use super::Session;
use crate::utils::or_unset;

pub fn status(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let config = session.manager.config()?;

    println!("Context:     {}", session.context);
    println!("Config file: {}", session.store.path().display());
    println!("Platform:    {}", session.manager.platform().name());
    println!("CIDR:        {}", or_unset(config.cidr_block.as_deref()));
    println!("Guest:       {}", or_unset(config.guest_address.as_deref()));

    let runtime = config
        .runtime()
        .map(|r| r.map(|r| r.to_string()))
        .unwrap_or_else(|e| Some(format!("invalid ({})", e)));
    println!("Runtime:     {}", or_unset(runtime.as_deref()));

    println!("DNS domain:  {}", or_unset(config.dns_domain.as_deref()));
    let resolver = config
        .resolver_address()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unset".to_string());
    println!("DNS address: {}", resolver);
    let dns = match config.dns_enabled() {
        Ok(true) => "enabled".to_string(),
        Ok(false) => "disabled".to_string(),
        Err(e) => format!("invalid ({})", e),
    };
    println!("DNS:         {}", dns);

    let check = config
        .forwarding_check()
        .map(|c| format!("{:?}", c).to_lowercase())
        .unwrap_or_else(|e| format!("invalid ({})", e));
    println!("Rule check:  {}", check);

    Ok(())
}
