//! Predicting, without mutating anything, whether the next reconcile will
//! need elevated credentials.

use crate::config::NetworkConfig;
use crate::manager::NetworkManager;

impl NetworkManager {
    /// Whether `configure_dns` or `configure_host_route` would currently
    /// change the host.
    ///
    /// Probe errors count as "no change", so a broken probe never produces a
    /// spurious credential prompt.
    pub async fn needs_privilege(&self) -> bool {
        let config = match self.config() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(error = %e, "cannot load network config, assuming no privilege needed");
                return false;
            }
        };

        let dns = self.resolver_needs_privilege(&config).await;
        let route = self.route_needs_privilege(&config).await;
        dns || route
    }

    async fn resolver_needs_privilege(&self, config: &NetworkConfig) -> bool {
        match config.dns_enabled() {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                tracing::debug!(error = %e, "cannot read dns.enabled, skipping resolver check");
                return false;
            }
        }
        if config.dns_domain.is_none() {
            return false;
        }
        match self.dns_diff(config).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::debug!(error = %e, "resolver probe failed");
                false
            }
        }
    }

    async fn route_needs_privilege(&self, config: &NetworkConfig) -> bool {
        let vm_backed = matches!(config.runtime(), Ok(Some(runtime)) if runtime.is_vm_backed());
        let has_guest = matches!(config.guest_address(), Ok(Some(_)));
        if !vm_backed || !has_guest {
            return false;
        }
        match self.route_diff(config).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::debug!(error = %e, "route probe failed");
                false
            }
        }
    }
}
