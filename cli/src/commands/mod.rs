pub mod network;
pub mod status;

pub use network::{assign, needs_privilege};
pub use status::status;

use std::path::Path;
use std::sync::Arc;
use windsor_core::keys;
use windsor_network::{NetworkManager, SystemInterfaces, platform};
use windsor_shell::{HostFs, Shell, SystemShell};
use windsor_store::{ConfigStore, FileConfigStore};

/// Collaborators wired up for one CLI invocation.
pub struct Session {
    pub manager: NetworkManager,
    pub store: Arc<FileConfigStore>,
    pub context: String,
}

impl Session {
    pub fn open(
        config_dir: &Path,
        context: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let store = Arc::new(FileConfigStore::open(config_dir).map_err(|e| {
            format!(
                "Failed to open configuration in {}: {}",
                config_dir.display(),
                e
            )
        })?);

        let context = match context {
            Some(context) => context,
            None => store
                .get_string(keys::CONTEXT)?
                .unwrap_or_else(|| "local".to_string()),
        };

        tracing::debug!(%context, config = %store.path().display(), "opened configuration");

        let shell: Arc<dyn Shell> = Arc::new(SystemShell::new());
        let platform = platform::detect(shell.clone(), Arc::new(HostFs::new()))?;
        let manager = NetworkManager::new(
            store.clone(),
            shell,
            platform,
            Arc::new(SystemInterfaces),
            &context,
        );

        Ok(Self {
            manager,
            store,
            context,
        })
    }
}
