use crate::error::CoreError;
use std::str::FromStr;

/// Container engine running inside a VM-backed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerEngine {
    Docker,
    Incus,
}

impl FromStr for ContainerEngine {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(ContainerEngine::Docker),
            "incus" => Ok(ContainerEngine::Incus),
            other => Err(CoreError::UnknownEngine(other.to_string())),
        }
    }
}

impl std::fmt::Display for ContainerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerEngine::Docker => write!(f, "docker"),
            ContainerEngine::Incus => write!(f, "incus"),
        }
    }
}

/// How containers are hosted for the active context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    /// A colima VM hosting the given engine. Host traffic reaches the
    /// container network through the VM.
    Colima(ContainerEngine),
    /// Containers publish directly on the host loopback; there is no VM.
    Localhost,
}

impl Runtime {
    /// Parse a runtime discriminator such as `colima+incus` or `docker-desktop`.
    ///
    /// `engine_hint` is the separately configured VM engine, consulted only
    /// when the discriminator names colima without an engine suffix.
    pub fn parse(discriminator: &str, engine_hint: Option<&str>) -> Result<Self, CoreError> {
        let discriminator = discriminator.trim().to_ascii_lowercase();
        let (base, suffix) = match discriminator.split_once('+') {
            Some((base, suffix)) => (base, Some(suffix)),
            None => (discriminator.as_str(), None),
        };

        match base {
            "colima" => {
                let engine = match suffix.or(engine_hint) {
                    Some(engine) => engine.parse()?,
                    None => ContainerEngine::Docker,
                };
                Ok(Runtime::Colima(engine))
            }
            "docker-desktop" | "docker" if suffix.is_none() => Ok(Runtime::Localhost),
            _ => Err(CoreError::UnknownRuntime(discriminator.clone())),
        }
    }

    pub fn is_vm_backed(&self) -> bool {
        matches!(self, Runtime::Colima(_))
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Runtime::Colima(engine) => write!(f, "colima+{}", engine),
            Runtime::Localhost => write!(f, "docker-desktop"),
        }
    }
}

/// Interpretation of a non-zero exit from the guest firewall rule check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForwardingCheck {
    /// Only exit status 1 means the rule is absent.
    #[default]
    Strict,
    /// Any non-zero exit status means the rule is absent.
    Lenient,
}

impl FromStr for ForwardingCheck {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ForwardingCheck::Strict),
            "lenient" => Ok(ForwardingCheck::Lenient),
            other => Err(CoreError::UnknownForwardingCheck(other.to_string())),
        }
    }
}
