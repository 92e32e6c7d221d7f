use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown runtime: {0}")]
    UnknownRuntime(String),

    #[error("unknown container engine: {0}")]
    UnknownEngine(String),

    #[error("unknown forwarding check mode: {0} (expected strict or lenient)")]
    UnknownForwardingCheck(String),

    #[error("no free host port at or above {0}")]
    PortsExhausted(u16),
}
