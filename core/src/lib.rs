mod error;
pub mod keys;
mod runtime;
mod service;

pub use error::CoreError;
pub use runtime::{ContainerEngine, ForwardingCheck, Runtime};
pub use service::{NamedService, PortAllocator, Service, SetterError};
