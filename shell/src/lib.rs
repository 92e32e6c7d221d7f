mod error;
mod fs;
#[cfg(any(test, feature = "test-util"))]
mod mock;
mod shell;
mod system;
mod types;

pub use error::ShellError;
pub use fs::{FileSystem, HostFs};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MemoryFs, MockShell};
pub use shell::Shell;
pub use system::SystemShell;
pub use types::*;
