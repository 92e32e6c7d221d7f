mod error;
mod memory;
mod storage;

pub use error::StoreError;
pub use memory::MemoryConfigStore;
pub use storage::FileConfigStore;

/// Dotted-key access to the CLI's configuration.
///
/// Reads never fail for an absent key; they return `Ok(None)`. A present
/// key holding a value of the wrong type is an error.
pub trait ConfigStore: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError>;

    fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
