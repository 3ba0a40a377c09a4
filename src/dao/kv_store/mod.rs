mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::dao::storage::StorageResult;

/// Synchronous string key-value storage on the local device.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    /// Delete `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}
