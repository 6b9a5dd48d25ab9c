pub mod lock;
pub mod memory_db;
pub mod snapshot;

pub use lock::{DataDirLock, LockError};
pub use memory_db::MemoryKvStore;
pub use snapshot::{write_document, SnapshotStore};
