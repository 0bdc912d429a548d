mod error;
mod file;
mod memory;
mod record;
mod repo;
mod store;

pub use error::{Result, StoreErr};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::{DatasetRecord, Row};
pub use repo::RepositoryId;
pub use store::LocalStore;
