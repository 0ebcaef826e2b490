// src/storage/mod.rs
pub mod file;
pub mod memory;
pub mod postgres;
pub mod state;
pub mod traits;

pub use file::{FileStorage, FileStorageError};
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use state::{SeedState, StateStore};
pub use traits::Storage;
