pub mod loader;
pub mod service;

pub use loader::{load_seed, SeedError, SeedSettings};
pub use service::SettingsService;
