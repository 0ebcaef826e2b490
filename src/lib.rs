pub mod api;
pub mod challenge;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod observability;
pub mod settings;
pub mod storage;

pub use config::Config;
pub use domain::{AccessDecision, Domain, Exemption};
pub use engine::{AccessEngine, NavigationInterceptor, UnblockManager};
pub use error::GateError;
