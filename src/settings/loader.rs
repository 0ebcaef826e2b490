use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{BlockList, Domain, RequiredReps, DEFAULT_BLOCKED_SITES, DEFAULT_REQUIRED_REPS};
use crate::storage::SeedState;

/// Errors that can occur while loading the seed file.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// First-run settings as written in the seed file.
#[derive(Debug, Deserialize)]
pub struct SeedSettings {
    /// Built-in defaults when absent; an explicit empty list blocks nothing
    #[serde(default = "default_blocked_sites")]
    pub blocked_sites: Vec<String>,

    #[serde(default = "default_required_reps")]
    pub required_reps: u32,
}

fn default_blocked_sites() -> Vec<String> {
    DEFAULT_BLOCKED_SITES.iter().map(|site| site.to_string()).collect()
}

fn default_required_reps() -> u32 {
    DEFAULT_REQUIRED_REPS
}

impl SeedSettings {
    /// Convert validated settings into the state written on first run.
    pub fn into_seed_state(self) -> Result<SeedState, SeedError> {
        validate_seed(&self)?;

        let required_reps = RequiredReps::new(self.required_reps).ok_or_else(|| {
            SeedError::Validation("required_reps must be positive".to_string())
        })?;

        Ok(SeedState {
            block_list: BlockList::new(self.blocked_sites),
            required_reps,
        })
    }
}

/// Load seed settings from a YAML file.
///
/// Expected format:
///
/// ```yaml
/// blocked_sites:
///   - youtube.com
///   - reddit.com
/// required_reps: 10
/// ```
pub fn load_seed(path: impl AsRef<Path>) -> Result<SeedState, SeedError> {
    let content = fs::read_to_string(path)?;
    let settings: SeedSettings = serde_yaml::from_str(&content)?;

    settings.into_seed_state()
}

/// Validate seed settings.
fn validate_seed(settings: &SeedSettings) -> Result<(), SeedError> {
    if settings.required_reps == 0 {
        return Err(SeedError::Validation(
            "required_reps must be positive".to_string(),
        ));
    }

    // Check for empty and duplicate sites after normalization
    let mut seen = HashSet::new();
    for site in &settings.blocked_sites {
        let domain = Domain::new(site);
        if domain.is_empty() {
            return Err(SeedError::Validation("Blocked site cannot be empty".to_string()));
        }
        if !seen.insert(domain) {
            return Err(SeedError::Validation(format!(
                "Duplicate blocked site: {}",
                site
            )));
        }
    }

    Ok(())
}
