use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query for a single access decision.
#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    pub domain: String,
}

/// Replacement block list.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockedSitesRequest {
    pub sites: Vec<String>,
}

/// One site to append to the block list.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddSiteRequest {
    pub site: String,
}

/// New required repetition count.
///
/// Signed so that negative values reach validation and get a proper error
/// instead of a deserialization failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct RepCountRequest {
    pub count: i64,
}

/// Request for a temporary exemption.
#[derive(Debug, Serialize, Deserialize)]
pub struct GrantRequest {
    pub domain: String,

    /// Exemption length in milliseconds; the configured default when absent
    #[serde(default)]
    pub duration_ms: Option<u64>,

    /// Where the caller wants to go once the exemption is granted
    #[serde(default)]
    pub redirect_url: Option<String>,
}

impl GrantRequest {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }
}

/// Open a challenge session for a blocked domain.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateChallengeRequest {
    pub domain: String,
}

/// One camera frame, base64 or a `data:` URL.
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameRequest {
    pub frame: String,
}
