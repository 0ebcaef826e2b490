//! Client for the external pose-detection service.
//!
//! The service counts repetitions from camera frames and exposes two calls:
//! `POST /api/reset_counter` and `POST /api/process_frame`. Its counting logic
//! is opaque to the gate; only the reported cumulative count matters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors from talking to the pose service.
#[derive(Error, Debug)]
pub enum PoseError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pose service error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Movement phase reported alongside the count. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Up,
    Down,
    #[default]
    #[serde(other)]
    None,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Up => write!(f, "up"),
            Stage::Down => write!(f, "down"),
            Stage::None => write!(f, "none"),
        }
    }
}

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    /// False when the service could not use the frame
    pub success: bool,

    /// Cumulative repetitions since the last reset
    #[serde(default)]
    pub count: u32,

    #[serde(default)]
    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct FrameRequest<'a> {
    frame: &'a str,
}

/// Rep-counting capability consumed by challenge sessions.
#[async_trait]
pub trait PoseDetector: Send + Sync {
    /// Reset the service's cumulative count to zero.
    async fn reset_counter(&self) -> Result<(), PoseError>;

    /// Submit one encoded frame (base64, optionally as a data URL).
    async fn process_frame(&self, frame: &str) -> Result<FrameReport, PoseError>;
}

/// HTTP client for the pose service.
pub struct HttpPoseClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPoseClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PoseError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PoseDetector for HttpPoseClient {
    async fn reset_counter(&self) -> Result<(), PoseError> {
        let url = format!("{}/api/reset_counter", self.base_url);
        let resp = self.client.post(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PoseError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        tracing::debug!(base_url = %self.base_url, "Pose counter reset");
        Ok(())
    }

    async fn process_frame(&self, frame: &str) -> Result<FrameReport, PoseError> {
        let url = format!("{}/api/process_frame", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&FrameRequest { frame })
            .send()
            .await?;

        let status = resp.status();

        // Rejected frames come back as 4xx/5xx with a `success: false` body;
        // those are reported, not treated as an outage.
        let body = resp.text().await?;
        match serde_json::from_str::<FrameReport>(&body) {
            Ok(report) => Ok(report),
            Err(_) if !status.is_success() => Err(PoseError::Api {
                status: status.as_u16(),
                message: body,
            }),
            Err(e) => Err(PoseError::Api {
                status: status.as_u16(),
                message: format!("unreadable response: {e}"),
            }),
        }
    }
}
