use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{BlockList, Domain, Exemption, RequiredReps};
use crate::error::GateError;

/// Current block list.
#[derive(Debug, Serialize)]
pub struct BlockedSitesResponse {
    pub sites: Vec<String>,
}

impl From<BlockList> for BlockedSitesResponse {
    fn from(list: BlockList) -> Self {
        BlockedSitesResponse {
            sites: list.to_strings(),
        }
    }
}

/// Current required repetition count.
#[derive(Debug, Serialize)]
pub struct RepCountResponse {
    pub count: u32,
}

impl From<RequiredReps> for RepCountResponse {
    fn from(reps: RequiredReps) -> Self {
        RepCountResponse { count: reps.get() }
    }
}

/// Acknowledgement of a persisted exemption.
#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub domain: Domain,
    pub expires_at: DateTime<Utc>,

    /// Echo of the requested redirect target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl GrantResponse {
    pub fn new(exemption: Exemption, redirect_url: Option<String>) -> Self {
        GrantResponse {
            domain: exemption.domain,
            expires_at: exemption.expires_at,
            redirect_url,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub blocked_sites: usize,
    pub required_reps: u32,
    pub active_sessions: usize,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }
}

fn status_for(err: &GateError) -> StatusCode {
    match err {
        GateError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GateError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        GateError::InvalidTransition { .. } => StatusCode::CONFLICT,
        GateError::CollaboratorUnreachable(_) => StatusCode::BAD_GATEWAY,
        GateError::StateUnavailable(_) | GateError::ConfigMissing(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for(&self);
        (status, Json(ErrorResponse::new(self.to_string(), self.code()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(status_for(&GateError::invalid("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&GateError::SessionNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&GateError::InvalidTransition {
                action: "stop",
                state: "idle"
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&GateError::CollaboratorUnreachable("down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&GateError::StateUnavailable("io".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_grant_response_omits_missing_redirect() {
        let exemption = Exemption {
            domain: Domain::new("reddit.com"),
            expires_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        };

        let json = serde_json::to_string(&GrantResponse::new(exemption, None)).unwrap();

        assert!(json.contains("\"domain\":\"reddit.com\""));
        assert!(json.contains("2024-05-01T12:30:00Z"));
        assert!(!json.contains("redirect_url"));
    }
}
