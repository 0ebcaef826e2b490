use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the gate.
#[derive(Error, Debug)]
pub enum GateError {
    /// Block list or rep count absent; resolved by seeding defaults.
    #[error("Configuration missing: {0}")]
    ConfigMissing(&'static str),

    #[error("State store unavailable: {0}")]
    StateUnavailable(String),

    #[error("Pose detection service unreachable: {0}")]
    CollaboratorUnreachable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Challenge session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid challenge transition: cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

impl GateError {
    /// Wrap a storage backend failure.
    pub fn state(err: anyhow::Error) -> Self {
        GateError::StateUnavailable(format!("{err:#}"))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        GateError::InvalidInput(message.into())
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GateError::ConfigMissing(_) => "CONFIG_MISSING",
            GateError::StateUnavailable(_) => "STATE_UNAVAILABLE",
            GateError::CollaboratorUnreachable(_) => "COLLABORATOR_UNREACHABLE",
            GateError::InvalidInput(_) => "INVALID_INPUT",
            GateError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            GateError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }
}

pub type Result<T, E = GateError> = std::result::Result<T, E>;
