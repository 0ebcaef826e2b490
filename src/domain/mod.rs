pub mod decision;
pub mod exemption;
pub mod host;
pub mod navigation;
pub mod settings;

pub use decision::{AccessDecision, AccessVerdict};
pub use exemption::{Exemption, ExemptionTable};
pub use host::Domain;
pub use navigation::{NavigationEvent, NavigationOutcome};
pub use settings::{BlockList, RequiredReps, DEFAULT_BLOCKED_SITES, DEFAULT_REQUIRED_REPS};
