pub mod pool;
pub mod pose;
pub mod session;

pub use pool::SessionPool;
pub use pose::{FrameReport, HttpPoseClient, PoseDetector, PoseError, Stage};
pub use session::{ChallengeContext, ChallengeProgress, ChallengeSession, ChallengeState};
