use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Domain, Exemption, RequiredReps};
use crate::engine::UnblockManager;
use crate::error::{GateError, Result};
use crate::observability::MetricsRegistry;

use super::pose::{PoseDetector, PoseError, Stage};

/// Collaborators shared by every challenge session.
pub struct ChallengeContext {
    pub pose: Arc<dyn PoseDetector>,
    pub unblock: UnblockManager,
    pub metrics: Arc<MetricsRegistry>,
}

/// Where a challenge session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeState {
    /// Created or reset; nothing is being tracked
    Idle,
    /// Frames are being counted
    Capturing,
    /// Required count reached and the exemption granted
    Success,
    /// Stopped by the user or by a collaborator failure
    Aborted,
}

impl ChallengeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeState::Idle => "idle",
            ChallengeState::Capturing => "capturing",
            ChallengeState::Success => "success",
            ChallengeState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ChallengeState::Success | ChallengeState::Aborted)
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a session returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeProgress {
    pub id: Uuid,
    pub domain: Domain,
    pub state: ChallengeState,
    pub count: u32,
    pub required: u32,
    pub stage: Stage,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemption: Option<Exemption>,
}

/// One user's attempt to earn an exemption for one blocked domain.
///
/// The domain is fixed when the session is created from the redirect, and it
/// is the key every grant from this session uses.
#[derive(Debug)]
pub struct ChallengeSession {
    id: Uuid,
    domain: Domain,
    required: RequiredReps,
    state: ChallengeState,
    count: u32,
    stage: Stage,
    exemption: Option<Exemption>,
    last_error: Option<String>,
    last_access: DateTime<Utc>,
}

impl ChallengeSession {
    pub fn new(domain: Domain, required: RequiredReps) -> Self {
        ChallengeSession {
            id: Uuid::new_v4(),
            domain,
            required,
            state: ChallengeState::Idle,
            count: 0,
            stage: Stage::None,
            exemption: None,
            last_error: None,
            last_access: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Begin tracking. Restarting a finished session resets its count first.
    pub async fn start(&mut self, ctx: &ChallengeContext) -> Result<ChallengeProgress> {
        self.touch();

        if self.state == ChallengeState::Capturing {
            return Ok(self.progress());
        }

        if let Err(e) = ctx.pose.reset_counter().await {
            return Err(self.abort_on(ctx, e));
        }

        self.count = 0;
        self.stage = Stage::None;
        self.last_error = None;
        self.state = ChallengeState::Capturing;
        ctx.metrics.record_challenge_started();

        info!(session_id = %self.id, domain = %self.domain, required = self.required.get(), "Challenge started");
        Ok(self.progress())
    }

    /// Forward one frame to the pose service and advance on its count.
    ///
    /// Reaching the required count grants the exemption exactly once; later
    /// frames are rejected because the session has left `Capturing`.
    pub async fn submit_frame(
        &mut self,
        ctx: &ChallengeContext,
        frame: &str,
        now: DateTime<Utc>,
    ) -> Result<ChallengeProgress> {
        self.touch();

        if self.state != ChallengeState::Capturing {
            return Err(GateError::InvalidTransition {
                action: "submit a frame",
                state: self.state.as_str(),
            });
        }

        let report = match ctx.pose.process_frame(frame).await {
            Ok(report) => report,
            Err(e) => return Err(self.abort_on(ctx, e)),
        };
        ctx.metrics.record_frame();

        if !report.success {
            debug!(session_id = %self.id, error = ?report.error, "Frame skipped by pose service");
            return Ok(self.progress());
        }

        self.count = report.count;
        self.stage = report.stage;

        if !self.required.is_met_by(self.count) {
            return Ok(self.progress());
        }

        match ctx.unblock.grant(&self.domain, None, now).await {
            Ok(exemption) => {
                ctx.metrics.record_grant(true);
                ctx.metrics.record_challenge_completed();
                info!(
                    session_id = %self.id,
                    domain = %self.domain,
                    count = self.count,
                    expires_at = %exemption.expires_at,
                    "Challenge completed"
                );
                self.exemption = Some(exemption);
                self.last_error = None;
                self.state = ChallengeState::Success;
                Ok(self.progress())
            }
            Err(e) => {
                // Stay in Capturing so the next frame retries the grant.
                ctx.metrics.record_grant(false);
                warn!(session_id = %self.id, domain = %self.domain, error = %e, "Grant failed");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop tracking. Has no effect outside `Capturing`.
    pub fn stop(&mut self, ctx: &ChallengeContext) -> ChallengeProgress {
        self.touch();

        if self.state == ChallengeState::Capturing {
            self.state = ChallengeState::Aborted;
            self.last_error = None;
            ctx.metrics.record_challenge_aborted();
            info!(session_id = %self.id, count = self.count, "Challenge stopped");
        }

        self.progress()
    }

    /// Zero the count. A finished session goes back to `Idle`; a capturing
    /// one keeps capturing. Granted exemptions are untouched.
    pub async fn reset(&mut self, ctx: &ChallengeContext) -> Result<ChallengeProgress> {
        self.touch();

        if let Err(e) = ctx.pose.reset_counter().await {
            if self.state == ChallengeState::Capturing {
                return Err(self.abort_on(ctx, e));
            }
            self.last_error = Some(e.to_string());
            return Err(GateError::CollaboratorUnreachable(e.to_string()));
        }

        self.count = 0;
        self.stage = Stage::None;
        self.last_error = None;
        if self.state.is_terminal() {
            self.state = ChallengeState::Idle;
        }

        debug!(session_id = %self.id, state = %self.state, "Challenge counter reset");
        Ok(self.progress())
    }

    pub fn progress(&self) -> ChallengeProgress {
        ChallengeProgress {
            id: self.id,
            domain: self.domain.clone(),
            state: self.state,
            count: self.count,
            required: self.required.get(),
            stage: self.stage,
            status: self.status_message(),
            exemption: self.exemption.clone(),
        }
    }

    /// Check if this session is idle (no recent activity).
    pub fn is_idle(&self, idle_threshold_secs: i64) -> bool {
        let idle_duration = Utc::now() - self.last_access;
        idle_duration.num_seconds() > idle_threshold_secs
    }

    fn status_message(&self) -> String {
        match self.state {
            ChallengeState::Idle => format!("Site blocked: {}", self.domain),
            ChallengeState::Capturing => match self.stage {
                Stage::Up => "Push up position detected".to_string(),
                Stage::Down => "Down position detected - keep going!".to_string(),
                Stage::None => "Tracking pushups...".to_string(),
            },
            ChallengeState::Success => match &self.exemption {
                Some(exemption) => format!(
                    "Great job! You can now access {} until {}.",
                    self.domain,
                    exemption.expires_at.format("%H:%M UTC")
                ),
                None => "Great job!".to_string(),
            },
            ChallengeState::Aborted => match &self.last_error {
                Some(error) => format!("Server error: {}", error),
                None => "Tracking stopped".to_string(),
            },
        }
    }

    fn abort_on(&mut self, ctx: &ChallengeContext, err: PoseError) -> GateError {
        warn!(session_id = %self.id, domain = %self.domain, error = %err, "Pose service failed, aborting challenge");
        if self.state == ChallengeState::Capturing {
            ctx.metrics.record_challenge_aborted();
        }
        self.state = ChallengeState::Aborted;
        self.last_error = Some(err.to_string());
        GateError::CollaboratorUnreachable(err.to_string())
    }

    fn touch(&mut self) {
        self.last_access = Utc::now();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::challenge::pose::FrameReport;
    use crate::domain::AccessDecision;
    use crate::engine::AccessEngine;
    use crate::observability::tracing::init_test_tracing;
    use crate::storage::{MemoryStorage, SeedState, StateStore, Storage};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Pose detector that replays scripted counts.
    #[derive(Default)]
    pub(crate) struct ScriptedPose {
        reports: Mutex<VecDeque<FrameReport>>,
        pub(crate) resets: AtomicU32,
        pub(crate) offline: AtomicBool,
    }

    impl ScriptedPose {
        pub(crate) fn with_counts(counts: &[u32]) -> Self {
            let pose = ScriptedPose::default();
            for &count in counts {
                pose.push(FrameReport {
                    success: true,
                    count,
                    stage: if count % 2 == 0 { Stage::Up } else { Stage::Down },
                    error: None,
                });
            }
            pose
        }

        pub(crate) fn push(&self, report: FrameReport) {
            self.reports.lock().push_back(report);
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn check_online(&self) -> std::result::Result<(), PoseError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(PoseError::Api {
                    status: 503,
                    message: "pose service offline".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PoseDetector for ScriptedPose {
        async fn reset_counter(&self) -> std::result::Result<(), PoseError> {
            self.check_online()?;
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn process_frame(&self, _frame: &str) -> std::result::Result<FrameReport, PoseError> {
            self.check_online()?;
            Ok(self.reports.lock().pop_front().unwrap_or(FrameReport {
                success: false,
                count: 0,
                stage: Stage::None,
                error: Some("no scripted report".to_string()),
            }))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        backend: Arc<MemoryStorage>,
        engine: AccessEngine,
        pose: Arc<ScriptedPose>,
        ctx: ChallengeContext,
    }

    async fn harness(counts: &[u32]) -> Harness {
        init_test_tracing();

        let backend = Arc::new(MemoryStorage::new());
        backend
            .set_blocked_sites(&["reddit.com".to_string()])
            .await
            .unwrap();
        let store = StateStore::new(backend.clone(), SeedState::defaults());
        store.initialize().await.unwrap();

        let pose = Arc::new(ScriptedPose::with_counts(counts));
        let ctx = ChallengeContext {
            pose: pose.clone(),
            unblock: UnblockManager::new(store.clone()),
            metrics: Arc::new(MetricsRegistry::new()),
        };

        Harness {
            backend,
            engine: AccessEngine::new(store),
            pose,
            ctx,
        }
    }

    fn session(required: u32) -> ChallengeSession {
        ChallengeSession::new(Domain::new("reddit.com"), RequiredReps::new(required).unwrap())
    }

    #[tokio::test]
    async fn test_start_resets_pose_counter() {
        let h = harness(&[]).await;
        let mut session = session(3);

        let progress = session.start(&h.ctx).await.unwrap();

        assert_eq!(progress.state, ChallengeState::Capturing);
        assert_eq!(h.pose.resets.load(Ordering::SeqCst), 1);

        // Starting again while capturing does nothing.
        session.start(&h.ctx).await.unwrap();
        assert_eq!(h.pose.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reaching_required_count_grants_once() {
        let h = harness(&[1, 2, 3, 4]).await;
        let mut session = session(3);
        session.start(&h.ctx).await.unwrap();

        let p1 = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();
        assert_eq!(p1.state, ChallengeState::Capturing);
        assert_eq!(p1.count, 1);

        session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();
        assert_eq!(h.backend.exemption_writes(), 1); // the initial seed only

        let p3 = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();
        assert_eq!(p3.state, ChallengeState::Success);
        assert_eq!(
            p3.exemption.as_ref().unwrap().expires_at,
            t0() + chrono::Duration::minutes(30)
        );
        assert_eq!(h.backend.exemption_writes(), 2);

        let err = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap_err();
        assert!(matches!(err, GateError::InvalidTransition { .. }));
        assert_eq!(h.backend.exemption_writes(), 2);

        let decision = h.engine.decide(&Domain::new("reddit.com"), t0()).await.unwrap();
        assert_eq!(decision, AccessDecision::Allowed);
    }

    #[tokio::test]
    async fn test_frames_rejected_before_start() {
        let h = harness(&[5]).await;
        let mut session = session(3);

        let err = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap_err();
        assert!(matches!(
            err,
            GateError::InvalidTransition { state: "idle", .. }
        ));
    }

    #[tokio::test]
    async fn test_unsuccessful_frame_is_skipped() {
        let h = harness(&[]).await;
        h.pose.push(FrameReport {
            success: false,
            count: 0,
            stage: Stage::None,
            error: Some("Image conversion error".to_string()),
        });
        let mut session = session(3);
        session.start(&h.ctx).await.unwrap();

        let progress = session.submit_frame(&h.ctx, "garbage", t0()).await.unwrap();

        assert_eq!(progress.state, ChallengeState::Capturing);
        assert_eq!(progress.count, 0);
    }

    #[tokio::test]
    async fn test_collaborator_failure_aborts_without_grant() {
        let h = harness(&[1]).await;
        let mut session = session(1);
        session.start(&h.ctx).await.unwrap();
        h.pose.set_offline(true);

        let err = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap_err();

        assert!(matches!(err, GateError::CollaboratorUnreachable(_)));
        assert_eq!(session.state(), ChallengeState::Aborted);
        assert!(session.progress().status.starts_with("Server error"));

        let decision = h.engine.decide(&Domain::new("reddit.com"), t0()).await.unwrap();
        assert_eq!(decision, AccessDecision::Blocked);
    }

    #[tokio::test]
    async fn test_start_failure_aborts() {
        let h = harness(&[]).await;
        h.pose.set_offline(true);
        let mut session = session(3);

        let err = session.start(&h.ctx).await.unwrap_err();

        assert!(matches!(err, GateError::CollaboratorUnreachable(_)));
        assert_eq!(session.state(), ChallengeState::Aborted);
    }

    #[tokio::test]
    async fn test_stop_aborts_without_mutation() {
        let h = harness(&[1]).await;
        let mut session = session(3);
        session.start(&h.ctx).await.unwrap();
        session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();

        let progress = session.stop(&h.ctx);

        assert_eq!(progress.state, ChallengeState::Aborted);
        assert_eq!(progress.status, "Tracking stopped");
        assert_eq!(h.backend.exemption_writes(), 1);
    }

    #[tokio::test]
    async fn test_reset_returns_terminal_session_to_idle() {
        let h = harness(&[2]).await;
        let mut session = session(2);
        session.start(&h.ctx).await.unwrap();
        session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();
        assert_eq!(session.state(), ChallengeState::Success);

        let progress = session.reset(&h.ctx).await.unwrap();

        assert_eq!(progress.state, ChallengeState::Idle);
        assert_eq!(progress.count, 0);
        assert_eq!(progress.status, "Site blocked: reddit.com");

        // The exemption granted before the reset still applies.
        let decision = h.engine.decide(&Domain::new("reddit.com"), t0()).await.unwrap();
        assert_eq!(decision, AccessDecision::Allowed);
    }

    #[tokio::test]
    async fn test_reset_while_capturing_keeps_capturing() {
        let h = harness(&[1]).await;
        let mut session = session(5);
        session.start(&h.ctx).await.unwrap();
        session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();

        let progress = session.reset(&h.ctx).await.unwrap();

        assert_eq!(progress.state, ChallengeState::Capturing);
        assert_eq!(progress.count, 0);
    }

    #[tokio::test]
    async fn test_grant_failure_keeps_capturing_and_retries() {
        let h = harness(&[3, 3]).await;
        let mut session = session(3);
        session.start(&h.ctx).await.unwrap();
        h.backend.set_fail_writes(true);

        let err = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap_err();
        assert!(matches!(err, GateError::StateUnavailable(_)));
        assert_eq!(session.state(), ChallengeState::Capturing);

        h.backend.set_fail_writes(false);
        let progress = session.submit_frame(&h.ctx, "frame", t0()).await.unwrap();
        assert_eq!(progress.state, ChallengeState::Success);
    }

    #[tokio::test]
    async fn test_status_messages_follow_stage() {
        let h = harness(&[]).await;
        h.pose.push(FrameReport {
            success: true,
            count: 0,
            stage: Stage::Up,
            error: None,
        });
        h.pose.push(FrameReport {
            success: true,
            count: 1,
            stage: Stage::Down,
            error: None,
        });
        let mut session = session(5);
        session.start(&h.ctx).await.unwrap();

        let up = session.submit_frame(&h.ctx, "f", t0()).await.unwrap();
        assert_eq!(up.status, "Push up position detected");

        let down = session.submit_frame(&h.ctx, "f", t0()).await.unwrap();
        assert_eq!(down.status, "Down position detected - keep going!");
    }
}
