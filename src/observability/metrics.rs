use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::AccessDecision;

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Navigation decisions by outcome
    pub decisions_total: AtomicU64,
    pub decisions_allowed: AtomicU64,
    pub decisions_blocked: AtomicU64,

    /// Decisions that could not read the persisted state
    pub state_errors_total: AtomicU64,

    /// Decision latency buckets (microseconds)
    pub latency_under_1ms: AtomicU64,
    pub latency_1_5ms: AtomicU64,
    pub latency_5_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,

    /// Exemption grants
    pub grants_total: AtomicU64,
    pub grant_errors: AtomicU64,

    /// Challenge sessions
    pub challenges_started: AtomicU64,
    pub challenges_completed: AtomicU64,
    pub challenges_aborted: AtomicU64,
    pub frames_processed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a decision outcome.
    pub fn record_decision(&self, decision: AccessDecision) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);

        match decision {
            AccessDecision::Allowed => {
                self.decisions_allowed.fetch_add(1, Ordering::Relaxed);
            }
            AccessDecision::Blocked => {
                self.decisions_blocked.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_state_error(&self) {
        self.state_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decision latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;

        if micros < 1000 {
            self.latency_under_1ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 5000 {
            self.latency_1_5ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 10000 {
            self.latency_5_10ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 50000 {
            self.latency_10_50ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 100000 {
            self.latency_50_100ms.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100ms.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Start timing a decision; latency is recorded when the guard drops.
    pub fn time_decision(&self) -> TimingGuard<'_> {
        TimingGuard::new(self)
    }

    /// Record an exemption grant.
    pub fn record_grant(&self, success: bool) {
        self.grants_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.grant_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_challenge_started(&self) {
        self.challenges_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_challenge_completed(&self) {
        self.challenges_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_challenge_aborted(&self) {
        self.challenges_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP repgate_decisions_total Total number of navigation decisions
# TYPE repgate_decisions_total counter
repgate_decisions_total {}

# HELP repgate_decisions Navigation decisions by outcome
# TYPE repgate_decisions counter
repgate_decisions{{outcome="allowed"}} {}
repgate_decisions{{outcome="blocked"}} {}

# HELP repgate_state_errors_total Decisions made without readable state
# TYPE repgate_state_errors_total counter
repgate_state_errors_total {}

# HELP repgate_decision_latency_bucket Decision latency histogram
# TYPE repgate_decision_latency_bucket counter
repgate_decision_latency_bucket{{le="0.001"}} {}
repgate_decision_latency_bucket{{le="0.005"}} {}
repgate_decision_latency_bucket{{le="0.01"}} {}
repgate_decision_latency_bucket{{le="0.05"}} {}
repgate_decision_latency_bucket{{le="0.1"}} {}
repgate_decision_latency_bucket{{le="+Inf"}} {}

# HELP repgate_grants_total Exemption grant attempts
# TYPE repgate_grants_total counter
repgate_grants_total {}

# HELP repgate_grant_errors_total Exemption grants that failed
# TYPE repgate_grant_errors_total counter
repgate_grant_errors_total {}

# HELP repgate_challenges Challenge sessions by outcome
# TYPE repgate_challenges counter
repgate_challenges{{outcome="started"}} {}
repgate_challenges{{outcome="completed"}} {}
repgate_challenges{{outcome="aborted"}} {}

# HELP repgate_frames_processed_total Frames forwarded to the pose service
# TYPE repgate_frames_processed_total counter
repgate_frames_processed_total {}
"#,
            self.decisions_total.load(Ordering::Relaxed),
            self.decisions_allowed.load(Ordering::Relaxed),
            self.decisions_blocked.load(Ordering::Relaxed),
            self.state_errors_total.load(Ordering::Relaxed),
            self.latency_under_1ms.load(Ordering::Relaxed),
            self.latency_1_5ms.load(Ordering::Relaxed),
            self.latency_5_10ms.load(Ordering::Relaxed),
            self.latency_10_50ms.load(Ordering::Relaxed),
            self.latency_50_100ms.load(Ordering::Relaxed),
            self.latency_over_100ms.load(Ordering::Relaxed),
            self.grants_total.load(Ordering::Relaxed),
            self.grant_errors.load(Ordering::Relaxed),
            self.challenges_started.load(Ordering::Relaxed),
            self.challenges_completed.load(Ordering::Relaxed),
            self.challenges_aborted.load(Ordering::Relaxed),
            self.frames_processed.load(Ordering::Relaxed),
        )
    }
}

/// Guard for timing operations.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_decision() {
        let metrics = MetricsRegistry::new();

        metrics.record_decision(AccessDecision::Allowed);
        metrics.record_decision(AccessDecision::Allowed);
        metrics.record_decision(AccessDecision::Blocked);

        assert_eq!(metrics.decisions_total.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.decisions_allowed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.decisions_blocked.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_timing_guard_records_latency() {
        let metrics = MetricsRegistry::new();

        {
            let _guard = metrics.time_decision();
        }

        assert!(metrics.latency_under_1ms.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_grant_errors_counted() {
        let metrics = MetricsRegistry::new();

        metrics.record_grant(true);
        metrics.record_grant(false);

        assert_eq!(metrics.grants_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.grant_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = MetricsRegistry::new();
        metrics.record_decision(AccessDecision::Blocked);
        metrics.record_challenge_completed();

        let output = metrics.to_prometheus();

        assert!(output.contains("repgate_decisions_total 1"));
        assert!(output.contains("repgate_decisions{outcome=\"blocked\"} 1"));
        assert!(output.contains("repgate_challenges{outcome=\"completed\"} 1"));
    }
}
