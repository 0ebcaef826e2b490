use chrono::{DateTime, Utc};
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::navigation::SITE_PARAM;
use crate::domain::{AccessDecision, Domain, NavigationEvent, NavigationOutcome};
use crate::error::GateError;
use crate::observability::MetricsRegistry;

use super::access::AccessEngine;

/// How a navigation is treated when the persisted state cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailMode {
    /// Redirect to the challenge page
    #[default]
    Closed,
    /// Let the navigation through
    Open,
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailMode::Closed => write!(f, "closed"),
            FailMode::Open => write!(f, "open"),
        }
    }
}

/// Turns navigation intents into proceed/redirect instructions.
#[derive(Clone)]
pub struct NavigationInterceptor {
    engine: AccessEngine,
    challenge_page: Url,
    fail_mode: FailMode,
    metrics: Arc<MetricsRegistry>,
}

impl NavigationInterceptor {
    pub fn new(
        engine: AccessEngine,
        challenge_page: Url,
        fail_mode: FailMode,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        NavigationInterceptor {
            engine,
            challenge_page,
            fail_mode,
            metrics,
        }
    }

    /// Challenge page URL for a blocked domain.
    pub fn challenge_url(&self, domain: &Domain) -> String {
        let mut url = self.challenge_page.clone();
        url.query_pairs_mut().append_pair(SITE_PARAM, domain.as_str());
        url.to_string()
    }

    /// Decide what to do with a navigation.
    ///
    /// Subframe navigations and URLs without a host always proceed.
    pub async fn intercept(&self, event: &NavigationEvent, now: DateTime<Utc>) -> NavigationOutcome {
        if !event.is_main_frame() {
            return NavigationOutcome::Proceed;
        }

        let Some(domain) = event.domain() else {
            return NavigationOutcome::Proceed;
        };

        let _timer = self.metrics.time_decision();

        match self.engine.decide(&domain, now).await {
            Ok(decision) => {
                self.metrics.record_decision(decision);
                match decision {
                    AccessDecision::Allowed => NavigationOutcome::Proceed,
                    AccessDecision::Blocked => {
                        info!(domain = %domain, tab_id = ?event.tab_id, "Navigation blocked");
                        NavigationOutcome::Redirect {
                            url: self.challenge_url(&domain),
                        }
                    }
                }
            }
            Err(e) => self.on_state_error(&domain, e),
        }
    }

    fn on_state_error(&self, domain: &Domain, err: GateError) -> NavigationOutcome {
        self.metrics.record_state_error();
        warn!(domain = %domain, fail_mode = %self.fail_mode, error = %err, "Access state unreadable");

        match self.fail_mode {
            FailMode::Open => NavigationOutcome::Proceed,
            FailMode::Closed => NavigationOutcome::Redirect {
                url: self.challenge_url(domain),
            },
        }
    }
}
