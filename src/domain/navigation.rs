use serde::{Deserialize, Serialize};

use super::host::Domain;

/// Frame id reported for the top-level document of a tab.
pub const MAIN_FRAME_ID: i64 = 0;

/// Query parameter carrying the blocked domain on the challenge page URL.
pub const SITE_PARAM: &str = "site";

/// A navigation intent reported by the browser before it commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationEvent {
    /// Target URL of the navigation
    pub url: String,

    /// Frame the navigation happens in (0 for the top-level document)
    #[serde(default)]
    pub frame_id: i64,

    /// Browser tab, echoed back for the caller's convenience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
}

impl NavigationEvent {
    pub fn new(url: impl Into<String>) -> Self {
        NavigationEvent {
            url: url.into(),
            frame_id: MAIN_FRAME_ID,
            tab_id: None,
        }
    }

    /// Only top-level navigations are gated.
    #[inline]
    pub fn is_main_frame(&self) -> bool {
        self.frame_id == MAIN_FRAME_ID
    }

    pub fn domain(&self) -> Option<Domain> {
        Domain::from_url(&self.url)
    }
}

/// What the browser should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum NavigationOutcome {
    /// Let the navigation continue
    Proceed,
    /// Replace the navigation target
    Redirect { url: String },
}

impl NavigationOutcome {
    pub fn is_redirect(&self) -> bool {
        matches!(self, NavigationOutcome::Redirect { .. })
    }
}
