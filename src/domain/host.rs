use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix stripped from every hostname before matching.
pub const WWW_PREFIX: &str = "www.";

/// Normalized hostname used as the unit of blocking.
///
/// Normalization trims whitespace, lowercases, drops a trailing root dot and
/// strips one leading `www.`. The same normalization is applied to block list
/// entries, queried hosts and exemption keys, so a grant always lands on the
/// key the decision engine later looks up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Domain(normalize(raw.as_ref()))
    }

    /// Extract the domain from a navigation URL.
    ///
    /// Returns `None` for unparseable URLs and URLs without a host.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let domain = Domain::new(host);
        if domain.is_empty() {
            None
        } else {
            Some(domain)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substring containment: `m.youtube.com` contains `youtube.com`, and so
    /// does `youtube.com.evil.example`.
    #[inline]
    pub fn contains(&self, entry: &Domain) -> bool {
        self.0.contains(entry.as_str())
    }
}

fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let trimmed = lowered.strip_suffix('.').unwrap_or(&lowered);
    trimmed
        .strip_prefix(WWW_PREFIX)
        .unwrap_or(trimmed)
        .to_string()
}

impl From<String> for Domain {
    fn from(raw: String) -> Self {
        Domain::new(raw)
    }
}

impl From<&str> for Domain {
    fn from(raw: &str) -> Self {
        Domain::new(raw)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
