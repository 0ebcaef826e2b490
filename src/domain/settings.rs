use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use super::host::Domain;

/// Sites blocked on first run.
pub const DEFAULT_BLOCKED_SITES: &[&str] = &[
    "youtube.com",
    "reddit.com",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "tiktok.com",
];

/// Repetitions required when none (or a non-positive count) is stored.
pub const DEFAULT_REQUIRED_REPS: u32 = 10;

/// Ordered set of blocked domain entries.
///
/// Construction normalizes every entry, drops empty ones and keeps only the
/// first occurrence of a duplicate. An empty entry would otherwise contain-match
/// every host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Domain>", into = "Vec<Domain>")]
pub struct BlockList {
    entries: Vec<Domain>,
}

impl BlockList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Domain>,
    {
        let mut list = BlockList::default();
        for entry in entries {
            list.push(entry.into());
        }
        list
    }

    /// The built-in first-run list.
    pub fn defaults() -> Self {
        BlockList::new(DEFAULT_BLOCKED_SITES.iter().copied())
    }

    /// Append an entry unless it is empty or already present.
    ///
    /// Returns true if the entry was added.
    pub fn push(&mut self, entry: Domain) -> bool {
        if entry.is_empty() || self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Remove an entry. Returns true if it was present.
    pub fn remove(&mut self, entry: &Domain) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != entry);
        before != self.entries.len()
    }

    /// First entry contained in `domain`, if any.
    #[inline]
    pub fn matching_entry(&self, domain: &Domain) -> Option<&Domain> {
        self.entries.iter().find(|entry| domain.contains(entry))
    }

    #[inline]
    pub fn is_listed(&self, domain: &Domain) -> bool {
        self.matching_entry(domain).is_some()
    }

    pub fn contains(&self, entry: &Domain) -> bool {
        self.entries.contains(entry)
    }

    pub fn entries(&self) -> &[Domain] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.entries.iter().map(|d| d.as_str().to_string()).collect()
    }
}

impl From<Vec<Domain>> for BlockList {
    fn from(entries: Vec<Domain>) -> Self {
        BlockList::new(entries)
    }
}

impl From<BlockList> for Vec<Domain> {
    fn from(list: BlockList) -> Self {
        list.entries
    }
}

/// Global number of repetitions a challenge must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RequiredReps(NonZeroU32);

impl RequiredReps {
    /// Returns `None` for zero.
    pub fn new(count: u32) -> Option<Self> {
        NonZeroU32::new(count).map(RequiredReps)
    }

    /// Interpret a stored value, falling back to the default when it is
    /// missing or not positive.
    pub fn from_stored(stored: Option<i64>) -> Self {
        stored
            .and_then(|v| u32::try_from(v).ok())
            .and_then(RequiredReps::new)
            .unwrap_or_default()
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    /// True once `count` reaches the requirement.
    #[inline]
    pub fn is_met_by(&self, count: u32) -> bool {
        count >= self.get()
    }
}

impl Default for RequiredReps {
    fn default() -> Self {
        const DEFAULT: NonZeroU32 = match NonZeroU32::new(DEFAULT_REQUIRED_REPS) {
            Some(count) => count,
            None => NonZeroU32::MIN,
        };
        RequiredReps(DEFAULT)
    }
}

impl TryFrom<u32> for RequiredReps {
    type Error = String;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        RequiredReps::new(count).ok_or_else(|| "required reps must be positive".to_string())
    }
}

impl From<RequiredReps> for u32 {
    fn from(reps: RequiredReps) -> Self {
        reps.get()
    }
}

impl fmt::Display for RequiredReps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}
