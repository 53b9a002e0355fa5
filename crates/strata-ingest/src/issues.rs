//! Issue references in commit messages.

use std::collections::HashMap;

use regex::Regex;
use strata_core::StrataError;

/// Extracts issue keys from commit messages with a configurable pattern.
///
/// # Examples
///
/// ```
/// use strata_ingest::issues::IssueReferenceExtractor;
///
/// let extractor = IssueReferenceExtractor::new("#([0-9]+)").unwrap();
/// assert_eq!(extractor.extract("fix #12, see #7 and #12"), vec!["12", "7"]);
/// ```
#[derive(Debug, Clone)]
pub struct IssueReferenceExtractor {
    pattern: Regex,
}

impl IssueReferenceExtractor {
    /// Compile `pattern`. Capture group 1 is the key when present.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Config`] if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self, StrataError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| StrataError::Config(format!("invalid issue pattern '{pattern}': {e}")))?;
        Ok(Self { pattern })
    }

    /// Distinct issue keys in order of first appearance.
    pub fn extract(&self, message: &str) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for caps in self.pattern.captures_iter(message) {
            let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                continue;
            };
            let key = m.as_str();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }
}

/// Issue key to persisted id, scoped to one ingestion run.
///
/// Ids resolved inside a commit's batch are staged and only become visible
/// to later commits once that batch commits.
///
/// # Examples
///
/// ```
/// use strata_ingest::issues::IssueCache;
///
/// let mut cache = IssueCache::new();
/// cache.stage("12", 3);
/// assert_eq!(cache.get("12"), Some(3));
/// cache.discard();
/// assert_eq!(cache.get("12"), None);
/// ```
#[derive(Debug, Default)]
pub struct IssueCache {
    resolved: HashMap<String, i64>,
    staged: HashMap<String, i64>,
}

impl IssueCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `key`, staged or committed.
    pub fn get(&self, key: &str) -> Option<i64> {
        self.staged
            .get(key)
            .or_else(|| self.resolved.get(key))
            .copied()
    }

    /// Remember an id resolved inside the current batch.
    pub fn stage(&mut self, key: &str, id: i64) {
        self.staged.insert(key.to_string(), id);
    }

    /// The current batch committed: keep its ids.
    pub fn commit(&mut self) {
        self.resolved.extend(self.staged.drain());
    }

    /// The current batch rolled back: forget its ids.
    pub fn discard(&mut self) {
        self.staged.clear();
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Whether no entry is committed.
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
