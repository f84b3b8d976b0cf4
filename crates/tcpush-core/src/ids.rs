//! Slug identifiers for tasks and task groups.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::Error;

// A url-safe base64 encoded v4 uuid: version nibble and variant bits are fixed.
static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{8}[Q-T][A-Za-z0-9_-][CGKOSWaeimquy048][A-Za-z0-9_-]{10}[AQgw]$")
        .expect("slug pattern is valid")
});

/// A 22 character url-safe identifier carrying 122 random bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SlugId(String);

impl SlugId {
    /// Generate a new slug whose first character is never `-`, so it can be
    /// passed on a command line without being mistaken for a flag.
    pub fn nice() -> Self {
        let mut bytes = *Uuid::new_v4().as_bytes();
        bytes[0] &= 0x7f;
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Generate a new slug from an unmodified v4 uuid.
    pub fn v4() -> Self {
        Self(URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Check that a string has the shape of a slug id.
    pub fn is_valid(s: &str) -> bool {
        SLUG_PATTERN.is_match(s)
    }
}

impl fmt::Display for SlugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SlugId {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidTask(format!("'{}' is not a valid slug id", s)))
        }
    }
}

impl AsRef<str> for SlugId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps labels to slug ids for the duration of one instantiation.
///
/// The same label always resolves to the same id through one cache. A cache
/// is created per instantiation and dropped with it; it is never shared
/// between pushes.
#[derive(Debug, Default)]
pub struct SlugCache {
    labels: HashMap<String, SlugId>,
}

impl SlugCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id previously assigned to `label`, or assign a new one.
    pub fn resolve(&mut self, label: &str) -> SlugId {
        self.labels
            .entry(label.to_string())
            .or_insert_with(SlugId::nice)
            .clone()
    }

    pub fn get(&self, label: &str) -> Option<&SlugId> {
        self.labels.get(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nice_slug_shape() {
        for _ in 0..200 {
            let id = SlugId::nice();
            assert_eq!(id.as_str().len(), 22);
            assert!(SlugId::is_valid(id.as_str()), "{} should be valid", id);
            assert!(!id.as_str().starts_with('-'));
            let first = id.as_str().chars().next().unwrap();
            assert!(matches!(first, 'A'..='Z' | 'a'..='f'));
        }
    }

    #[test]
    fn test_v4_slug_shape() {
        let id = SlugId::v4();
        assert!(SlugId::is_valid(id.as_str()));
    }

    #[test]
    fn test_slug_parse() {
        let id = SlugId::nice();
        let parsed: SlugId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-slug".parse::<SlugId>().is_err());
    }

    #[test]
    fn test_cache_same_label_same_id() {
        let mut cache = SlugCache::new();
        let a = cache.resolve("decision task");
        let b = cache.resolve("decision task");
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_distinct_labels() {
        let mut cache = SlugCache::new();
        let a = cache.resolve("build");
        let b = cache.resolve("test");
        assert_ne!(a, b);
        assert_eq!(cache.get("build"), Some(&a));
    }

    #[test]
    fn test_caches_are_independent() {
        let mut first = SlugCache::new();
        let mut second = SlugCache::new();
        assert_ne!(first.resolve("decision"), second.resolve("decision"));
    }
}
