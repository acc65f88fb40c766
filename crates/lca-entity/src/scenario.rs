//! Scenario keys and scenario contexts
//!
//! Exchange values are keyed by [`ScenarioKey`], terminations by
//! [`TerminationKey`]. A traversal runs under a [`Scenario`] context, which
//! names zero, one or several candidate scenario names.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EntityError;

/// Key into a fragment's exchange value map.
///
/// Persisted as `"0"` (cached), `"1"` (observed) or the scenario name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScenarioKey {
    /// Value fixed at construction
    Cached,
    /// Value observed in practice
    Observed,
    /// Named scenario override
    Named(String),
}

impl ScenarioKey {
    /// Named key
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Scenario name, for non-reserved keys
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Cached | Self::Observed => None,
        }
    }

    /// Whether this is one of the two reserved keys
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Named(_))
    }
}

impl From<String> for ScenarioKey {
    fn from(s: String) -> Self {
        match s.as_str() {
            "0" => Self::Cached,
            "1" => Self::Observed,
            _ => Self::Named(s),
        }
    }
}

impl From<&str> for ScenarioKey {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ScenarioKey> for String {
    fn from(key: ScenarioKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached => f.write_str("0"),
            Self::Observed => f.write_str("1"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Key into a fragment's termination map.
///
/// Persisted as `"default"` or the scenario name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TerminationKey {
    /// Termination used when no scenario matches
    Default,
    /// Named scenario override
    Named(String),
}

impl TerminationKey {
    /// Named key
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Scenario name, for non-default keys
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Default => None,
        }
    }
}

impl From<String> for TerminationKey {
    fn from(s: String) -> Self {
        if s == "default" {
            Self::Default
        } else {
            Self::Named(s)
        }
    }
}

impl From<&str> for TerminationKey {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<TerminationKey> for String {
    fn from(key: TerminationKey) -> Self {
        key.to_string()
    }
}

impl From<&ScenarioKey> for TerminationKey {
    fn from(key: &ScenarioKey) -> Self {
        match key {
            ScenarioKey::Named(name) => Self::Named(name.clone()),
            ScenarioKey::Cached | ScenarioKey::Observed => Self::Default,
        }
    }
}

impl fmt::Display for TerminationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Scenario context a traversal runs under
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// No scenario: cached / observed values and default terminations
    #[default]
    Default,
    /// A single named scenario
    Named(String),
    /// Several candidate names; at most one may match any keyed value
    Candidates(BTreeSet<String>),
}

impl Scenario {
    /// Single named scenario
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Build a context from any number of names.
    ///
    /// Zero names gives [`Scenario::Default`], one gives [`Scenario::Named`].
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        match set.len() {
            0 => Self::Default,
            1 => set.pop_first().map_or(Self::Default, Self::Named),
            _ => Self::Candidates(set),
        }
    }

    /// Whether this is the no-scenario context
    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Whether `name` is one of this context's candidates
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Self::Default => false,
            Self::Named(s) => s == name,
            Self::Candidates(set) => set.contains(name),
        }
    }

    /// Pick the single available name this context matches.
    ///
    /// `Ok(None)` when nothing matches, so the caller falls back to its
    /// reserved keys; an error when more than one name matches.
    pub fn select<'a, I>(&self, available: I) -> Result<Option<&'a str>, EntityError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.is_default() {
            return Ok(None);
        }
        let matches: Vec<&'a str> = available.into_iter().filter(|k| self.contains(k)).collect();
        match matches.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only)),
            _ => Err(EntityError::AmbiguousScenario {
                matches: matches.iter().map(|s| (*s).to_string()).collect(),
            }),
        }
    }

    /// Stable label used in cache keys and reports
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Default => "default".to_string(),
            Self::Named(name) => name.clone(),
            Self::Candidates(set) => set.iter().cloned().collect::<Vec<_>>().join("+"),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
