//! Errors raised while parsing or resolving entity-level values

/// Entity-level error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    /// Direction string was neither input nor output
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// Fragment identifier was not a UUID
    #[error("invalid fragment id: {0}")]
    InvalidId(String),

    /// More than one candidate scenario matched a keyed value
    #[error("ambiguous scenario: {matches:?} all match")]
    AmbiguousScenario {
        /// The candidate names that matched
        matches: Vec<String>,
    },
}

impl EntityError {
    /// Ambiguity is a modeling error, parse failures are input errors
    #[inline]
    #[must_use]
    pub fn is_ambiguity(&self) -> bool {
        matches!(self, Self::AmbiguousScenario { .. })
    }
}
