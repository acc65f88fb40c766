//! Score aggregation errors

/// Errors raised while combining or flattening LCIA results
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    /// Two results scored in different quantities
    #[error("quantity mismatch: expected {expected}, found {found}")]
    QuantityMismatch {
        /// Quantity of the receiving result
        expected: String,
        /// Quantity of the other result
        found: String,
    },

    /// Summary scores for different entities were added
    #[error("entity mismatch: {left} vs {right}")]
    EntityMismatch {
        /// Receiving entity
        left: String,
        /// Other entity
        right: String,
    },

    /// Neither unit scores nor node weights agree
    #[error("inconsistent summary for {entity}: {existing_weight} x {existing_unit} vs {weight} x {unit}")]
    InconsistentSummary {
        /// Entity the summaries belong to
        entity: String,
        /// Node weight already present
        existing_weight: f64,
        /// Unit score already present
        existing_unit: f64,
        /// Node weight being added
        weight: f64,
        /// Unit score being added
        unit: f64,
    },

    /// A detailed and a summary score were filed under one entity
    #[error("component kind mismatch for {entity}")]
    ComponentKindMismatch {
        /// Entity with conflicting component kinds
        entity: String,
    },

    /// Flattened total drifted from the nested total
    #[error("numeric inconsistency: flattened total {actual} vs expected {expected}")]
    NumericInconsistency {
        /// Total before flattening
        expected: f64,
        /// Total after flattening
        actual: f64,
    },
}

impl ScoreError {
    /// Whether the error points at inconsistent modeling data rather than a
    /// caller mistake
    #[inline]
    #[must_use]
    pub fn is_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::InconsistentSummary { .. } | Self::NumericInconsistency { .. }
        )
    }
}
