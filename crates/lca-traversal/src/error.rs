//! Traversal errors

use lca_entity::{EntityError, FragmentId};
use lca_fragment::FragmentError;
use lca_score::ScoreError;

/// Errors that abort a traversal or scoring pass
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TraversalError {
    /// Fragment model error
    #[error(transparent)]
    Fragment(#[from] FragmentError),

    /// Score aggregation error
    #[error(transparent)]
    Score(#[from] ScoreError),

    /// A reference fragment was re-entered along one path
    #[error("traversal cycle: reference fragment {0} re-entered")]
    Cycle(FragmentId),

    /// A fragment with children has a null termination
    #[error("fragment {0} has children but is not terminated")]
    NullTerminationWithChildren(FragmentId),

    /// More than one child raised the balance signal
    #[error("fragment {0} has more than one balance child")]
    MultipleBalanceFlows(FragmentId),

    /// A reference fragment resolved to a zero exchange value
    #[error("reference fragment {0} has a zero exchange value")]
    ZeroReferenceValue(FragmentId),

    /// A sub-fragment delivers no net reference flow
    #[error("sub-fragment {0} delivers no net reference flow")]
    ZeroSubfragmentOutput(FragmentId),

    /// A balance flow has no factor in the quantity it balances
    #[error("balance flow {0} is not characterized in its conserved quantity")]
    UncharacterizedBalance(FragmentId),

    /// Records of one fragment disagree on node weight per magnitude
    #[error("records of {0} have different node weight ratios")]
    RatioMismatch(FragmentId),

    /// Records of different fragments or terminations were added
    #[error("cannot add records of {left} and {right}")]
    IncompatibleRecords {
        /// Receiving record's fragment
        left: FragmentId,
        /// Other record's fragment
        right: FragmentId,
    },
}

impl From<EntityError> for TraversalError {
    fn from(err: EntityError) -> Self {
        Self::Fragment(FragmentError::Scenario(err))
    }
}

impl TraversalError {
    /// Structural errors in the model being traversed
    #[inline]
    #[must_use]
    pub fn is_topology(&self) -> bool {
        match self {
            Self::Fragment(e) => e.is_topology(),
            Self::Cycle(_) | Self::NullTerminationWithChildren(_) | Self::MultipleBalanceFlows(_) => true,
            _ => false,
        }
    }

    /// Errors fixed by supplying missing data
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fragment(e) => e.is_recoverable(),
            Self::UncharacterizedBalance(_) => true,
            _ => false,
        }
    }

    /// Ambiguous scenario selection
    #[inline]
    #[must_use]
    pub fn is_ambiguity(&self) -> bool {
        matches!(self, Self::Fragment(e) if e.is_ambiguity())
    }
}
