//! Fragment model errors

use lca_entity::{EntityError, EntityKind, FragmentId};

/// Errors raised by fragment operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FragmentError {
    /// No fragment with this id
    #[error("fragment not found: {0}")]
    NotFound(FragmentId),

    /// Parent already has a conserving child
    #[error("fragment {parent} already conserves through {existing}")]
    BalanceAlreadySet {
        /// Parent fragment
        parent: FragmentId,
        /// Existing balance child
        existing: FragmentId,
    },

    /// Reference fragments cannot be balance flows
    #[error("balance flow {0} has no parent")]
    BalanceWithoutParent(FragmentId),

    /// Exchange value is computed during traversal
    #[error("exchange value of {0} is determined by traversal")]
    DependentFragment(FragmentId),

    /// Cached value or termination set twice
    #[error("{key} already set on {fragment}")]
    CacheAlreadySet {
        /// Fragment concerned
        fragment: FragmentId,
        /// Key that was already populated
        key: String,
    },

    /// A termination outside the deleted subtree still targets it
    #[error("fragment {fragment} is still used by {referrer}")]
    FragmentInUse {
        /// Fragment that would be deleted
        fragment: FragmentId,
        /// Fragment whose termination targets it
        referrer: FragmentId,
    },

    /// Sub-fragment terminations must target a reference fragment
    #[error("fragment {0} is not a reference fragment")]
    NotReference(FragmentId),

    /// No conversion between a fragment's flow and its termination flow
    #[error("no conversion from {flow} to {quantity} at fragment {fragment}")]
    MissingConversion {
        /// Fragment being traversed
        fragment: FragmentId,
        /// Fragment flow
        flow: String,
        /// Termination flow's reference quantity
        quantity: String,
    },

    /// Termination's inbound exchange value is zero
    #[error("termination of {0} has a zero inbound exchange value")]
    ZeroInboundExchange(FragmentId),

    /// No termination under the given key, or not of the required kind
    #[error("fragment {fragment} has no {expected} termination under {key}")]
    NoSuchTermination {
        /// Fragment concerned
        fragment: FragmentId,
        /// Termination key
        key: String,
        /// Kind that was required
        expected: &'static str,
    },

    /// Sub-fragment terminations form a cycle
    #[error("sub-fragment cycle through {0}")]
    SubfragmentCycle(FragmentId),

    /// Scenario resolution failed
    #[error("scenario error: {0}")]
    Scenario(#[from] EntityError),

    /// External reference could not be resolved
    #[error("unresolved {kind:?} reference: {external_ref}")]
    UnresolvedEntity {
        /// Reference that failed
        external_ref: String,
        /// Kind requested
        kind: EntityKind,
    },

    /// Record's parent is neither stored nor among the records
    #[error("record {0} has no resolvable parent")]
    OrphanRecord(FragmentId),

    /// Process has no exchange of the reference flow
    #[error("process {process} has no reference exchange of {flow}")]
    MissingReferenceExchange {
        /// Process concerned
        process: String,
        /// Reference flow requested
        flow: String,
    },

    /// Fragment id already present in the store
    #[error("duplicate fragment id: {0}")]
    DuplicateId(FragmentId),
}

impl FragmentError {
    /// Structural errors in the fragment model
    #[inline]
    #[must_use]
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            Self::BalanceAlreadySet { .. }
                | Self::BalanceWithoutParent(_)
                | Self::DependentFragment(_)
                | Self::CacheAlreadySet { .. }
                | Self::FragmentInUse { .. }
                | Self::NotReference(_)
                | Self::SubfragmentCycle(_)
                | Self::OrphanRecord(_)
        )
    }

    /// Errors fixed by supplying missing data rather than changing the model
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingConversion { .. } | Self::UnresolvedEntity { .. }
        )
    }

    /// Ambiguous scenario selection
    #[inline]
    #[must_use]
    pub fn is_ambiguity(&self) -> bool {
        matches!(self, Self::Scenario(e) if e.is_ambiguity())
    }
}
