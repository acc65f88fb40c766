//! Terminations: what a fragment's flow connects to
//!
//! ```text
//! Null ──terminate──▶ Foreground | Process | Subfragment | Background
//!  ▲                                  │
//!  └──────────────clear───────────────┘
//! ```
//!
//! A stored [`Termination`] is immutable apart from its score cache. Changing
//! anything about it (re-terminating, flipping `descend`) replaces it with a
//! fresh value, which drops the cache along with it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lca_entity::{Direction, Flow, FragmentId, ProcessRef, QuantityProvider, QuantityRef};
use lca_score::LciaResult;
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::FragmentError;

/// Resolved termination target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermTarget {
    /// Cutoff: the flow crosses the model boundary
    Null,
    /// The fragment is its own target; its flow is scored directly
    Foreground,
    /// A foreground or background process
    Process(ProcessRef),
    /// Another reference fragment, inlined or aggregated
    Subfragment {
        /// Target reference fragment
        fragment: FragmentId,
        /// Inline the sub-fragment's records instead of aggregating them
        descend: bool,
    },
    /// A background-flagged reference fragment
    Background(FragmentId),
}

/// Termination state, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TerminationKind {
    /// Cutoff
    Null,
    /// Self-terminated
    Foreground,
    /// Process
    Process,
    /// Sub-fragment
    Subfragment,
    /// Background sub-fragment
    Background,
}

impl fmt::Display for TerminationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Foreground => "foreground",
            Self::Process => "process",
            Self::Subfragment => "subfragment",
            Self::Background => "background",
        };
        f.write_str(s)
    }
}

/// Key of a [`ScoreCache`] entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    quantity: String,
    context: String,
    revision: u64,
}

impl ScoreKey {
    /// Key for `quantity` under a traversal context label
    #[must_use]
    pub fn new(quantity: &QuantityRef, context: impl Into<String>) -> Self {
        Self {
            quantity: quantity.external_ref().to_string(),
            context: context.into(),
            revision: 0,
        }
    }

    /// Key valid only for the given store revision
    #[must_use]
    pub fn at_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }
}

/// Unit LCIA results computed for a termination
#[derive(Debug, Default)]
pub struct ScoreCache {
    entries: RwLock<HashMap<ScoreKey, Arc<LciaResult>>>,
}

impl ScoreCache {
    /// Cached result, if any
    #[must_use]
    pub fn get(&self, key: &ScoreKey) -> Option<Arc<LciaResult>> {
        self.entries.read().get(key).cloned()
    }

    /// Cached result, computing and storing it on a miss.
    ///
    /// `compute` runs without the lock held. When two callers race, the first
    /// stored value wins and both get it back. Storing drops entries keyed to
    /// an older revision.
    pub fn get_or_try_insert_with<E, F>(&self, key: ScoreKey, compute: F) -> Result<Arc<LciaResult>, E>
    where
        F: FnOnce() -> Result<LciaResult, E>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let fresh = Arc::new(compute()?);
        let mut entries = self.entries.write();
        entries.retain(|k, _| k.revision >= key.revision);
        Ok(entries.entry(key).or_insert(fresh).clone())
    }

    /// Drop every entry
    pub fn invalidate(&self) {
        self.entries.write().clear();
    }

    /// Number of cached results
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Target as requested by a caller, before defaults are filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Cutoff
    Null,
    /// Self-termination
    Foreground,
    /// Process
    Process(ProcessRef),
    /// Fragment (self, sub-fragment or background sub-fragment)
    Fragment(FragmentId),
}

/// Termination request passed to [`crate::FragmentStore::terminate`]
#[derive(Debug, Clone, PartialEq)]
pub struct TerminationSpec {
    /// Requested target
    pub target: TargetSpec,
    /// Flow at the target; defaults to the fragment's flow
    pub term_flow: Option<Flow>,
    /// Direction at the target; defaults to the complement of the fragment's
    pub direction: Option<Direction>,
    /// Inbound exchange value; defaults to 1, or the target's cached
    /// reference value for sub-fragments
    pub inbound_ev: Option<f64>,
    /// Inline sub-fragment records; defaults to true
    pub descend: Option<bool>,
}

impl TerminationSpec {
    fn with_target(target: TargetSpec) -> Self {
        Self {
            target,
            term_flow: None,
            direction: None,
            inbound_ev: None,
            descend: None,
        }
    }

    /// Cutoff
    #[must_use]
    pub fn null() -> Self {
        Self::with_target(TargetSpec::Null)
    }

    /// Self-termination
    #[must_use]
    pub fn foreground() -> Self {
        Self::with_target(TargetSpec::Foreground)
    }

    /// Process termination
    #[must_use]
    pub fn process(process: ProcessRef) -> Self {
        Self::with_target(TargetSpec::Process(process))
    }

    /// Fragment termination
    #[must_use]
    pub fn fragment(target: FragmentId) -> Self {
        Self::with_target(TargetSpec::Fragment(target))
    }

    /// With an explicit termination flow
    #[must_use]
    pub fn with_term_flow(mut self, flow: Flow) -> Self {
        self.term_flow = Some(flow);
        self
    }

    /// With an explicit direction at the target
    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// With an explicit inbound exchange value
    #[must_use]
    pub fn with_inbound_ev(mut self, value: f64) -> Self {
        self.inbound_ev = Some(value);
        self
    }

    /// With the descend flag
    #[must_use]
    pub fn with_descend(mut self, descend: bool) -> Self {
        self.descend = Some(descend);
        self
    }
}

/// Stored termination of one fragment under one key
#[derive(Debug)]
pub struct Termination {
    target: TermTarget,
    term_flow: Flow,
    direction: Direction,
    inbound_ev: f64,
    cache: ScoreCache,
}

impl Termination {
    pub(crate) fn new(target: TermTarget, term_flow: Flow, direction: Direction, inbound_ev: f64) -> Self {
        Self {
            target,
            term_flow,
            direction,
            inbound_ev,
            cache: ScoreCache::default(),
        }
    }

    /// Cutoff termination of a fragment with `flow` and `direction`
    pub(crate) fn null(flow: &Flow, direction: Direction) -> Arc<Self> {
        Arc::new(Self::new(TermTarget::Null, flow.clone(), direction.complement(), 1.0))
    }

    /// Resolved target
    #[inline]
    #[must_use]
    pub fn target(&self) -> &TermTarget {
        &self.target
    }

    /// State of this termination
    #[must_use]
    pub fn kind(&self) -> TerminationKind {
        match self.target {
            TermTarget::Null => TerminationKind::Null,
            TermTarget::Foreground => TerminationKind::Foreground,
            TermTarget::Process(_) => TerminationKind::Process,
            TermTarget::Subfragment { .. } => TerminationKind::Subfragment,
            TermTarget::Background(_) => TerminationKind::Background,
        }
    }

    /// Flow at the target
    #[inline]
    #[must_use]
    pub fn term_flow(&self) -> &Flow {
        &self.term_flow
    }

    /// Direction at the target
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Per-unit magnitude implied by the target's own accounting
    #[inline]
    #[must_use]
    pub fn inbound_ev(&self) -> f64 {
        self.inbound_ev
    }

    /// Whether this is a cutoff
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.target, TermTarget::Null)
    }

    /// Whether the fragment is its own target
    #[inline]
    #[must_use]
    pub fn is_foreground(&self) -> bool {
        matches!(self.target, TermTarget::Foreground)
    }

    /// Whether the target is another fragment
    #[inline]
    #[must_use]
    pub fn is_subfragment(&self) -> bool {
        matches!(self.target, TermTarget::Subfragment { .. } | TermTarget::Background(_))
    }

    /// Target fragment, for sub-fragment and background terminations
    #[must_use]
    pub fn subfragment(&self) -> Option<FragmentId> {
        match self.target {
            TermTarget::Subfragment { fragment, .. } | TermTarget::Background(fragment) => Some(fragment),
            _ => None,
        }
    }

    /// Target process, for process terminations
    #[must_use]
    pub fn process(&self) -> Option<&ProcessRef> {
        match &self.target {
            TermTarget::Process(p) => Some(p),
            _ => None,
        }
    }

    /// Inline flag; only sub-fragment terminations can be non-descending
    #[must_use]
    pub fn descend(&self) -> bool {
        match self.target {
            TermTarget::Subfragment { descend, .. } => descend,
            TermTarget::Background(_) => false,
            _ => true,
        }
    }

    /// Score cache owned by this termination
    #[inline]
    #[must_use]
    pub fn score_cache(&self) -> &ScoreCache {
        &self.cache
    }

    /// `conversion(flow -> term flow) / inbound ev`
    pub fn node_weight_multiplier(
        &self,
        fragment: FragmentId,
        flow: &Flow,
        quantities: &dyn QuantityProvider,
    ) -> Result<f64, FragmentError> {
        if self.is_null() {
            return Ok(1.0);
        }
        let conversion = if *flow == self.term_flow {
            1.0
        } else {
            quantities
                .convert(flow, self.term_flow.reference_quantity())
                .ok_or_else(|| FragmentError::MissingConversion {
                    fragment,
                    flow: flow.external_ref().to_string(),
                    quantity: self.term_flow.reference_quantity().external_ref().to_string(),
                })?
        };
        if self.inbound_ev == 0.0 {
            return Err(FragmentError::ZeroInboundExchange(fragment));
        }
        Ok(conversion / self.inbound_ev)
    }

    /// Copy with a different descend flag and an empty cache
    pub(crate) fn with_descend(&self, descend: bool) -> Option<Self> {
        match self.target {
            TermTarget::Subfragment { fragment, .. } => Some(Self::new(
                TermTarget::Subfragment { fragment, descend },
                self.term_flow.clone(),
                self.direction,
                self.inbound_ev,
            )),
            _ => None,
        }
    }
}

impl PartialEq for Termination {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target
            && self.term_flow == other.term_flow
            && self.direction == other.direction
            && self.inbound_ev == other.inbound_ev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lca_entity::InMemoryQuantities;

    fn mass() -> QuantityRef {
        QuantityRef::new("mass", "Mass", "kg")
    }

    fn volume() -> QuantityRef {
        QuantityRef::new("volume", "Volume", "m3")
    }

    #[test]
    fn null_has_unit_multiplier() {
        let flow = Flow::new("water", "Water", mass());
        let t = Termination::null(&flow, Direction::Input);
        let q = InMemoryQuantities::new();
        assert_eq!(t.node_weight_multiplier(FragmentId::new(), &flow, &q).unwrap(), 1.0);
        assert_eq!(t.direction(), Direction::Output);
    }

    #[test]
    fn multiplier_converts_then_divides() {
        let water_kg = Flow::new("water", "Water", mass());
        let water_m3 = Flow::new("water-vol", "Water", volume());
        let q = InMemoryQuantities::new().with_conversion(&water_kg, &volume(), 0.001);
        let t = Termination::new(
            TermTarget::Process(ProcessRef::new("tap", "Tap")),
            water_m3,
            Direction::Output,
            2.0,
        );
        let m = t.node_weight_multiplier(FragmentId::new(), &water_kg, &q).unwrap();
        assert!((m - 0.0005).abs() < 1e-15);
    }

    #[test]
    fn missing_conversion_is_recoverable() {
        let water_kg = Flow::new("water", "Water", mass());
        let water_m3 = Flow::new("water-vol", "Water", volume());
        let t = Termination::new(TermTarget::Foreground, water_m3, Direction::Output, 1.0);
        let err = t
            .node_weight_multiplier(FragmentId::new(), &water_kg, &InMemoryQuantities::new())
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn descend_copy_gets_fresh_cache() {
        let flow = Flow::new("frame", "Frame", mass());
        let t = Termination::new(
            TermTarget::Subfragment { fragment: FragmentId::new(), descend: true },
            flow,
            Direction::Input,
            1.0,
        );
        t.score_cache()
            .get_or_try_insert_with::<(), _>(ScoreKey::new(&mass(), "default"), || Ok(LciaResult::new(mass())))
            .unwrap();
        assert_eq!(t.score_cache().len(), 1);

        let flipped = t.with_descend(false).unwrap();
        assert!(!flipped.descend());
        assert!(flipped.score_cache().is_empty());
        assert_ne!(flipped, t);
    }

    #[test]
    fn cache_keeps_first_value() {
        let cache = ScoreCache::default();
        let key = ScoreKey::new(&mass(), "default");
        let first = cache
            .get_or_try_insert_with::<(), _>(key.clone(), || Ok(LciaResult::new(mass()).scaled(2.0)))
            .unwrap();
        let second = cache
            .get_or_try_insert_with::<(), _>(key, || Ok(LciaResult::new(mass()).scaled(3.0)))
            .unwrap();
        assert_eq!(first.scale_factor(), 2.0);
        assert_eq!(second.scale_factor(), 2.0);
    }

    #[test]
    fn newer_revision_replaces_stale_entries() {
        let cache = ScoreCache::default();
        let old = ScoreKey::new(&mass(), "default").at_revision(1);
        let new = ScoreKey::new(&mass(), "default").at_revision(2);
        cache
            .get_or_try_insert_with::<(), _>(old.clone(), || Ok(LciaResult::new(mass()).scaled(2.0)))
            .unwrap();
        let fresh = cache
            .get_or_try_insert_with::<(), _>(new, || Ok(LciaResult::new(mass()).scaled(3.0)))
            .unwrap();
        assert_eq!(fresh.scale_factor(), 3.0);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&old).is_none());
    }
}
