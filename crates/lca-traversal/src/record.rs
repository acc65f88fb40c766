//! Traversal output records

use std::sync::Arc;

use lca_entity::{Direction, Flow, FragmentId};
use lca_fragment::{Fragment, TermTarget, Termination, TerminationKind};
use serde::Serialize;

use crate::error::TraversalError;

/// Ratio tolerance when adding two records of one fragment
const RATIO_TOLERANCE: f64 = 1e-9;

/// One visited node of a traversal
///
/// `magnitude` is the flow in the fragment flow's own units, scaled by
/// everything upstream. `node_weight` is the activity level of the
/// termination: `magnitude * conversion / inbound_ev`.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentFlow {
    fragment: FragmentId,
    name: String,
    flow: Flow,
    direction: Direction,
    magnitude: f64,
    exchange_value: f64,
    node_weight: f64,
    termination: Arc<Termination>,
    is_conserved: bool,
    is_background: bool,
    subfragments: Vec<FragmentFlow>,
}

impl FragmentFlow {
    pub(crate) fn new(
        fragment: &Fragment,
        magnitude: f64,
        exchange_value: f64,
        node_weight: f64,
        termination: Arc<Termination>,
        is_conserved: bool,
    ) -> Self {
        Self {
            fragment: fragment.id(),
            name: fragment.name().to_string(),
            flow: fragment.flow().clone(),
            direction: fragment.direction(),
            magnitude,
            exchange_value,
            node_weight,
            termination,
            is_conserved,
            is_background: fragment.is_background(),
            subfragments: Vec::new(),
        }
    }

    /// Visited fragment
    #[inline]
    #[must_use]
    pub fn fragment(&self) -> FragmentId {
        self.fragment
    }

    /// Fragment name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fragment flow
    #[inline]
    #[must_use]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Direction relative to the parent
    #[inline]
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Scaled flow amount
    #[inline]
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// Magnitude signed by direction, inflow positive
    #[inline]
    #[must_use]
    pub fn signed_magnitude(&self) -> f64 {
        self.direction.sign() * self.magnitude
    }

    /// Exchange value used at this node (reciprocal for reference nodes)
    #[inline]
    #[must_use]
    pub fn exchange_value(&self) -> f64 {
        self.exchange_value
    }

    /// Activity level of the termination
    #[inline]
    #[must_use]
    pub fn node_weight(&self) -> f64 {
        self.node_weight
    }

    /// Termination active for this visit
    #[inline]
    #[must_use]
    pub fn termination(&self) -> &Arc<Termination> {
        &self.termination
    }

    /// Whether the exchange value came from balance resolution
    #[inline]
    #[must_use]
    pub fn is_conserved(&self) -> bool {
        self.is_conserved
    }

    /// Whether the record stands for a background fragment
    #[inline]
    #[must_use]
    pub fn is_background(&self) -> bool {
        self.is_background
    }

    /// Aggregated sub-fragment records, per unit node weight
    #[inline]
    #[must_use]
    pub fn subfragments(&self) -> &[FragmentFlow] {
        &self.subfragments
    }

    /// Multiply magnitude and node weight; nested records stay per unit
    pub fn scale(&mut self, factor: f64) {
        self.magnitude *= factor;
        self.node_weight *= factor;
    }

    /// Scaled copy
    #[must_use]
    pub fn scaled(mut self, factor: f64) -> Self {
        self.scale(factor);
        self
    }

    /// Add another record of the same fragment and termination
    ///
    /// Both records must carry the same node weight per unit magnitude.
    pub fn try_add(&mut self, other: &Self) -> Result<(), TraversalError> {
        if self.fragment != other.fragment || *self.termination != *other.termination {
            return Err(TraversalError::IncompatibleRecords {
                left: self.fragment,
                right: other.fragment,
            });
        }
        let lhs = self.node_weight * other.magnitude;
        let rhs = other.node_weight * self.magnitude;
        if !lca_score::within_tolerance(lhs, rhs, RATIO_TOLERANCE, 0.0) {
            return Err(TraversalError::RatioMismatch(self.fragment));
        }
        self.magnitude += other.magnitude;
        self.node_weight += other.node_weight;
        Ok(())
    }

    pub(crate) fn set_subfragments(&mut self, records: Vec<FragmentFlow>) {
        self.subfragments = records;
    }

    /// Take over the identity of `owner`, keeping this record's amounts
    /// and termination.
    pub(crate) fn reattribute(&mut self, owner: &FragmentFlow) {
        self.fragment = owner.fragment;
        self.name.clone_from(&owner.name);
        self.flow = owner.flow.clone();
        self.direction = owner.direction;
        self.exchange_value = owner.exchange_value;
        self.is_background = true;
    }

    /// Serializable summary
    #[must_use]
    pub fn view(&self) -> FragmentFlowView {
        let target = match self.termination.target() {
            TermTarget::Null | TermTarget::Foreground => None,
            TermTarget::Process(process) => Some(process.external_ref().to_string()),
            TermTarget::Subfragment { fragment, .. } | TermTarget::Background(fragment) => Some(fragment.to_string()),
        };
        FragmentFlowView {
            fragment: self.fragment,
            name: self.name.clone(),
            flow: self.flow.external_ref().to_string(),
            direction: self.direction,
            magnitude: self.magnitude,
            exchange_value: self.exchange_value,
            node_weight: self.node_weight,
            termination: self.termination.kind(),
            target,
            is_conserved: self.is_conserved,
            is_background: self.is_background,
            subfragments: self.subfragments.iter().map(Self::view).collect(),
        }
    }
}

/// Flat, serializable form of a [`FragmentFlow`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FragmentFlowView {
    pub fragment: FragmentId,
    pub name: String,
    pub flow: String,
    pub direction: Direction,
    pub magnitude: f64,
    pub exchange_value: f64,
    pub node_weight: f64,
    pub termination: TerminationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub is_conserved: bool,
    pub is_background: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subfragments: Vec<FragmentFlowView>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Traversal;
    use lca_entity::{InMemoryQuantities, Scenario};
    use lca_test_utils::two_node_model;

    fn steel_record() -> FragmentFlow {
        let model = two_node_model();
        let quantities = InMemoryQuantities::new();
        let mut records = Traversal::new(&model.store, &quantities)
            .traverse(model.frame, &Scenario::Default, false)
            .unwrap();
        records.remove(1)
    }

    #[test]
    fn test_scale() {
        let record = steel_record().scaled(0.5);
        assert_eq!(record.magnitude(), 5.0);
        assert_eq!(record.node_weight(), 5.0);
        assert_eq!(record.signed_magnitude(), 5.0);
    }

    #[test]
    fn test_add_same_ratio() {
        let mut record = steel_record();
        let other = record.clone().scaled(2.0);
        record.try_add(&other).unwrap();
        assert_eq!(record.magnitude(), 30.0);
        assert_eq!(record.node_weight(), 30.0);
    }

    #[test]
    fn test_add_rejects_ratio_mismatch() {
        let mut record = steel_record();
        let mut other = record.clone();
        other.node_weight *= 2.0;
        assert_eq!(record.try_add(&other), Err(TraversalError::RatioMismatch(record.fragment())));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let view = steel_record().view();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["nodeWeight"], 10.0);
        assert_eq!(json["termination"], "Null");
        assert!(json.get("target").is_none());
        assert!(json.get("subfragments").is_none());
    }
}
