//! Boundary flows and record aggregation

use indexmap::IndexMap;
use lca_entity::{Direction, Flow, FragmentId};
use serde::Serialize;

use crate::error::TraversalError;
use crate::record::FragmentFlow;

/// Net flow across a model boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoFlow {
    /// Flow crossing the boundary
    pub flow: Flow,
    /// Net direction, relative to the model
    pub direction: Direction,
    /// Non-negative net amount
    pub magnitude: f64,
}

impl IoFlow {
    /// Magnitude signed by direction, inflow positive
    #[inline]
    #[must_use]
    pub fn signed(&self) -> f64 {
        self.direction.sign() * self.magnitude
    }
}

/// Net the records per flow, dropping nets below `threshold`
///
/// Output order follows the first appearance of each flow.
pub fn group_io<'a, I>(records: I, threshold: f64) -> Vec<IoFlow>
where
    I: IntoIterator<Item = &'a FragmentFlow>,
{
    let mut nets: IndexMap<&str, (&Flow, f64)> = IndexMap::new();
    for record in records {
        let entry = nets
            .entry(record.flow().external_ref())
            .or_insert((record.flow(), 0.0));
        entry.1 += record.signed_magnitude();
    }
    nets.into_values()
        .filter(|(_, net)| net.abs() >= threshold)
        .map(|(flow, net)| IoFlow {
            flow: flow.clone(),
            direction: Direction::from_signed(net),
            magnitude: net.abs(),
        })
        .collect()
}

/// Merge records of the same fragment and termination
///
/// Records keep the order in which their fragment first appears.
pub fn aggregate_flows(records: &[FragmentFlow]) -> Result<Vec<FragmentFlow>, TraversalError> {
    let mut buckets: IndexMap<FragmentId, Vec<FragmentFlow>> = IndexMap::new();
    for record in records {
        let bucket = buckets.entry(record.fragment()).or_default();
        match bucket
            .iter_mut()
            .find(|existing| **existing.termination() == **record.termination())
        {
            Some(existing) => existing.try_add(record)?,
            None => bucket.push(record.clone()),
        }
    }
    Ok(buckets.into_values().flatten().collect())
}
