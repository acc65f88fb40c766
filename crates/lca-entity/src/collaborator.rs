//! Collaborator traits
//!
//! The fragment engine never looks up characterization factors, solves
//! background matrices or fetches entities itself. It consumes them through
//! the narrow traits in this module.

use serde::{Deserialize, Serialize};

use crate::flow::{Direction, Flow, ProcessRef, QuantityRef};
use crate::id::FragmentId;

/// One exchange reported by a [`BackgroundSolver`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    /// Process the exchange belongs to
    pub process: ProcessRef,
    /// Exchanged flow
    pub flow: Flow,
    /// Direction relative to the process
    pub direction: Direction,
    /// Process supplying or consuming the flow, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination: Option<ProcessRef>,
    /// Amount per unit activity of the process
    pub value: f64,
}

impl ExchangeRecord {
    /// Exchange with no termination (elementary or cutoff)
    #[must_use]
    pub fn cutoff(process: ProcessRef, flow: Flow, direction: Direction, value: f64) -> Self {
        Self {
            process,
            flow,
            direction,
            termination: None,
            value,
        }
    }

    /// Exchange supplied or consumed by another process
    #[must_use]
    pub fn terminated(
        process: ProcessRef,
        flow: Flow,
        direction: Direction,
        termination: ProcessRef,
        value: f64,
    ) -> Self {
        Self {
            process,
            flow,
            direction,
            termination: Some(termination),
            value,
        }
    }
}

/// Characterization factors and unit conversions
pub trait QuantityProvider {
    /// Raw factor lookup for `flow` in `quantity`
    fn characterization_factor(&self, flow: &Flow, quantity: &QuantityRef) -> Option<f64>;

    /// Raw conversion factor from `flow`'s reference quantity into `quantity`
    fn unit_conversion(&self, flow: &Flow, quantity: &QuantityRef) -> Option<f64>;

    /// Factor with the identity rule applied: a flow's own reference quantity
    /// is 1, a missing factor is 0.
    fn cf(&self, flow: &Flow, quantity: &QuantityRef) -> f64 {
        if flow.reference_quantity() == quantity {
            1.0
        } else {
            self.characterization_factor(flow, quantity).unwrap_or(0.0)
        }
    }

    /// Conversion with the identity rule applied. `None` blocks traversal.
    fn convert(&self, flow: &Flow, quantity: &QuantityRef) -> Option<f64> {
        if flow.reference_quantity() == quantity {
            Some(1.0)
        } else {
            self.unit_conversion(flow, quantity)
        }
    }
}

/// Access to the foreground/background inventory model
pub trait BackgroundSolver {
    /// Whether `process` belongs to the background database
    fn is_in_background(&self, process: &ProcessRef) -> bool;

    /// Exchanges of `process` terminated to other background processes
    fn dependencies(&self, process: &ProcessRef) -> Vec<ExchangeRecord>;

    /// Direct elementary exchanges of `process`
    fn emissions(&self, process: &ProcessRef) -> Vec<ExchangeRecord>;

    /// Aggregated life-cycle inventory of `process`
    fn lci(&self, process: &ProcessRef) -> Vec<ExchangeRecord>;

    /// All exchanges of a foreground `process`, reference included
    fn foreground(&self, process: &ProcessRef) -> Vec<ExchangeRecord>;
}

/// Background solver with an empty database
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackground;

impl BackgroundSolver for NullBackground {
    fn is_in_background(&self, _process: &ProcessRef) -> bool {
        false
    }

    fn dependencies(&self, _process: &ProcessRef) -> Vec<ExchangeRecord> {
        Vec::new()
    }

    fn emissions(&self, _process: &ProcessRef) -> Vec<ExchangeRecord> {
        Vec::new()
    }

    fn lci(&self, _process: &ProcessRef) -> Vec<ExchangeRecord> {
        Vec::new()
    }

    fn foreground(&self, _process: &ProcessRef) -> Vec<ExchangeRecord> {
        Vec::new()
    }
}

/// Kind of entity requested from an [`EntityResolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A process
    Process,
    /// A flow
    Flow,
    /// A quantity
    Quantity,
    /// A fragment alias
    Fragment,
}

/// Entity returned by an [`EntityResolver`]
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// Process reference
    Process(ProcessRef),
    /// Flow reference
    Flow(Flow),
    /// Quantity reference
    Quantity(QuantityRef),
    /// Fragment known under an alias
    Fragment(FragmentId),
}

impl Entity {
    /// Kind of this entity
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Process(_) => EntityKind::Process,
            Self::Flow(_) => EntityKind::Flow,
            Self::Quantity(_) => EntityKind::Quantity,
            Self::Fragment(_) => EntityKind::Fragment,
        }
    }
}

/// Lookup of entities by external reference
pub trait EntityResolver {
    /// Resolve `external_ref` as an entity of `kind`
    fn resolve(&self, external_ref: &str, kind: EntityKind) -> Option<Entity>;

    /// Resolve a flow
    fn flow(&self, external_ref: &str) -> Option<Flow> {
        match self.resolve(external_ref, EntityKind::Flow) {
            Some(Entity::Flow(flow)) => Some(flow),
            _ => None,
        }
    }

    /// Resolve a process
    fn process(&self, external_ref: &str) -> Option<ProcessRef> {
        match self.resolve(external_ref, EntityKind::Process) {
            Some(Entity::Process(process)) => Some(process),
            _ => None,
        }
    }

    /// Resolve a quantity
    fn quantity(&self, external_ref: &str) -> Option<QuantityRef> {
        match self.resolve(external_ref, EntityKind::Quantity) {
            Some(Entity::Quantity(quantity)) => Some(quantity),
            _ => None,
        }
    }
}
