//! In-memory collaborators
//!
//! Map-backed implementations of the collaborator traits, used by the CLI
//! when it loads a self-contained model file and by the test suites.

use std::collections::{HashMap, HashSet};

use crate::collaborator::{BackgroundSolver, Entity, EntityKind, EntityResolver, ExchangeRecord, QuantityProvider};
use crate::flow::{Direction, Flow, ProcessRef, QuantityRef};
use crate::id::FragmentId;

/// Factor tables keyed by (flow ref, quantity ref)
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuantities {
    factors: HashMap<(String, String), f64>,
    conversions: HashMap<(String, String), f64>,
}

impl InMemoryQuantities {
    /// Empty tables
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a characterization factor
    #[must_use]
    pub fn with_factor(mut self, flow: &Flow, quantity: &QuantityRef, value: f64) -> Self {
        self.set_factor(flow, quantity, value);
        self
    }

    /// With a unit conversion from the flow's reference quantity
    #[must_use]
    pub fn with_conversion(mut self, flow: &Flow, quantity: &QuantityRef, value: f64) -> Self {
        self.set_conversion(flow, quantity, value);
        self
    }

    /// Set a characterization factor
    pub fn set_factor(&mut self, flow: &Flow, quantity: &QuantityRef, value: f64) {
        self.factors
            .insert((flow.external_ref().to_string(), quantity.external_ref().to_string()), value);
    }

    /// Set a unit conversion
    pub fn set_conversion(&mut self, flow: &Flow, quantity: &QuantityRef, value: f64) {
        self.conversions
            .insert((flow.external_ref().to_string(), quantity.external_ref().to_string()), value);
    }

    /// Number of stored factors
    #[inline]
    #[must_use]
    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }
}

impl QuantityProvider for InMemoryQuantities {
    fn characterization_factor(&self, flow: &Flow, quantity: &QuantityRef) -> Option<f64> {
        self.factors
            .get(&(flow.external_ref().to_string(), quantity.external_ref().to_string()))
            .copied()
    }

    fn unit_conversion(&self, flow: &Flow, quantity: &QuantityRef) -> Option<f64> {
        self.conversions
            .get(&(flow.external_ref().to_string(), quantity.external_ref().to_string()))
            .copied()
    }
}

#[derive(Debug, Clone, Default)]
struct Inventory {
    dependencies: Vec<ExchangeRecord>,
    emissions: Vec<ExchangeRecord>,
    lci: Vec<ExchangeRecord>,
    foreground: Vec<ExchangeRecord>,
}

/// Process inventories held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackground {
    background: HashSet<String>,
    inventories: HashMap<String, Inventory>,
}

impl InMemoryBackground {
    /// Empty database
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `process` as belonging to the background
    #[must_use]
    pub fn with_background(mut self, process: &ProcessRef) -> Self {
        self.background.insert(process.external_ref().to_string());
        self
    }

    /// Add a dependency exchange terminated to `supplier`
    #[must_use]
    pub fn with_dependency(
        mut self,
        process: &ProcessRef,
        flow: &Flow,
        direction: Direction,
        supplier: &ProcessRef,
        value: f64,
    ) -> Self {
        let record = ExchangeRecord::terminated(process.clone(), flow.clone(), direction, supplier.clone(), value);
        self.inventory(process).dependencies.push(record);
        self
    }

    /// Add a direct elementary exchange
    #[must_use]
    pub fn with_emission(mut self, process: &ProcessRef, flow: &Flow, direction: Direction, value: f64) -> Self {
        let record = ExchangeRecord::cutoff(process.clone(), flow.clone(), direction, value);
        self.inventory(process).emissions.push(record);
        self
    }

    /// Add an aggregated inventory exchange
    #[must_use]
    pub fn with_lci(mut self, process: &ProcessRef, flow: &Flow, direction: Direction, value: f64) -> Self {
        let record = ExchangeRecord::cutoff(process.clone(), flow.clone(), direction, value);
        self.inventory(process).lci.push(record);
        self
    }

    /// Add a foreground exchange
    #[must_use]
    pub fn with_foreground(
        mut self,
        process: &ProcessRef,
        flow: &Flow,
        direction: Direction,
        termination: Option<&ProcessRef>,
        value: f64,
    ) -> Self {
        let record = ExchangeRecord {
            process: process.clone(),
            flow: flow.clone(),
            direction,
            termination: termination.cloned(),
            value,
        };
        self.inventory(process).foreground.push(record);
        self
    }

    /// Insert an already-built record into the named table
    pub fn push(&mut self, table: InventoryTable, record: ExchangeRecord) {
        let inventory = self.inventory(&record.process);
        match table {
            InventoryTable::Dependencies => inventory.dependencies.push(record),
            InventoryTable::Emissions => inventory.emissions.push(record),
            InventoryTable::Lci => inventory.lci.push(record),
            InventoryTable::Foreground => inventory.foreground.push(record),
        }
    }

    /// Mark `process` as background in place
    pub fn mark_background(&mut self, process: &ProcessRef) {
        self.background.insert(process.external_ref().to_string());
    }

    fn inventory(&mut self, process: &ProcessRef) -> &mut Inventory {
        self.inventories.entry(process.external_ref().to_string()).or_default()
    }

    fn table(&self, process: &ProcessRef, pick: fn(&Inventory) -> &Vec<ExchangeRecord>) -> Vec<ExchangeRecord> {
        self.inventories
            .get(process.external_ref())
            .map(|inv| pick(inv).clone())
            .unwrap_or_default()
    }
}

/// Which inventory table a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryTable {
    /// Background dependencies
    Dependencies,
    /// Direct emissions
    Emissions,
    /// Aggregated inventory
    Lci,
    /// Foreground exchanges
    Foreground,
}

impl BackgroundSolver for InMemoryBackground {
    fn is_in_background(&self, process: &ProcessRef) -> bool {
        self.background.contains(process.external_ref())
    }

    fn dependencies(&self, process: &ProcessRef) -> Vec<ExchangeRecord> {
        self.table(process, |inv| &inv.dependencies)
    }

    fn emissions(&self, process: &ProcessRef) -> Vec<ExchangeRecord> {
        self.table(process, |inv| &inv.emissions)
    }

    fn lci(&self, process: &ProcessRef) -> Vec<ExchangeRecord> {
        self.table(process, |inv| &inv.lci)
    }

    fn foreground(&self, process: &ProcessRef) -> Vec<ExchangeRecord> {
        self.table(process, |inv| &inv.foreground)
    }
}

/// Entity catalog keyed by external reference
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    flows: HashMap<String, Flow>,
    processes: HashMap<String, ProcessRef>,
    quantities: HashMap<String, QuantityRef>,
    fragments: HashMap<String, FragmentId>,
}

impl Catalog {
    /// Empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow (and its reference quantity)
    pub fn add_flow(&mut self, flow: Flow) {
        self.add_quantity(flow.reference_quantity().clone());
        self.flows.insert(flow.external_ref().to_string(), flow);
    }

    /// Register a process
    pub fn add_process(&mut self, process: ProcessRef) {
        self.processes.insert(process.external_ref().to_string(), process);
    }

    /// Register a quantity
    pub fn add_quantity(&mut self, quantity: QuantityRef) {
        self.quantities
            .entry(quantity.external_ref().to_string())
            .or_insert(quantity);
    }

    /// Register a fragment alias
    pub fn add_fragment_alias(&mut self, alias: impl Into<String>, id: FragmentId) {
        self.fragments.insert(alias.into(), id);
    }

    /// Builder form of [`Catalog::add_flow`]
    #[must_use]
    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.add_flow(flow);
        self
    }

    /// Builder form of [`Catalog::add_process`]
    #[must_use]
    pub fn with_process(mut self, process: ProcessRef) -> Self {
        self.add_process(process);
        self
    }

    /// All registered quantities
    pub fn quantities(&self) -> impl Iterator<Item = &QuantityRef> {
        self.quantities.values()
    }
}

impl EntityResolver for Catalog {
    fn resolve(&self, external_ref: &str, kind: EntityKind) -> Option<Entity> {
        let found = match kind {
            EntityKind::Flow => self.flows.get(external_ref).cloned().map(Entity::Flow),
            EntityKind::Process => self.processes.get(external_ref).cloned().map(Entity::Process),
            EntityKind::Quantity => self.quantities.get(external_ref).cloned().map(Entity::Quantity),
            EntityKind::Fragment => self.fragments.get(external_ref).copied().map(Entity::Fragment),
        };
        if found.is_none() {
            tracing::trace!(external_ref, ?kind, "catalog miss");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mass() -> QuantityRef {
        QuantityRef::new("mass", "Mass", "kg")
    }

    #[test]
    fn factors_are_keyed_by_reference() {
        let gwp = QuantityRef::new("gwp", "GWP", "kg CO2 eq");
        let co2 = Flow::new("co2", "CO2", mass());
        let q = InMemoryQuantities::new().with_factor(&co2, &gwp, 1.0);
        let renamed = Flow::new("co2", "carbon dioxide", mass());
        assert_eq!(q.cf(&renamed, &gwp), 1.0);
        assert_eq!(q.factor_count(), 1);
    }

    #[test]
    fn background_tables_are_separate() {
        let p = ProcessRef::new("grid", "Grid");
        let co2 = Flow::new("co2", "CO2", mass());
        let bg = InMemoryBackground::new()
            .with_background(&p)
            .with_emission(&p, &co2, Direction::Output, 0.5)
            .with_lci(&p, &co2, Direction::Output, 0.7);
        assert!(bg.is_in_background(&p));
        assert_eq!(bg.emissions(&p)[0].value, 0.5);
        assert_eq!(bg.lci(&p)[0].value, 0.7);
        assert!(bg.dependencies(&p).is_empty());
    }

    #[test]
    fn catalog_resolves_by_kind() {
        let steel = Flow::new("steel", "Steel", mass());
        let catalog = Catalog::new().with_flow(steel.clone());
        assert_eq!(catalog.flow("steel"), Some(steel));
        assert_eq!(catalog.quantity("mass"), Some(mass()));
        assert!(catalog.process("steel").is_none());
    }
}
