//! Recursive traversal of fragment trees
//!
//! Each node resolves its exchange value, scales it by the upstream
//! magnitude, and dispatches on its termination. Balance children of a node
//! with a conserved quantity are visited last with the exchange value that
//! closes the node's balance.

use std::sync::Arc;

use im::OrdSet;
use indexmap::IndexMap;
use lca_entity::{BackgroundSolver, Direction, FragmentId, NullBackground, QuantityProvider, QuantityRef, Scenario};
use lca_fragment::{Fragment, FragmentStore, TermTarget, Termination};

use crate::config::TraversalConfig;
use crate::error::TraversalError;
use crate::record::FragmentFlow;

static NULL_BACKGROUND: NullBackground = NullBackground;

/// Reference fragments entered on the current path
type Path = OrdSet<FragmentId>;

/// Scenario context shared by one traversal
#[derive(Debug, Clone, Copy)]
struct Walk<'s> {
    scenario: &'s Scenario,
    observed: bool,
}

/// Records of one visited subtree and its contribution to the parent's
/// conserved quantity
#[derive(Debug)]
struct Visited {
    flows: Vec<FragmentFlow>,
    conserved: Option<f64>,
}

/// What a child reports to its parent
#[derive(Debug)]
enum ChildOutcome {
    Visited(Visited),
    /// Balance child waiting for the parent's remaining stock
    DeferredBalance(FragmentId),
}

/// Traversal engine over one fragment store
pub struct Traversal<'a> {
    store: &'a FragmentStore,
    quantities: &'a dyn QuantityProvider,
    background: &'a dyn BackgroundSolver,
    config: TraversalConfig,
}

impl std::fmt::Debug for Traversal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("fragments", &self.store.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Traversal<'a> {
    /// Traversal with an empty background and default settings
    #[must_use]
    pub fn new(store: &'a FragmentStore, quantities: &'a dyn QuantityProvider) -> Self {
        Self {
            store,
            quantities,
            background: &NULL_BACKGROUND,
            config: TraversalConfig::default(),
        }
    }

    /// With a background solver
    #[must_use]
    pub fn with_background(mut self, background: &'a dyn BackgroundSolver) -> Self {
        self.background = background;
        self
    }

    /// With settings
    #[must_use]
    pub fn with_config(mut self, config: TraversalConfig) -> Self {
        self.config = config;
        self
    }

    /// Traversed store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &'a FragmentStore {
        self.store
    }

    /// Active settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    pub(crate) fn quantities(&self) -> &'a dyn QuantityProvider {
        self.quantities
    }

    pub(crate) fn background(&self) -> &'a dyn BackgroundSolver {
        self.background
    }

    /// Traverse `fragment` for one unit of its reference flow
    ///
    /// The first record is the fragment itself; the rest follow in
    /// depth-first order, children by id, balance children last.
    #[tracing::instrument(level = "debug", skip(self, scenario), fields(scenario = %scenario))]
    pub fn traverse(
        &self,
        fragment: FragmentId,
        scenario: &Scenario,
        observed: bool,
    ) -> Result<Vec<FragmentFlow>, TraversalError> {
        self.run(fragment, scenario, observed, None)
    }

    /// Traverse `fragment` with an explicit exchange value for the top node
    ///
    /// The value is used as given, without the reference reciprocal.
    #[tracing::instrument(level = "debug", skip(self, scenario), fields(scenario = %scenario))]
    pub fn traverse_with_value(
        &self,
        fragment: FragmentId,
        scenario: &Scenario,
        observed: bool,
        reference_value: f64,
    ) -> Result<Vec<FragmentFlow>, TraversalError> {
        self.run(fragment, scenario, observed, Some(reference_value))
    }

    fn run(
        &self,
        fragment: FragmentId,
        scenario: &Scenario,
        observed: bool,
        value: Option<f64>,
    ) -> Result<Vec<FragmentFlow>, TraversalError> {
        if self.config.check_subfragment_cycles {
            self.store.check_acyclic_from(fragment, scenario)?;
        }
        let walk = Walk { scenario, observed };
        let visited = self.visit(fragment, 1.0, walk, &Path::new(), None, value)?;
        tracing::debug!(records = visited.flows.len(), "traversal complete");
        Ok(visited.flows)
    }

    fn visit(
        &self,
        id: FragmentId,
        upstream: f64,
        walk: Walk<'_>,
        path: &Path,
        conserved: Option<&QuantityRef>,
        value: Option<f64>,
    ) -> Result<Visited, TraversalError> {
        let fragment = self.store.get(id)?;
        let termination = Arc::clone(fragment.termination(walk.scenario)?);

        let exchange_value = match value {
            Some(v) => {
                if fragment.is_balance_flow() {
                    fragment.cache_balance_value(walk.scenario, v);
                }
                v
            }
            None => {
                let ev = fragment.exchange_value(walk.scenario, walk.observed)?;
                if fragment.is_reference() {
                    if ev == 0.0 {
                        return Err(TraversalError::ZeroReferenceValue(id));
                    }
                    1.0 / ev
                } else {
                    ev
                }
            }
        };
        let magnitude = upstream * exchange_value;
        let contribution = conserved.map(|q| {
            let amount = exchange_value * self.quantities.cf(fragment.flow(), q);
            amount * fragment.direction().sign()
        });

        if termination.is_null() && self.store.has_children(id) {
            return Err(TraversalError::NullTerminationWithChildren(id));
        }
        let multiplier = termination.node_weight_multiplier(id, fragment.flow(), self.quantities)?;
        let node_weight = magnitude * multiplier;
        let is_conserved = value.is_some() && fragment.is_balance_flow();
        let record = FragmentFlow::new(fragment, magnitude, exchange_value, node_weight, Arc::clone(&termination), is_conserved);
        tracing::trace!(
            fragment = %id.short(),
            magnitude,
            node_weight,
            termination = %termination.kind(),
            "visit"
        );

        if termination.is_null() || fragment.is_background() || self.config.is_zero(magnitude) {
            return Ok(Visited {
                flows: vec![record],
                conserved: contribution,
            });
        }

        let path = if fragment.is_reference() {
            if path.contains(&id) {
                return Err(TraversalError::Cycle(id));
            }
            path.update(id)
        } else {
            path.clone()
        };

        let flows = match termination.target() {
            TermTarget::Null => vec![record],
            TermTarget::Foreground | TermTarget::Process(_) => {
                self.visit_children(fragment, record, multiplier, walk, &path)?
            }
            TermTarget::Subfragment { fragment: sub, descend } => {
                self.visit_subfragment(fragment, record, *sub, *descend, &termination, walk, &path)?
            }
            TermTarget::Background(sub) => self.visit_background(record, *sub, &termination, walk, &path)?,
        };
        Ok(Visited {
            flows,
            conserved: contribution,
        })
    }

    fn visit_child(
        &self,
        id: FragmentId,
        upstream: f64,
        walk: Walk<'_>,
        path: &Path,
        conserved: Option<&QuantityRef>,
    ) -> Result<ChildOutcome, TraversalError> {
        if conserved.is_some() && self.store.get(id)?.is_balance_flow() {
            return Ok(ChildOutcome::DeferredBalance(id));
        }
        self.visit(id, upstream, walk, path, conserved, None)
            .map(ChildOutcome::Visited)
    }

    /// Children of a foreground or process node, balance child last
    fn visit_children(
        &self,
        fragment: &Fragment,
        record: FragmentFlow,
        multiplier: f64,
        walk: Walk<'_>,
        path: &Path,
    ) -> Result<Vec<FragmentFlow>, TraversalError> {
        let id = fragment.id();
        let node_weight = record.node_weight();
        let conserved = fragment.conserved_quantity();

        // stock per unit node weight, inflow positive from this node's side
        let mut stock = conserved.map(|q| {
            let own = if multiplier == 0.0 {
                0.0
            } else {
                self.quantities.cf(fragment.flow(), q) / multiplier
            };
            -own * fragment.direction().sign()
        });

        let mut flows = vec![record];
        let mut deferred = None;
        for child in self.store.children(id) {
            match self.visit_child(child, node_weight, walk, path, conserved)? {
                ChildOutcome::Visited(visited) => {
                    if let (Some(stock), Some(amount)) = (stock.as_mut(), visited.conserved) {
                        *stock += amount;
                    }
                    flows.extend(visited.flows);
                }
                ChildOutcome::DeferredBalance(balance) => {
                    if deferred.replace(balance).is_some() {
                        return Err(TraversalError::MultipleBalanceFlows(id));
                    }
                }
            }
        }

        if let (Some(balance), Some(quantity)) = (deferred, conserved) {
            let stock = stock.unwrap_or(0.0);
            let child = self.store.get(balance)?;
            let cf = self.quantities.cf(child.flow(), quantity);
            if cf == 0.0 {
                return Err(TraversalError::UncharacterizedBalance(balance));
            }
            let value = if self.config.is_zero(stock) {
                0.0
            } else {
                -stock / (cf * child.direction().sign())
            };
            tracing::trace!(parent = %id.short(), balance = %balance.short(), stock, value, "balance resolved");
            let visited = self.visit(balance, node_weight, walk, path, None, Some(value))?;
            flows.extend(visited.flows);
        }
        Ok(flows)
    }

    /// Sub-fragment node: traverse the target, net its boundary flows and
    /// hand them to this node's children
    #[allow(clippy::too_many_arguments)]
    fn visit_subfragment(
        &self,
        fragment: &Fragment,
        mut record: FragmentFlow,
        sub: FragmentId,
        descend: bool,
        termination: &Termination,
        walk: Walk<'_>,
        path: &Path,
    ) -> Result<Vec<FragmentFlow>, TraversalError> {
        let target = self.store.get(sub)?;
        let visited = self.visit(sub, termination.inbound_ev(), walk, path, None, None)?;
        let mut records = visited.flows.into_iter();
        let Some(reference) = records.next() else {
            return Ok(vec![record]);
        };
        let (mut io, mut internal): (Vec<_>, Vec<_>) = records.partition(|r| r.termination().is_null());
        let delivered_raw = reference.magnitude();
        if !reference.termination().is_null() {
            internal.insert(0, reference);
        }

        // autoconsumption: boundary flows of the term flow itself
        let term_flow = termination.term_flow();
        let auto: f64 = io
            .iter()
            .filter(|r| r.flow() == term_flow)
            .map(FragmentFlow::signed_magnitude)
            .sum();
        io.retain(|r| r.flow() != term_flow);
        let delivered = match target.direction() {
            Direction::Output => delivered_raw - auto,
            Direction::Input => delivered_raw + auto,
        };
        if self.config.is_zero(delivered) {
            return Err(TraversalError::ZeroSubfragmentOutput(sub));
        }
        let per_unit = 1.0 / (delivered / termination.inbound_ev()).abs();
        let downstream = record.node_weight() * per_unit;

        let mut flows = Vec::new();
        if descend {
            flows.push(record);
            flows.extend(internal.into_iter().map(|r| r.scaled(downstream)));
        } else {
            record.set_subfragments(internal.into_iter().map(|r| r.scaled(per_unit)).collect());
            flows.push(record);
        }

        let mut nets: IndexMap<&str, f64> = IndexMap::new();
        for r in &io {
            *nets.entry(r.flow().external_ref()).or_insert(0.0) += r.signed_magnitude();
        }
        let mut matched = Vec::new();
        for child_id in self.store.children(fragment.id()) {
            let child = self.store.get(child_id)?;
            let net = nets.get(child.flow().external_ref()).copied().unwrap_or(0.0);
            let net = if self.config.is_zero(net) { 0.0 } else { net };
            matched.push(child.flow().external_ref());
            let visited = self.visit(child_id, downstream, walk, path, None, Some(net * child.direction().sign()))?;
            flows.extend(visited.flows);
        }
        flows.extend(
            io.into_iter()
                .filter(|r| !matched.contains(&r.flow().external_ref()) && !self.config.is_zero(r.magnitude()))
                .map(|r| r.scaled(downstream)),
        );
        Ok(flows)
    }

    /// Background node: the target's reference record, scaled and
    /// attributed to this node
    fn visit_background(
        &self,
        record: FragmentFlow,
        sub: FragmentId,
        termination: &Termination,
        walk: Walk<'_>,
        path: &Path,
    ) -> Result<Vec<FragmentFlow>, TraversalError> {
        let visited = self.visit(sub, termination.inbound_ev(), walk, path, None, None)?;
        let Some(reference) = visited.flows.into_iter().next() else {
            return Ok(vec![record]);
        };
        if self.config.is_zero(reference.magnitude()) {
            return Err(TraversalError::ZeroSubfragmentOutput(sub));
        }
        let downstream = record.node_weight() * termination.inbound_ev() / reference.magnitude().abs();
        let mut delegated = reference.scaled(downstream);
        delegated.reattribute(&record);
        Ok(vec![delegated])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lca_entity::{InMemoryQuantities, ScenarioKey, TerminationKey};
    use lca_fragment::{FragmentError, TerminationSpec};
    use lca_test_utils::{balance_model, child, foreground_model, two_node_model};

    fn magnitudes(records: &[FragmentFlow]) -> Vec<f64> {
        records.iter().map(FragmentFlow::magnitude).collect()
    }

    #[test]
    fn test_two_node_model() {
        let model = two_node_model();
        let quantities = InMemoryQuantities::new();
        let records = Traversal::new(&model.store, &quantities)
            .traverse(model.frame, &Scenario::Default, false)
            .unwrap();
        assert_eq!(magnitudes(&records), vec![1.0, 10.0]);
        assert_eq!(records[1].fragment(), model.steel);
        assert!(records[1].termination().is_null());
    }

    #[test]
    fn test_reference_is_reciprocal() {
        let mut model = two_node_model();
        model.store.reset_cached_value(model.frame, 2.0).unwrap();
        let quantities = InMemoryQuantities::new();
        let records = Traversal::new(&model.store, &quantities)
            .traverse(model.frame, &Scenario::Default, false)
            .unwrap();
        assert_eq!(records[0].exchange_value(), 0.5);
        assert_eq!(magnitudes(&records), vec![0.5, 5.0]);
    }

    #[test]
    fn test_explicit_reference_value() {
        let model = two_node_model();
        let quantities = InMemoryQuantities::new();
        let records = Traversal::new(&model.store, &quantities)
            .traverse_with_value(model.frame, &Scenario::Default, false, 3.0)
            .unwrap();
        assert_eq!(magnitudes(&records), vec![3.0, 30.0]);
    }

    #[test]
    fn test_balance_closes_mass() {
        let model = balance_model();
        let quantities = InMemoryQuantities::new();
        let records = Traversal::new(&model.store, &quantities)
            .traverse(model.frame, &Scenario::Default, false)
            .unwrap();
        let offcut = records.last().unwrap();
        assert_eq!(offcut.fragment(), model.offcut);
        assert_eq!(offcut.magnitude(), -3.0);
        assert!(offcut.is_conserved());
        let stored = model.store.get(model.offcut).unwrap();
        assert_eq!(stored.balance_value(&ScenarioKey::Observed), Some(-3.0));
    }

    #[test]
    fn test_balance_value_cached_per_named_scenario() {
        let mut model = balance_model();
        model
            .store
            .set_exchange_value(model.scrap, ScenarioKey::named("lean"), 2.0)
            .unwrap();
        let quantities = InMemoryQuantities::new();
        let records = Traversal::new(&model.store, &quantities)
            .traverse(model.frame, &Scenario::named("lean"), false)
            .unwrap();
        assert_eq!(records.last().unwrap().magnitude(), -1.0);
        let stored = model.store.get(model.offcut).unwrap();
        assert_eq!(stored.balance_value(&ScenarioKey::named("lean")), Some(-1.0));
    }

    #[test]
    fn test_null_termination_with_children() {
        let mut store = FragmentStore::new();
        let frame = foreground_model(&mut store, "frame");
        let steel = child(&mut store, frame, "steel", Direction::Input, 10.0);
        child(&mut store, steel, "ore", Direction::Input, 2.0);
        let quantities = InMemoryQuantities::new();
        let err = Traversal::new(&store, &quantities)
            .traverse(frame, &Scenario::Default, false)
            .unwrap_err();
        assert_eq!(err, TraversalError::NullTerminationWithChildren(steel));
        assert!(err.is_topology());
    }

    #[test]
    fn test_zero_reference_value() {
        let mut model = two_node_model();
        model.store.reset_cached_value(model.frame, 0.0).unwrap();
        let quantities = InMemoryQuantities::new();
        let err = Traversal::new(&model.store, &quantities)
            .traverse(model.frame, &Scenario::Default, false)
            .unwrap_err();
        assert_eq!(err, TraversalError::ZeroReferenceValue(model.frame));
    }

    #[test]
    fn test_cycle_detection() {
        let mut store = FragmentStore::new();
        let frame = foreground_model(&mut store, "frame");
        let steel = foreground_model(&mut store, "steel");
        let uses_steel = child(&mut store, frame, "steel", Direction::Input, 1.0);
        let uses_frame = child(&mut store, steel, "frame", Direction::Input, 1.0);
        store
            .terminate(uses_steel, TerminationKey::Default, TerminationSpec::fragment(steel))
            .unwrap();
        store
            .terminate(uses_frame, TerminationKey::Default, TerminationSpec::fragment(frame))
            .unwrap();
        let quantities = InMemoryQuantities::new();

        let err = Traversal::new(&store, &quantities)
            .traverse(frame, &Scenario::Default, false)
            .unwrap_err();
        assert!(matches!(err, TraversalError::Fragment(FragmentError::SubfragmentCycle(_))));

        let unchecked = TraversalConfig::default().with_cycle_check(false);
        let err = Traversal::new(&store, &quantities)
            .with_config(unchecked)
            .traverse(frame, &Scenario::Default, false)
            .unwrap_err();
        assert_eq!(err, TraversalError::Cycle(frame));
    }

    /// `frame` uses `steel`; `steel` uses `frame` only under `loop`
    fn scenario_loop() -> (FragmentStore, FragmentId) {
        let mut store = FragmentStore::new();
        let frame = foreground_model(&mut store, "frame");
        let steel = foreground_model(&mut store, "steel");
        let uses_steel = child(&mut store, frame, "steel", Direction::Input, 1.0);
        let uses_frame = child(&mut store, steel, "frame", Direction::Input, 1.0);
        store
            .terminate(uses_steel, TerminationKey::Default, TerminationSpec::fragment(steel))
            .unwrap();
        store
            .terminate(uses_frame, TerminationKey::named("loop"), TerminationSpec::fragment(frame))
            .unwrap();
        (store, frame)
    }

    #[test]
    fn test_named_scenario_cycle_leaves_default_alone() {
        let (store, frame) = scenario_loop();
        let quantities = InMemoryQuantities::new();
        let traversal = Traversal::new(&store, &quantities);

        let records = traversal.traverse(frame, &Scenario::Default, false).unwrap();
        assert_eq!(records[0].fragment(), frame);

        let err = traversal.traverse(frame, &Scenario::named("loop"), false).unwrap_err();
        assert!(matches!(err, TraversalError::Fragment(FragmentError::SubfragmentCycle(_))));
    }

    #[test]
    fn test_unrelated_cycle_leaves_traversal_alone() {
        let (mut store, _) = scenario_loop();
        let bike = foreground_model(&mut store, "bike");
        child(&mut store, bike, "wheel", Direction::Input, 2.0);
        let quantities = InMemoryQuantities::new();
        let traversal = Traversal::new(&store, &quantities);

        let records = traversal.traverse(bike, &Scenario::named("loop"), false).unwrap();
        assert_eq!(magnitudes(&records), vec![1.0, 2.0]);
        assert!(store.check_acyclic().is_err());
    }

    #[test]
    fn test_zero_magnitude_stops_descent() {
        let mut store = FragmentStore::new();
        let frame = foreground_model(&mut store, "frame");
        let steel = child(&mut store, frame, "steel", Direction::Input, 0.0);
        store
            .terminate(steel, TerminationKey::Default, TerminationSpec::foreground())
            .unwrap();
        child(&mut store, steel, "ore", Direction::Input, 2.0);
        let quantities = InMemoryQuantities::new();
        let records = Traversal::new(&store, &quantities)
            .traverse(frame, &Scenario::Default, false)
            .unwrap();
        assert_eq!(records.len(), 2);
    }
}
