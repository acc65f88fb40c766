//! Fragment nodes and their scenario resolution

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lca_entity::{Direction, EntityError, Flow, FragmentId, QuantityRef, Scenario, ScenarioKey, TerminationKey};
use parking_lot::RwLock;

use crate::termination::Termination;

/// Creation request for [`crate::FragmentStore::create`]
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpec {
    /// Observed flow
    pub flow: Flow,
    /// Direction relative to the parent
    pub direction: Direction,
    /// Parent fragment; `None` creates a reference fragment
    pub parent: Option<FragmentId>,
    /// Cached exchange value
    pub value: f64,
    /// Compute the magnitude by conservation
    pub balance: bool,
    /// Stop traversal here and delegate scoring to the background
    pub background: bool,
    /// Display name; defaults to the flow's name
    pub name: Option<String>,
    /// Free-form stage tag
    pub stage: String,
    /// Explicit id; a fresh one is generated otherwise
    pub id: Option<FragmentId>,
}

impl FragmentSpec {
    /// Reference fragment with a cached value of 1
    #[must_use]
    pub fn new(flow: Flow, direction: Direction) -> Self {
        Self {
            flow,
            direction,
            parent: None,
            value: 1.0,
            balance: false,
            background: false,
            name: None,
            stage: String::new(),
            id: None,
        }
    }

    /// Attach under `parent`
    #[must_use]
    pub fn child_of(mut self, parent: FragmentId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// With a cached exchange value
    #[must_use]
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    /// As the parent's balance flow
    #[must_use]
    pub fn balance(mut self) -> Self {
        self.balance = true;
        self
    }

    /// As a background fragment
    #[must_use]
    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// With a display name
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// With a stage tag
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    /// With an explicit id
    #[must_use]
    pub fn with_id(mut self, id: FragmentId) -> Self {
        self.id = Some(id);
        self
    }
}

/// A node of a fragment tree
#[derive(Debug)]
pub struct Fragment {
    id: FragmentId,
    name: String,
    stage: String,
    flow: Flow,
    direction: Direction,
    parent: Option<FragmentId>,
    exchange_values: BTreeMap<ScenarioKey, f64>,
    balance_values: RwLock<BTreeMap<ScenarioKey, f64>>,
    is_balance_flow: bool,
    is_background: bool,
    conserved_quantity: Option<QuantityRef>,
    terminations: BTreeMap<TerminationKey, Arc<Termination>>,
}

impl Fragment {
    pub(crate) fn from_spec(spec: FragmentSpec) -> Self {
        let mut exchange_values = BTreeMap::new();
        exchange_values.insert(ScenarioKey::Cached, spec.value);
        let mut terminations = BTreeMap::new();
        terminations.insert(TerminationKey::Default, Termination::null(&spec.flow, spec.direction));
        Self {
            id: spec.id.unwrap_or_default(),
            name: spec.name.unwrap_or_else(|| spec.flow.name().to_string()),
            stage: spec.stage,
            flow: spec.flow,
            direction: spec.direction,
            parent: spec.parent,
            exchange_values,
            balance_values: RwLock::new(BTreeMap::new()),
            is_balance_flow: spec.balance,
            is_background: spec.background,
            conserved_quantity: None,
            terminations,
        }
    }

    /// Identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage tag
    #[inline]
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Observed flow
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

    /// Parent fragment
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<FragmentId> {
        self.parent
    }

    /// Whether this fragment is a tree root
    #[inline]
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether the magnitude is computed by conservation
    #[inline]
    #[must_use]
    pub fn is_balance_flow(&self) -> bool {
        self.is_balance_flow
    }

    /// Whether traversal stops here
    #[inline]
    #[must_use]
    pub fn is_background(&self) -> bool {
        self.is_background
    }

    /// Quantity conserved across this fragment's children
    #[inline]
    #[must_use]
    pub fn conserved_quantity(&self) -> Option<&QuantityRef> {
        self.conserved_quantity.as_ref()
    }

    /// Value fixed at construction
    #[must_use]
    pub fn cached_value(&self) -> f64 {
        self.exchange_values.get(&ScenarioKey::Cached).copied().unwrap_or(1.0)
    }

    /// Stored exchange values
    pub fn exchange_values(&self) -> impl Iterator<Item = (&ScenarioKey, f64)> {
        self.exchange_values.iter().map(|(k, v)| (k, *v))
    }

    /// Stored value under exactly `key`
    #[must_use]
    pub fn stored_value(&self, key: &ScenarioKey) -> Option<f64> {
        self.exchange_values.get(key).copied()
    }

    /// Value computed for this balance flow by the last traversal under `key`
    #[must_use]
    pub fn balance_value(&self, key: &ScenarioKey) -> Option<f64> {
        self.balance_values.read().get(key).copied()
    }

    fn value_for(&self, key: &ScenarioKey) -> Option<f64> {
        self.balance_value(key).or_else(|| self.stored_value(key))
    }

    /// Resolve the exchange value for a scenario context.
    ///
    /// An exact scenario key wins. Otherwise the observed value is used when
    /// asked for (or for balance flows), falling back to the cached value. A
    /// zero on a reference fragment falls back to the cached value.
    pub fn exchange_value(&self, scenario: &Scenario, observed: bool) -> Result<f64, EntityError> {
        let cached = self.cached_value();
        let balance = self.balance_values.read();
        let names = self
            .exchange_values
            .keys()
            .chain(balance.keys())
            .filter_map(ScenarioKey::name)
            .collect::<BTreeSet<_>>();
        let exact = scenario.select(names)?.map(ScenarioKey::named);
        drop(balance);

        let value = match exact.and_then(|key| self.value_for(&key)) {
            Some(v) => v,
            None if observed || self.is_balance_flow => self.value_for(&ScenarioKey::Observed).unwrap_or(cached),
            None => cached,
        };
        if value == 0.0 && self.is_reference() {
            return Ok(cached);
        }
        Ok(value)
    }

    /// Record a traversal-computed value for this balance flow.
    ///
    /// Named scenarios store under their name; the default context and
    /// multi-candidate contexts store under the observed key.
    pub fn cache_balance_value(&self, scenario: &Scenario, value: f64) {
        let key = match scenario {
            Scenario::Named(name) => ScenarioKey::named(name.clone()),
            Scenario::Default | Scenario::Candidates(_) => ScenarioKey::Observed,
        };
        self.balance_values.write().insert(key, value);
    }

    /// Termination for a scenario context: the single matching named key,
    /// else the default
    pub fn termination(&self, scenario: &Scenario) -> Result<&Arc<Termination>, EntityError> {
        let names = self.terminations.keys().filter_map(TerminationKey::name);
        if let Some(name) = scenario.select(names)? {
            if let Some(t) = self.terminations.get(&TerminationKey::named(name)) {
                return Ok(t);
            }
        }
        Ok(&self.terminations[&TerminationKey::Default])
    }

    /// Termination stored under exactly `key`
    #[must_use]
    pub fn termination_for_key(&self, key: &TerminationKey) -> Option<&Arc<Termination>> {
        self.terminations.get(key)
    }

    /// Every stored termination
    pub fn terminations(&self) -> impl Iterator<Item = (&TerminationKey, &Arc<Termination>)> {
        self.terminations.iter()
    }

    /// Scenario names across exchange values and terminations
    #[must_use]
    pub fn scenarios(&self) -> BTreeSet<String> {
        self.exchange_values
            .keys()
            .filter_map(ScenarioKey::name)
            .chain(self.terminations.keys().filter_map(TerminationKey::name))
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn set_value(&mut self, key: ScenarioKey, value: f64) {
        self.exchange_values.insert(key, value);
    }

    pub(crate) fn set_termination(&mut self, key: TerminationKey, termination: Arc<Termination>) {
        self.terminations.insert(key, termination);
    }

    pub(crate) fn remove_termination(&mut self, key: &TerminationKey) -> Option<Arc<Termination>> {
        if *key == TerminationKey::Default {
            let old = self.terminations.insert(TerminationKey::Default, Termination::null(&self.flow, self.direction));
            return old;
        }
        self.terminations.remove(key)
    }

    pub(crate) fn set_balance_flag(&mut self, balance: bool) {
        self.is_balance_flow = balance;
        if !balance {
            self.balance_values.write().clear();
        }
    }

    pub(crate) fn set_conserved_quantity(&mut self, quantity: Option<QuantityRef>) {
        self.conserved_quantity = quantity;
    }
}
