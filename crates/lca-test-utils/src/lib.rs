//! Testing utilities for the fragment LCA workspace
//!
//! Shared quantities, flows, and small fragment models.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use lca_entity::{Direction, Flow, FragmentId, InMemoryQuantities, ProcessRef, QuantityRef, TerminationKey};
use lca_fragment::{FragmentSpec, FragmentStore, TerminationSpec};

pub fn mass() -> QuantityRef {
    QuantityRef::new("mass", "Mass", "kg")
}

pub fn energy() -> QuantityRef {
    QuantityRef::new("energy", "Energy", "MJ")
}

pub fn gwp() -> QuantityRef {
    QuantityRef::new("gwp", "Global warming potential", "kg CO2 eq")
}

pub fn count() -> QuantityRef {
    QuantityRef::new("count", "Count", "item")
}

/// Flow measured in kg, ref and name both `name`
pub fn flow(name: &str) -> Flow {
    Flow::new(name, name, mass())
}

pub fn flow_in(name: &str, quantity: QuantityRef) -> Flow {
    Flow::new(name, name, quantity)
}

pub fn co2() -> Flow {
    flow("co2")
}

pub fn process(name: &str) -> ProcessRef {
    ProcessRef::new(name, name)
}

/// Factors: co2 -> gwp 1.0
pub fn quantities() -> InMemoryQuantities {
    InMemoryQuantities::new().with_factor(&co2(), &gwp(), 1.0)
}

/// Reference fragment terminated to foreground
pub fn foreground_model(store: &mut FragmentStore, name: &str) -> FragmentId {
    let id = store
        .create(FragmentSpec::new(flow(name), Direction::Output).named(name))
        .unwrap();
    store
        .terminate(id, TerminationKey::Default, TerminationSpec::foreground())
        .unwrap();
    id
}

pub fn child(store: &mut FragmentStore, parent: FragmentId, name: &str, direction: Direction, value: f64) -> FragmentId {
    store
        .create(
            FragmentSpec::new(flow(name), direction)
                .child_of(parent)
                .with_value(value)
                .named(name),
        )
        .unwrap()
}

pub fn balance_child(store: &mut FragmentStore, parent: FragmentId, name: &str, direction: Direction) -> FragmentId {
    store
        .create(
            FragmentSpec::new(flow(name), direction)
                .child_of(parent)
                .balance()
                .named(name),
        )
        .unwrap()
}

/// Frame (reference, ev 1) with an unterminated steel input of 10
pub struct TwoNodeModel {
    pub store: FragmentStore,
    pub frame: FragmentId,
    pub steel: FragmentId,
}

pub fn two_node_model() -> TwoNodeModel {
    let mut store = FragmentStore::new();
    let frame = foreground_model(&mut store, "frame");
    let steel = child(&mut store, frame, "steel", Direction::Input, 10.0);
    TwoNodeModel { store, frame, steel }
}

/// Frame with a 4 kg scrap output and a balancing offcut output
pub struct BalanceModel {
    pub store: FragmentStore,
    pub frame: FragmentId,
    pub scrap: FragmentId,
    pub offcut: FragmentId,
}

pub fn balance_model() -> BalanceModel {
    let mut store = FragmentStore::new();
    let frame = foreground_model(&mut store, "frame");
    let scrap = child(&mut store, frame, "scrap", Direction::Output, 4.0);
    let offcut = balance_child(&mut store, frame, "offcut", Direction::Output);
    BalanceModel {
        store,
        frame,
        scrap,
        offcut,
    }
}

/// Steel supply sub-model: 1 kg steel out of a smelter that emits 2 kg co2
/// and consumes 0.5 kg ore
pub struct SteelSupply {
    pub steel: FragmentId,
    pub co2: FragmentId,
    pub ore: FragmentId,
}

pub fn steel_supply(store: &mut FragmentStore) -> SteelSupply {
    let steel = foreground_model(store, "steel");
    let co2 = child(store, steel, "co2", Direction::Output, 2.0);
    store
        .terminate(co2, TerminationKey::Default, TerminationSpec::foreground())
        .unwrap();
    let ore = child(store, steel, "ore", Direction::Input, 0.5);
    SteelSupply { steel, co2, ore }
}
