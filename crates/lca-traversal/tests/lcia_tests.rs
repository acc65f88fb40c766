use lca_entity::{Direction, InMemoryBackground, Scenario, TerminationKey};
use lca_fragment::{FragmentSpec, FragmentStore, TerminationKind, TerminationSpec};
use lca_test_utils::{child, co2, flow, foreground_model, gwp, process, quantities, steel_supply, two_node_model};
use lca_traversal::Traversal;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn foreground_emission_is_scored_directly() {
    let mut store = FragmentStore::new();
    let supply = steel_supply(&mut store);
    let quantities = quantities();
    let result = Traversal::new(&store, &quantities)
        .fragment_lcia(supply.steel, &gwp(), &Scenario::Default)
        .unwrap();
    assert!(close(result.total(), 2.0));
    assert_eq!(result.len(), 1);
    assert!(result.component(&supply.co2.to_string()).is_some());
}

#[test]
fn descend_and_aggregate_agree_after_flatten() {
    let quantities = quantities();
    let mut totals = Vec::new();
    let mut flattened = Vec::new();
    for descend in [true, false] {
        let mut model = two_node_model();
        let supply = steel_supply(&mut model.store);
        model
            .store
            .terminate(
                model.steel,
                TerminationKey::Default,
                TerminationSpec::fragment(supply.steel).with_descend(descend),
            )
            .unwrap();
        let traversal = Traversal::new(&model.store, &quantities);
        let result = traversal.fragment_lcia(model.frame, &gwp(), &Scenario::Default).unwrap();
        let flat = traversal.flatten(&result).unwrap();
        totals.push(result.total());
        flattened.push(flat.component_result("co2").unwrap());
    }
    assert!(close(totals[0], 20.0));
    assert!(close(totals[1], 20.0));
    assert!(close(flattened[0], flattened[1]));
}

#[test]
fn aggregated_score_follows_submodel_edits() {
    let quantities = quantities();
    let mut model = two_node_model();
    let supply = steel_supply(&mut model.store);
    model
        .store
        .terminate(
            model.steel,
            TerminationKey::Default,
            TerminationSpec::fragment(supply.steel).with_descend(false),
        )
        .unwrap();

    let before = Traversal::new(&model.store, &quantities)
        .fragment_lcia(model.frame, &gwp(), &Scenario::Default)
        .unwrap();
    assert!(close(before.total(), 20.0));

    model.store.reset_cached_value(supply.co2, 5.0).unwrap();
    let after = Traversal::new(&model.store, &quantities)
        .fragment_lcia(model.frame, &gwp(), &Scenario::Default)
        .unwrap();
    assert!(close(after.total(), 50.0));

    model.store.set_descend(model.steel, &TerminationKey::Default, true).unwrap();
    let inline = Traversal::new(&model.store, &quantities)
        .fragment_lcia(model.frame, &gwp(), &Scenario::Default)
        .unwrap();
    assert!(close(inline.total(), after.total()));

    let termination = model
        .store
        .get(model.steel)
        .unwrap()
        .termination(&Scenario::Default)
        .unwrap()
        .clone();
    assert!(termination.score_cache().is_empty());
}

#[test]
fn foreground_process_uses_direct_emissions() {
    let mut model = two_node_model();
    let assembly = process("assembly");
    model.store.clear_termination(model.frame, &TerminationKey::Default).unwrap();
    model
        .store
        .terminate(model.frame, TerminationKey::Default, TerminationSpec::process(assembly.clone()))
        .unwrap();
    let background = InMemoryBackground::new()
        .with_emission(&assembly, &co2(), Direction::Output, 0.3)
        .with_lci(&assembly, &co2(), Direction::Output, 9.0);
    let quantities = quantities();
    let traversal = Traversal::new(&model.store, &quantities).with_background(&background);

    let first = traversal.fragment_lcia(model.frame, &gwp(), &Scenario::Default).unwrap();
    assert!(close(first.total(), 0.3));

    let termination = model
        .store
        .get(model.frame)
        .unwrap()
        .termination(&Scenario::Default)
        .unwrap()
        .clone();
    assert_eq!(termination.score_cache().len(), 1);

    let second = traversal.fragment_lcia(model.frame, &gwp(), &Scenario::Default).unwrap();
    assert!(close(second.total(), first.total()));
    assert_eq!(termination.score_cache().len(), 1);
}

#[test]
fn background_process_uses_lci() {
    let mut model = two_node_model();
    let grid = process("grid");
    model
        .store
        .terminate(model.steel, TerminationKey::Default, TerminationSpec::process(grid.clone()))
        .unwrap();
    let background = InMemoryBackground::new()
        .with_background(&grid)
        .with_emission(&grid, &co2(), Direction::Output, 1.0)
        .with_lci(&grid, &co2(), Direction::Output, 3.0);
    let quantities = quantities();
    let result = Traversal::new(&model.store, &quantities)
        .with_background(&background)
        .fragment_lcia(model.frame, &gwp(), &Scenario::Default)
        .unwrap();
    assert!(close(result.total(), 30.0));
}

#[test]
fn background_fragment_is_scored_with_lci() {
    let mut store = FragmentStore::new();
    let frame = foreground_model(&mut store, "frame");
    let steel = child(&mut store, frame, "steel", Direction::Input, 10.0);
    let smelter = process("smelter");
    let market = store
        .create(FragmentSpec::new(flow("steel"), Direction::Output).background().named("steel market"))
        .unwrap();
    store
        .terminate(market, TerminationKey::Default, TerminationSpec::process(smelter.clone()))
        .unwrap();
    store
        .terminate(steel, TerminationKey::Default, TerminationSpec::fragment(market))
        .unwrap();
    let background = InMemoryBackground::new()
        .with_emission(&smelter, &co2(), Direction::Output, 0.5)
        .with_lci(&smelter, &co2(), Direction::Output, 2.0);
    let quantities = quantities();
    let result = Traversal::new(&store, &quantities)
        .with_background(&background)
        .fragment_lcia(frame, &gwp(), &Scenario::Default)
        .unwrap();
    assert!(close(result.total(), 20.0));
    assert!(result.component(&steel.to_string()).is_some());

    let records = Traversal::new(&store, &quantities)
        .with_background(&background)
        .traverse(frame, &Scenario::Default, false)
        .unwrap();
    let delegated = records.iter().find(|r| r.fragment() == steel).unwrap();
    assert!(delegated.is_background());
    assert_eq!(delegated.termination().kind(), TerminationKind::Process);
    assert!(records.iter().all(|r| r.termination().kind() != TerminationKind::Background));
}

#[test]
fn result_carries_scenario_label() {
    let model = two_node_model();
    let quantities = quantities();
    let result = Traversal::new(&model.store, &quantities)
        .fragment_lcia(model.frame, &gwp(), &Scenario::named("lean"))
        .unwrap();
    assert_eq!(result.scenario(), Some("lean"));
    assert!(result.is_empty());
}

#[test]
fn observed_scores_are_cached_separately() {
    let mut model = two_node_model();
    let furnace = process("furnace");
    model
        .store
        .terminate(model.steel, TerminationKey::Default, TerminationSpec::process(furnace.clone()))
        .unwrap();
    let background = InMemoryBackground::new().with_emission(&furnace, &co2(), Direction::Output, 1.0);
    let quantities = quantities();
    let traversal = Traversal::new(&model.store, &quantities).with_background(&background);

    for observed in [false, true] {
        let records = traversal.traverse(model.frame, &Scenario::Default, observed).unwrap();
        let result = traversal
            .score_records(&records, &gwp(), &Scenario::Default, observed)
            .unwrap();
        assert!(close(result.total(), 10.0));
    }
    let termination = model
        .store
        .get(model.steel)
        .unwrap()
        .termination(&Scenario::Default)
        .unwrap()
        .clone();
    assert_eq!(termination.score_cache().len(), 2);
}
