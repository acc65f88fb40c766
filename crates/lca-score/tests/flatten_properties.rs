use lca_entity::{Direction, Flow, QuantityRef};
use lca_score::{DetailedScore, EntityKey, LciaResult, ScoreError, UnitScore};
use proptest::prelude::*;

fn gwp() -> QuantityRef {
    QuantityRef::new("gwp", "GWP", "kg CO2 eq")
}

fn elementary(i: usize) -> Flow {
    Flow::new(format!("e{i}"), format!("Emission {i}"), QuantityRef::new("mass", "Mass", "kg"))
}

/// Leaf result: a handful of characterized exchanges
fn leaf(exchanges: &[(usize, f64, f64)]) -> LciaResult {
    let mut r = LciaResult::new(gwp());
    for (i, amount, factor) in exchanges {
        let flow = elementary(*i);
        r.add_detail(EntityKey::from(&flow), DetailedScore::new(flow, Direction::Output, *amount, *factor))
            .unwrap();
    }
    r
}

fn exchange() -> impl Strategy<Value = (usize, f64, f64)> {
    (0usize..6, -50.0f64..50.0, 0.0f64..40.0)
}

proptest! {
    #[test]
    fn flatten_preserves_total(
        leaves in prop::collection::vec(prop::collection::vec(exchange(), 1..5), 1..5),
        weights in prop::collection::vec(0.01f64..20.0, 5),
        scale in 0.1f64..10.0,
    ) {
        let mut top = LciaResult::new(gwp()).scaled(scale);
        for (n, exchanges) in leaves.iter().enumerate() {
            let mut middle = LciaResult::new(gwp());
            middle
                .add_summary(EntityKey::new(format!("p{n}"), "process"), weights[n], UnitScore::Nested(Box::new(leaf(exchanges))))
                .unwrap();
            top.add_summary(EntityKey::new(format!("f{n}"), "fragment"), weights[4 - n], UnitScore::Nested(Box::new(middle)))
                .unwrap();
        }

        let flat = top.flatten().unwrap();
        let expected = top.total();
        let scale_ref = expected.abs().max(1.0);
        prop_assert!((flat.total() - expected).abs() <= 1e-6 * scale_ref * 100.0);
        prop_assert!(flat.len() <= 6);
    }

    #[test]
    fn flatten_is_idempotent(exchanges in prop::collection::vec(exchange(), 1..8), weight in 0.1f64..5.0) {
        let mut r = LciaResult::new(gwp());
        r.add_summary(EntityKey::new("p", "process"), weight, UnitScore::Nested(Box::new(leaf(&exchanges))))
            .unwrap();
        let once = r.flatten().unwrap();
        let twice = once.flatten().unwrap();
        prop_assert_eq!(once.len(), twice.len());
        prop_assert!((once.total() - twice.total()).abs() <= 1e-9 * once.total().abs().max(1.0));
    }
}

#[test]
fn zero_tolerance_flags_any_drift() {
    // 0.1 + 0.2 style rounding through nested weights
    let mut r = LciaResult::new(gwp());
    r.add_summary(
        EntityKey::new("p", "process"),
        0.1,
        UnitScore::Nested(Box::new(leaf(&[(0, 0.2, 3.0), (1, 0.7, 0.3)]))),
    )
    .unwrap();
    match r.flatten_with_tolerance(0.0) {
        Ok(flat) => assert_eq!(flat.total(), r.total()),
        Err(ScoreError::NumericInconsistency { expected, actual }) => assert_ne!(expected, actual),
        Err(other) => panic!("unexpected error {other}"),
    }
}
