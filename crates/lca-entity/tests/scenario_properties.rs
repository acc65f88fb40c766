use std::collections::BTreeSet;

use lca_entity::{Scenario, ScenarioKey};
use proptest::prelude::*;

fn names() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-e]", 0..5)
}

proptest! {
    #[test]
    fn select_agrees_with_intersection(candidates in names(), available in names()) {
        let scenario = Scenario::from_names(candidates.iter().cloned());
        let common: Vec<&str> = candidates.intersection(&available).map(String::as_str).collect();
        let picked = scenario.select(available.iter().map(String::as_str));
        match common.as_slice() {
            [] => {
                prop_assert_eq!(picked.unwrap(), None);
            }
            [only] => {
                prop_assert_eq!(picked.unwrap(), Some(*only));
            }
            _ => {
                prop_assert!(picked.unwrap_err().is_ambiguity());
            }
        }
    }

    #[test]
    fn default_never_selects(available in names()) {
        prop_assert_eq!(Scenario::Default.select(available.iter().map(String::as_str)).unwrap(), None);
    }

    #[test]
    fn label_ignores_name_order(candidates in names()) {
        let forward = Scenario::from_names(candidates.iter().cloned());
        let backward = Scenario::from_names(candidates.iter().rev().cloned());
        prop_assert_eq!(forward.label(), backward.label());
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn named_keys_survive_strings(name in "[a-z]{1,8}") {
        let key = ScenarioKey::named(name.clone());
        prop_assert_eq!(ScenarioKey::from(String::from(key.clone())), key);
        prop_assert!(!ScenarioKey::from(name).is_reserved());
    }
}
