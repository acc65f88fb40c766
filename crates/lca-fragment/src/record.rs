//! Persisted fragment shape
//!
//! Fragments are stored as flat records that name their flow, target and
//! parent by reference. Loading resolves those references through an
//! [`EntityResolver`].

use std::collections::BTreeMap;

use lca_entity::{Direction, EntityKind, EntityResolver, Entity, FragmentId, ScenarioKey, TerminationKey};
use serde::{Deserialize, Serialize};

use crate::error::FragmentError;
use crate::fragment::{Fragment, FragmentSpec};
use crate::store::FragmentStore;
use crate::termination::{TermTarget, Termination, TerminationSpec};

/// Persisted termination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminationRecord {
    /// Process ref, fragment id or alias; absent for a cutoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<String>,
    /// Termination flow, when it differs from the fragment's flow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_flow_ref: Option<String>,
    /// Direction at the target, when it is not the complement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Descend flag of sub-fragment terminations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descend: Option<bool>,
    /// Inbound exchange value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_exchange_value: Option<f64>,
}

/// Persisted fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentRecord {
    /// Fragment id
    pub id: FragmentId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Stage tag
    #[serde(default)]
    pub stage: String,
    /// Parent fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<FragmentId>,
    /// Flow external reference
    pub flow: String,
    /// Direction relative to the parent
    pub direction: Direction,
    /// Background flag
    #[serde(default)]
    pub is_background: bool,
    /// Balance flag
    #[serde(default)]
    pub is_balance_flow: bool,
    /// Exchange values keyed `"0"`, `"1"` or scenario name
    #[serde(default)]
    pub exchange_values: BTreeMap<ScenarioKey, f64>,
    /// Terminations keyed `"default"` or scenario name
    #[serde(default)]
    pub terminations: BTreeMap<TerminationKey, TerminationRecord>,
}

impl FragmentRecord {
    fn from_fragment(fragment: &Fragment) -> Self {
        let terminations = fragment
            .terminations()
            .map(|(key, t)| (key.clone(), termination_record(fragment, t)))
            .collect();
        Self {
            id: fragment.id(),
            name: fragment.name().to_string(),
            stage: fragment.stage().to_string(),
            parent: fragment.parent(),
            flow: fragment.flow().external_ref().to_string(),
            direction: fragment.direction(),
            is_background: fragment.is_background(),
            is_balance_flow: fragment.is_balance_flow(),
            exchange_values: fragment.exchange_values().map(|(k, v)| (k.clone(), v)).collect(),
            terminations,
        }
    }
}

fn termination_record(fragment: &Fragment, termination: &Termination) -> TerminationRecord {
    let target_ref = match termination.target() {
        TermTarget::Null => return TerminationRecord::default(),
        TermTarget::Foreground => fragment.id().to_string(),
        TermTarget::Process(process) => process.external_ref().to_string(),
        TermTarget::Subfragment { fragment: sub, .. } | TermTarget::Background(sub) => sub.to_string(),
    };
    let descend = match termination.target() {
        TermTarget::Subfragment { descend, .. } => Some(*descend),
        _ => None,
    };
    TerminationRecord {
        target_ref: Some(target_ref),
        term_flow_ref: (termination.term_flow() != fragment.flow())
            .then(|| termination.term_flow().external_ref().to_string()),
        direction: (termination.direction() != fragment.direction().complement()).then_some(termination.direction()),
        descend,
        inbound_exchange_value: Some(termination.inbound_ev()),
    }
}

impl FragmentStore {
    /// Every fragment as a record, each tree in parent-first order
    #[must_use]
    pub fn to_records(&self) -> Vec<FragmentRecord> {
        self.reference_fragments()
            .flat_map(|top| self.subtree(top.id()))
            .filter_map(|id| self.get(id).ok())
            .map(FragmentRecord::from_fragment)
            .collect()
    }

    /// Build a store from records
    pub fn from_records(records: Vec<FragmentRecord>, resolver: &dyn EntityResolver) -> Result<Self, FragmentError> {
        let mut store = Self::new();
        store.load_records(records, resolver)?;
        Ok(store)
    }

    /// Add records to this store.
    ///
    /// Records may come in any order; parents are inserted before their
    /// children. Terminations are attached once every fragment exists, so
    /// sub-fragment targets may appear anywhere in the list.
    pub fn load_records(&mut self, records: Vec<FragmentRecord>, resolver: &dyn EntityResolver) -> Result<(), FragmentError> {
        let mut pending = records;
        let mut loaded = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|r| r.parent.map_or(true, |p| self.contains(p)));
            if ready.is_empty() {
                return Err(FragmentError::OrphanRecord(waiting[0].id));
            }
            for record in ready {
                self.insert_record(&record, resolver)?;
                loaded.push(record);
            }
            pending = waiting;
        }

        for record in loaded.iter().filter(|r| r.is_balance_flow) {
            self.set_balance_flow(record.id)?;
        }
        for record in &loaded {
            for (key, term) in &record.terminations {
                if term.target_ref.is_none() && *key == TerminationKey::Default {
                    continue;
                }
                let spec = termination_spec(self, record.id, term, resolver)?;
                self.terminate(record.id, key.clone(), spec)?;
            }
        }
        tracing::debug!(count = loaded.len(), "records loaded");
        Ok(())
    }

    fn insert_record(&mut self, record: &FragmentRecord, resolver: &dyn EntityResolver) -> Result<(), FragmentError> {
        if self.contains(record.id) {
            return Err(FragmentError::DuplicateId(record.id));
        }
        let flow = resolver.flow(&record.flow).ok_or_else(|| FragmentError::UnresolvedEntity {
            external_ref: record.flow.clone(),
            kind: EntityKind::Flow,
        })?;
        let mut spec = FragmentSpec::new(flow, record.direction)
            .with_id(record.id)
            .with_stage(record.stage.clone())
            .with_value(record.exchange_values.get(&ScenarioKey::Cached).copied().unwrap_or(1.0));
        spec.parent = record.parent;
        spec.background = record.is_background;
        if !record.name.is_empty() {
            spec.name = Some(record.name.clone());
        }
        let mut fragment = Fragment::from_spec(spec);
        for (key, value) in record.exchange_values.iter().filter(|(k, _)| **k != ScenarioKey::Cached) {
            fragment.set_value(key.clone(), *value);
        }
        self.insert(fragment);
        Ok(())
    }
}

fn termination_spec(
    store: &FragmentStore,
    id: FragmentId,
    record: &TerminationRecord,
    resolver: &dyn EntityResolver,
) -> Result<TerminationSpec, FragmentError> {
    let mut spec = match record.target_ref.as_deref() {
        None => TerminationSpec::null(),
        Some(target) => resolve_target(store, id, target, resolver)?,
    };
    if let Some(flow_ref) = &record.term_flow_ref {
        let flow = resolver.flow(flow_ref).ok_or_else(|| FragmentError::UnresolvedEntity {
            external_ref: flow_ref.clone(),
            kind: EntityKind::Flow,
        })?;
        spec = spec.with_term_flow(flow);
    }
    spec.direction = record.direction;
    spec.descend = record.descend;
    spec.inbound_ev = record.inbound_exchange_value;
    Ok(spec)
}

fn resolve_target(
    store: &FragmentStore,
    id: FragmentId,
    target: &str,
    resolver: &dyn EntityResolver,
) -> Result<TerminationSpec, FragmentError> {
    if let Ok(fragment) = target.parse::<FragmentId>() {
        if fragment == id {
            return Ok(TerminationSpec::foreground());
        }
        if store.contains(fragment) {
            return Ok(TerminationSpec::fragment(fragment));
        }
    }
    if let Some(Entity::Fragment(fragment)) = resolver.resolve(target, EntityKind::Fragment) {
        return Ok(TerminationSpec::fragment(fragment));
    }
    resolver
        .process(target)
        .map(TerminationSpec::process)
        .ok_or_else(|| FragmentError::UnresolvedEntity {
            external_ref: target.to_string(),
            kind: EntityKind::Process,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lca_entity::{Catalog, Flow, ProcessRef, QuantityRef};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mass = QuantityRef::new("mass", "Mass", "kg");
        Catalog::new()
            .with_flow(Flow::new("frame", "Frame", mass.clone()))
            .with_flow(Flow::new("steel", "Steel", mass))
            .with_process(ProcessRef::new("mill", "Rolling mill"))
    }

    #[test]
    fn child_before_parent_still_loads() {
        let parent = FragmentId::new();
        let child = FragmentRecord {
            id: FragmentId::new(),
            name: "steel in".into(),
            stage: String::new(),
            parent: Some(parent),
            flow: "steel".into(),
            direction: Direction::Input,
            is_background: false,
            is_balance_flow: false,
            exchange_values: BTreeMap::from([(ScenarioKey::Cached, 10.0), (ScenarioKey::named("lean"), 8.0)]),
            terminations: BTreeMap::from([(
                TerminationKey::Default,
                TerminationRecord {
                    target_ref: Some("mill".into()),
                    ..TerminationRecord::default()
                },
            )]),
        };
        let top = FragmentRecord {
            id: parent,
            name: "frame".into(),
            stage: "assembly".into(),
            parent: None,
            flow: "frame".into(),
            direction: Direction::Output,
            is_background: false,
            is_balance_flow: false,
            exchange_values: BTreeMap::new(),
            terminations: BTreeMap::new(),
        };
        let store = FragmentStore::from_records(vec![child.clone(), top], &catalog()).unwrap();
        let loaded = store.get(child.id).unwrap();
        assert_eq!(loaded.stored_value(&ScenarioKey::named("lean")), Some(8.0));
        assert_eq!(loaded.termination_for_key(&TerminationKey::Default).unwrap().process().unwrap().external_ref(), "mill");
        assert_eq!(store.get(parent).unwrap().stage(), "assembly");
    }

    #[test]
    fn missing_parent_is_orphan() {
        let record = FragmentRecord {
            id: FragmentId::new(),
            name: String::new(),
            stage: String::new(),
            parent: Some(FragmentId::new()),
            flow: "steel".into(),
            direction: Direction::Input,
            is_background: false,
            is_balance_flow: false,
            exchange_values: BTreeMap::new(),
            terminations: BTreeMap::new(),
        };
        let err = FragmentStore::from_records(vec![record.clone()], &catalog()).unwrap_err();
        assert_eq!(err, FragmentError::OrphanRecord(record.id));
    }

    #[test]
    fn unknown_flow_is_recoverable() {
        let record = FragmentRecord {
            id: FragmentId::new(),
            name: String::new(),
            stage: String::new(),
            parent: None,
            flow: "unobtainium".into(),
            direction: Direction::Output,
            is_background: false,
            is_balance_flow: false,
            exchange_values: BTreeMap::new(),
            terminations: BTreeMap::new(),
        };
        let err = FragmentStore::from_records(vec![record], &catalog()).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn json_shape_is_camel_case() {
        let record = TerminationRecord {
            target_ref: Some("mill".into()),
            inbound_exchange_value: Some(2.0),
            ..TerminationRecord::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"targetRef": "mill", "inboundExchangeValue": 2.0}));
    }
}
