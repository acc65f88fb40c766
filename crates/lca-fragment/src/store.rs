//! Fragment arena
//!
//! Fragments are owned by the store and addressed by id. Parent links live on
//! the fragments themselves; the parent-to-children index is kept here and
//! ordered by id so that traversal order is stable.
//!
//! Every edit bumps the store's revision, which score caches use to tell
//! results computed before the edit from current ones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lca_entity::{FragmentId, Scenario, ScenarioKey, TerminationKey};

use crate::error::FragmentError;
use crate::fragment::{Fragment, FragmentSpec};
use crate::termination::{TargetSpec, TermTarget, Termination, TerminationSpec};

/// Arena of fragments with a child index
#[derive(Debug, Default)]
pub struct FragmentStore {
    fragments: BTreeMap<FragmentId, Fragment>,
    children: BTreeMap<FragmentId, BTreeSet<FragmentId>>,
    revision: u64,
}

impl FragmentStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fragments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Whether `id` is stored
    #[inline]
    #[must_use]
    pub fn contains(&self, id: FragmentId) -> bool {
        self.fragments.contains_key(&id)
    }

    /// Edit counter, bumped by every change to the store
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Fragment by id
    pub fn get(&self, id: FragmentId) -> Result<&Fragment, FragmentError> {
        self.fragments.get(&id).ok_or(FragmentError::NotFound(id))
    }

    fn get_mut(&mut self, id: FragmentId) -> Result<&mut Fragment, FragmentError> {
        self.fragments.get_mut(&id).ok_or(FragmentError::NotFound(id))
    }

    /// All fragments in id order
    pub fn iter(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values()
    }

    /// Parentless fragments
    pub fn reference_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.values().filter(|f| f.is_reference())
    }

    /// First fragment with the given name
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Fragment> {
        self.fragments.values().find(|f| f.name() == name)
    }

    /// Children of `id` in id order
    pub fn children(&self, id: FragmentId) -> impl Iterator<Item = FragmentId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// Whether `id` has any children
    #[must_use]
    pub fn has_children(&self, id: FragmentId) -> bool {
        self.children.get(&id).is_some_and(|c| !c.is_empty())
    }

    /// The child of `id` flagged as balance flow, if any
    #[must_use]
    pub fn balance_child(&self, id: FragmentId) -> Option<FragmentId> {
        self.children(id)
            .find(|c| self.fragments.get(c).is_some_and(Fragment::is_balance_flow))
    }

    /// Reference fragment of the tree containing `id`
    pub fn top(&self, id: FragmentId) -> Result<FragmentId, FragmentError> {
        let mut current = self.get(id)?;
        while let Some(parent) = current.parent() {
            current = self.get(parent)?;
        }
        Ok(current.id())
    }

    /// `id` and all its descendants, parents before children
    #[must_use]
    pub fn subtree(&self, id: FragmentId) -> Vec<FragmentId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.contains(next) {
                continue;
            }
            out.push(next);
            let kids: Vec<_> = self.children(next).collect();
            stack.extend(kids.into_iter().rev());
        }
        out
    }

    /// Scenario names used anywhere in the tree under `id`
    #[must_use]
    pub fn tree_scenarios(&self, id: FragmentId) -> BTreeSet<String> {
        self.subtree(id)
            .into_iter()
            .filter_map(|f| self.fragments.get(&f))
            .flat_map(Fragment::scenarios)
            .collect()
    }

    /// Fragments whose terminations target `target`
    #[must_use]
    pub fn referrers(&self, target: FragmentId) -> Vec<FragmentId> {
        self.fragments
            .values()
            .filter(|f| f.terminations().any(|(_, t)| t.subfragment() == Some(target)))
            .map(Fragment::id)
            .collect()
    }

    /// Create a fragment with a null default termination
    #[tracing::instrument(level = "debug", skip_all, fields(flow = spec.flow.external_ref()))]
    pub fn create(&mut self, spec: FragmentSpec) -> Result<FragmentId, FragmentError> {
        if let Some(id) = spec.id {
            if self.contains(id) {
                return Err(FragmentError::DuplicateId(id));
            }
        }
        match spec.parent {
            Some(parent) => {
                self.get(parent)?;
                if spec.balance {
                    if let Some(existing) = self.balance_child(parent) {
                        return Err(FragmentError::BalanceAlreadySet { parent, existing });
                    }
                }
            }
            None if spec.balance => {
                return Err(FragmentError::BalanceWithoutParent(spec.id.unwrap_or_default()));
            }
            None => {}
        }

        let fragment = Fragment::from_spec(spec);
        let id = fragment.id();
        let conserved = fragment
            .is_balance_flow()
            .then(|| fragment.flow().reference_quantity().clone());
        self.insert(fragment);
        if let (Some(parent), Some(quantity)) = (self.get(id)?.parent(), conserved) {
            self.get_mut(parent)?.set_conserved_quantity(Some(quantity));
        }
        tracing::debug!(fragment = %id, "fragment created");
        Ok(id)
    }

    pub(crate) fn insert(&mut self, fragment: Fragment) {
        let id = fragment.id();
        if let Some(parent) = fragment.parent() {
            self.children.entry(parent).or_default().insert(id);
        }
        self.fragments.insert(id, fragment);
        self.touch();
    }

    /// Store an exchange value under `key`
    pub fn set_exchange_value(&mut self, id: FragmentId, key: ScenarioKey, value: f64) -> Result<(), FragmentError> {
        let fragment = self.get(id)?;
        if fragment.is_balance_flow() {
            return Err(FragmentError::DependentFragment(id));
        }
        if let Some(parent) = fragment.parent() {
            let scenario = match &key {
                ScenarioKey::Named(name) => Scenario::named(name.clone()),
                ScenarioKey::Cached | ScenarioKey::Observed => Scenario::Default,
            };
            if self.get(parent)?.termination(&scenario)?.is_subfragment() {
                return Err(FragmentError::DependentFragment(id));
            }
        }
        if key == ScenarioKey::Cached {
            return Err(FragmentError::CacheAlreadySet {
                fragment: id,
                key: key.to_string(),
            });
        }
        tracing::debug!(fragment = %id, %key, value, "exchange value set");
        self.get_mut(id)?.set_value(key, value);
        self.touch();
        Ok(())
    }

    /// Replace the cached value (key 0)
    pub fn reset_cached_value(&mut self, id: FragmentId, value: f64) -> Result<(), FragmentError> {
        tracing::debug!(fragment = %id, value, "cached value reset");
        self.get_mut(id)?.set_value(ScenarioKey::Cached, value);
        self.touch();
        Ok(())
    }

    /// Terminate `id` under `key`.
    ///
    /// Fails if a non-null termination is already stored there; clear it
    /// first. Fragment targets resolve to a self-termination (the fragment
    /// itself), a background termination (background-flagged target) or a
    /// sub-fragment termination.
    pub fn terminate(&mut self, id: FragmentId, key: TerminationKey, spec: TerminationSpec) -> Result<(), FragmentError> {
        let fragment = self.get(id)?;
        if fragment.termination_for_key(&key).is_some_and(|t| !t.is_null()) {
            return Err(FragmentError::CacheAlreadySet {
                fragment: id,
                key: key.to_string(),
            });
        }
        let direction = spec.direction.unwrap_or_else(|| fragment.direction().complement());
        let term_flow = spec.term_flow.unwrap_or_else(|| fragment.flow().clone());
        let (target, default_ev) = match spec.target {
            TargetSpec::Null => (TermTarget::Null, 1.0),
            TargetSpec::Foreground => (TermTarget::Foreground, 1.0),
            TargetSpec::Fragment(target) if target == id => (TermTarget::Foreground, 1.0),
            TargetSpec::Process(process) => (TermTarget::Process(process), 1.0),
            TargetSpec::Fragment(target) => {
                let sub = self.get(target)?;
                if !sub.is_reference() {
                    return Err(FragmentError::NotReference(target));
                }
                let target_kind = if sub.is_background() {
                    TermTarget::Background(target)
                } else {
                    TermTarget::Subfragment {
                        fragment: target,
                        descend: spec.descend.unwrap_or(true),
                    }
                };
                (target_kind, sub.cached_value())
            }
        };
        let termination = Termination::new(target, term_flow, direction, spec.inbound_ev.unwrap_or(default_ev));
        tracing::debug!(fragment = %id, %key, kind = %termination.kind(), "terminated");
        self.get_mut(id)?.set_termination(key, Arc::new(termination));
        self.touch();
        Ok(())
    }

    /// Reset the default termination to null, or remove a named one
    pub fn clear_termination(&mut self, id: FragmentId, key: &TerminationKey) -> Result<(), FragmentError> {
        self.get_mut(id)?.remove_termination(key);
        self.touch();
        tracing::debug!(fragment = %id, %key, "termination cleared");
        Ok(())
    }

    /// Switch a sub-fragment termination between inlined and aggregated
    pub fn set_descend(&mut self, id: FragmentId, key: &TerminationKey, descend: bool) -> Result<(), FragmentError> {
        let replacement = self
            .get(id)?
            .termination_for_key(key)
            .and_then(|t| t.with_descend(descend))
            .ok_or_else(|| FragmentError::NoSuchTermination {
                fragment: id,
                key: key.to_string(),
                expected: "subfragment",
            })?;
        self.get_mut(id)?.set_termination(key.clone(), Arc::new(replacement));
        self.touch();
        Ok(())
    }

    /// Make `id` its parent's balance flow
    pub fn set_balance_flow(&mut self, id: FragmentId) -> Result<(), FragmentError> {
        let fragment = self.get(id)?;
        let parent = fragment.parent().ok_or(FragmentError::BalanceWithoutParent(id))?;
        if let Some(existing) = self.balance_child(parent).filter(|c| *c != id) {
            return Err(FragmentError::BalanceAlreadySet { parent, existing });
        }
        let quantity = fragment.flow().reference_quantity().clone();
        self.get_mut(id)?.set_balance_flag(true);
        self.get_mut(parent)?.set_conserved_quantity(Some(quantity));
        self.touch();
        Ok(())
    }

    /// Return `id` to a stored-value flow
    pub fn unset_balance_flow(&mut self, id: FragmentId) -> Result<(), FragmentError> {
        let fragment = self.get(id)?;
        if !fragment.is_balance_flow() {
            return Ok(());
        }
        let parent = fragment.parent();
        self.get_mut(id)?.set_balance_flag(false);
        if let Some(parent) = parent {
            self.get_mut(parent)?.set_conserved_quantity(None);
        }
        self.touch();
        Ok(())
    }

    /// Delete `id` and its descendants.
    ///
    /// Refuses while any termination outside the subtree targets a fragment
    /// inside it. Returns the removed ids.
    pub fn delete(&mut self, id: FragmentId) -> Result<Vec<FragmentId>, FragmentError> {
        let fragment = self.get(id)?;
        let parent = fragment.parent();
        let was_balance = fragment.is_balance_flow();
        let doomed = self.subtree(id);
        let doomed_set: BTreeSet<_> = doomed.iter().copied().collect();

        for other in self.fragments.values().filter(|f| !doomed_set.contains(&f.id())) {
            for (_, termination) in other.terminations() {
                if let Some(target) = termination.subfragment().filter(|t| doomed_set.contains(t)) {
                    return Err(FragmentError::FragmentInUse {
                        fragment: target,
                        referrer: other.id(),
                    });
                }
            }
        }

        for gone in &doomed {
            self.fragments.remove(gone);
            self.children.remove(gone);
        }
        if let Some(parent) = parent {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.remove(&id);
            }
            if was_balance {
                self.get_mut(parent)?.set_conserved_quantity(None);
            }
        }
        self.touch();
        tracing::debug!(fragment = %id, removed = doomed.len(), "fragment deleted");
        Ok(doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lca_entity::{Direction, Flow, QuantityRef};

    fn mass() -> QuantityRef {
        QuantityRef::new("mass", "Mass", "kg")
    }

    fn flow(name: &str) -> Flow {
        Flow::new(name, name, mass())
    }

    #[test]
    fn children_are_indexed() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let b = store.create(FragmentSpec::new(flow("b"), Direction::Input).child_of(a)).unwrap();
        let c = store.create(FragmentSpec::new(flow("c"), Direction::Input).child_of(b)).unwrap();
        assert_eq!(store.children(a).collect::<Vec<_>>(), vec![b]);
        assert_eq!(store.top(c).unwrap(), a);
        assert_eq!(store.subtree(a), vec![a, b, c]);
    }

    #[test]
    fn edits_bump_revision() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let b = store.create(FragmentSpec::new(flow("b"), Direction::Input).child_of(a)).unwrap();
        let mut last = store.revision();
        let mut bumped = |store: &FragmentStore| {
            let next = store.revision();
            let changed = next != last;
            last = next;
            changed
        };
        store.reset_cached_value(b, 2.0).unwrap();
        assert!(bumped(&store));
        store.set_exchange_value(b, ScenarioKey::named("lean"), 1.0).unwrap();
        assert!(bumped(&store));
        store.terminate(b, TerminationKey::Default, TerminationSpec::foreground()).unwrap();
        assert!(bumped(&store));
        store.clear_termination(b, &TerminationKey::Default).unwrap();
        assert!(bumped(&store));
        store.set_balance_flow(b).unwrap();
        assert!(bumped(&store));
        store.unset_balance_flow(b).unwrap();
        assert!(bumped(&store));
        store.delete(b).unwrap();
        assert!(bumped(&store));
        assert!(!bumped(&store));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut store = FragmentStore::new();
        let ghost = FragmentId::new();
        let err = store
            .create(FragmentSpec::new(flow("a"), Direction::Input).child_of(ghost))
            .unwrap_err();
        assert_eq!(err, FragmentError::NotFound(ghost));
    }

    #[test]
    fn balance_sets_conserved_quantity() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let c = store
            .create(FragmentSpec::new(flow("c"), Direction::Output).child_of(a).balance())
            .unwrap();
        assert_eq!(store.get(a).unwrap().conserved_quantity(), Some(&mass()));
        assert_eq!(store.balance_child(a), Some(c));

        store.unset_balance_flow(c).unwrap();
        assert!(store.get(a).unwrap().conserved_quantity().is_none());
        store.set_balance_flow(c).unwrap();
        assert!(store.get(a).unwrap().conserved_quantity().is_some());
    }

    #[test]
    fn second_balance_child_is_rejected() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let c = store
            .create(FragmentSpec::new(flow("c"), Direction::Output).child_of(a).balance())
            .unwrap();
        let err = store
            .create(FragmentSpec::new(flow("d"), Direction::Input).child_of(a).balance())
            .unwrap_err();
        assert_eq!(err, FragmentError::BalanceAlreadySet { parent: a, existing: c });

        let d = store.create(FragmentSpec::new(flow("d"), Direction::Input).child_of(a)).unwrap();
        assert!(store.set_balance_flow(d).unwrap_err().is_topology());
    }

    #[test]
    fn reference_cannot_balance() {
        let mut store = FragmentStore::new();
        let err = store
            .create(FragmentSpec::new(flow("a"), Direction::Output).balance())
            .unwrap_err();
        assert!(matches!(err, FragmentError::BalanceWithoutParent(_)));
    }

    #[test]
    fn cached_value_is_set_once() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let b = store.create(FragmentSpec::new(flow("b"), Direction::Input).child_of(a)).unwrap();
        let err = store.set_exchange_value(b, ScenarioKey::Cached, 3.0).unwrap_err();
        assert!(matches!(err, FragmentError::CacheAlreadySet { .. }));
        store.reset_cached_value(b, 3.0).unwrap();
        assert_eq!(store.get(b).unwrap().cached_value(), 3.0);
    }

    #[test]
    fn descend_requires_subfragment() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let sub = store.create(FragmentSpec::new(flow("s"), Direction::Output)).unwrap();
        store.terminate(a, TerminationKey::Default, TerminationSpec::fragment(sub)).unwrap();
        store.set_descend(a, &TerminationKey::Default, false).unwrap();
        let t = store.get(a).unwrap().termination(&Scenario::Default).unwrap().clone();
        assert!(!t.descend());

        let err = store.set_descend(sub, &TerminationKey::Default, false).unwrap_err();
        assert!(matches!(err, FragmentError::NoSuchTermination { .. }));
    }

    #[test]
    fn self_target_is_foreground() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        store.terminate(a, TerminationKey::Default, TerminationSpec::fragment(a)).unwrap();
        assert!(store.get(a).unwrap().termination(&Scenario::Default).unwrap().is_foreground());
    }

    #[test]
    fn subfragment_target_must_be_reference() {
        let mut store = FragmentStore::new();
        let a = store.create(FragmentSpec::new(flow("a"), Direction::Output)).unwrap();
        let b = store.create(FragmentSpec::new(flow("b"), Direction::Input).child_of(a)).unwrap();
        let x = store.create(FragmentSpec::new(flow("x"), Direction::Output)).unwrap();
        let err = store.terminate(x, TerminationKey::Default, TerminationSpec::fragment(b)).unwrap_err();
        assert_eq!(err, FragmentError::NotReference(b));
    }
}
