//! LCIA result container

use indexmap::IndexMap;
use lca_entity::QuantityRef;
use serde::{Deserialize, Serialize};

use crate::component::{AggregateScore, DetailedScore, EntityKey, ScoreComponent, SummaryScore, UnitScore};
use crate::error::ScoreError;

/// Relative tolerance of the flatten total check
pub const DEFAULT_FLATTEN_TOLERANCE: f64 = 1e-6;

/// Rounding allowance of a flattened total, relative to the gross score
const ROUNDING_NOISE: f64 = 1e-12;

/// Whether a flattened total matches the original within `tolerance` of the
/// total, allowing rounding noise from components that cancel
fn totals_agree(expected: f64, actual: f64, gross: f64, tolerance: f64) -> bool {
    if expected == actual {
        return true;
    }
    let relative = tolerance * expected.abs().max(actual.abs());
    let noise = (ROUNDING_NOISE * gross).min(tolerance * gross);
    (expected - actual).abs() <= relative + noise
}

/// Scores of many entities in one quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LciaResult {
    quantity: QuantityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    scale: f64,
    components: IndexMap<String, ScoreComponent>,
}

impl LciaResult {
    /// Empty result at scale 1
    #[must_use]
    pub fn new(quantity: QuantityRef) -> Self {
        Self {
            quantity,
            scenario: None,
            scale: 1.0,
            components: IndexMap::new(),
        }
    }

    /// With a scenario label
    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Quantity the result is expressed in
    #[inline]
    #[must_use]
    pub fn quantity(&self) -> &QuantityRef {
        &self.quantity
    }

    /// Scenario label, if any
    #[inline]
    #[must_use]
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    /// Scale applied on top of every component
    #[inline]
    #[must_use]
    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    /// Components in insertion order
    pub fn components(&self) -> impl Iterator<Item = &ScoreComponent> {
        self.components.values()
    }

    /// Component ids in insertion order
    pub fn component_ids(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    /// Component filed under `id`
    #[must_use]
    pub fn component(&self, id: &str) -> Option<&ScoreComponent> {
        self.components.get(id)
    }

    /// Number of components
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether there are no components
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Add a characterized exchange under `entity`
    pub fn add_detail(&mut self, entity: EntityKey, detail: DetailedScore) -> Result<(), ScoreError> {
        let mut aggregate = AggregateScore::new(entity);
        aggregate.add(detail);
        self.add_component(ScoreComponent::Detailed(aggregate))
    }

    /// Add `node_weight x unit_score` under `entity`
    pub fn add_summary(&mut self, entity: EntityKey, node_weight: f64, unit_score: UnitScore) -> Result<(), ScoreError> {
        self.add_component(ScoreComponent::Summary(SummaryScore::new(entity, node_weight, unit_score)))
    }

    /// Add a component, folding it into an existing one for the same entity
    pub fn add_component(&mut self, component: ScoreComponent) -> Result<(), ScoreError> {
        let id = component.entity().id().to_string();
        match self.components.get_mut(&id) {
            Some(existing) => existing.absorb(&component),
            None => {
                self.components.insert(id, component);
                Ok(())
            }
        }
    }

    /// Sum of all components times the scale
    #[must_use]
    pub fn total(&self) -> f64 {
        self.scale * self.components.values().map(ScoreComponent::cumulative_result).sum::<f64>()
    }

    /// Scaled result of one component
    #[must_use]
    pub fn component_result(&self, id: &str) -> Option<f64> {
        self.components.get(id).map(|c| self.scale * c.cumulative_result())
    }

    /// Multiply the scale by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.scale *= factor;
    }

    /// Owned form of [`LciaResult::scale`]
    #[must_use]
    pub fn scaled(mut self, factor: f64) -> Self {
        self.scale(factor);
        self
    }

    /// Fold another result in the same quantity into this one
    pub fn merge(&mut self, other: &Self) -> Result<(), ScoreError> {
        if self.quantity != other.quantity {
            return Err(ScoreError::QuantityMismatch {
                expected: self.quantity.external_ref().to_string(),
                found: other.quantity.external_ref().to_string(),
            });
        }
        if self.scale == other.scale {
            for component in other.components.values() {
                self.add_component(component.clone())?;
            }
            return Ok(());
        }
        self.bake_scale();
        for component in other.components.values() {
            let mut component = component.clone();
            component.rescale(other.scale);
            self.add_component(component)?;
        }
        Ok(())
    }

    /// Flatten with the default tolerance
    pub fn flatten(&self) -> Result<Self, ScoreError> {
        self.flatten_with_tolerance(DEFAULT_FLATTEN_TOLERANCE)
    }

    /// Rewrite nested summaries into flat detailed scores keyed by flow.
    ///
    /// Summaries with a plain numeric unit score are kept as summaries. The
    /// flattened total must match [`LciaResult::total`] within `tolerance`
    /// relative to that total. A zero tolerance demands an exact match.
    pub fn flatten_with_tolerance(&self, tolerance: f64) -> Result<Self, ScoreError> {
        let mut flat = Self::new(self.quantity.clone());
        flat.scenario.clone_from(&self.scenario);
        self.flatten_into(&mut flat, 1.0)?;

        let expected = self.total();
        let actual = flat.total();
        if !totals_agree(expected, actual, self.gross(), tolerance) {
            tracing::warn!(expected, actual, "flattened total drifted");
            return Err(ScoreError::NumericInconsistency { expected, actual });
        }
        Ok(flat)
    }

    fn flatten_into(&self, out: &mut Self, factor: f64) -> Result<(), ScoreError> {
        let factor = factor * self.scale;
        for component in self.components.values() {
            match component {
                ScoreComponent::Detailed(aggregate) => {
                    for detail in &aggregate.details {
                        out.add_detail(EntityKey::from(&detail.flow), detail.scaled(factor))?;
                    }
                }
                ScoreComponent::Summary(summary) => match &summary.unit_score {
                    UnitScore::Nested(inner) => inner.flatten_into(out, factor * summary.node_weight)?,
                    UnitScore::Value(v) => {
                        out.add_summary(summary.entity.clone(), summary.node_weight * factor, UnitScore::Value(*v))?;
                    }
                },
            }
        }
        Ok(())
    }

    /// Sum of absolute detail scores through every nesting level
    fn gross(&self) -> f64 {
        let sum: f64 = self
            .components
            .values()
            .map(|component| match component {
                ScoreComponent::Detailed(aggregate) => aggregate.details.iter().map(|d| d.result().abs()).sum(),
                ScoreComponent::Summary(summary) => match &summary.unit_score {
                    UnitScore::Nested(inner) => summary.node_weight.abs() * inner.gross(),
                    UnitScore::Value(v) => (summary.node_weight * v).abs(),
                },
            })
            .sum();
        self.scale.abs() * sum
    }

    fn bake_scale(&mut self) {
        if self.scale != 1.0 {
            for component in self.components.values_mut() {
                component.rescale(self.scale);
            }
            self.scale = 1.0;
        }
    }
}
