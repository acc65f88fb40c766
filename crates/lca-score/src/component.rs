//! Score components: detailed exchanges and summaries

use std::fmt;
use std::hash::{Hash, Hasher};

use lca_entity::{Direction, Flow, FragmentId, ProcessRef};
use serde::{Deserialize, Serialize};

use crate::error::ScoreError;
use crate::result::LciaResult;
use crate::within_tolerance;

/// Relative tolerance for "same unit score" / "same node weight"
pub(crate) const LAW_TOLERANCE: f64 = 1e-9;

/// Entity a component is filed under
///
/// Compared by `id` only; `label` is for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityKey {
    id: String,
    label: String,
}

impl EntityKey {
    /// Key with an explicit id and label
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// Key for a fragment
    #[must_use]
    pub fn fragment(id: FragmentId, name: &str) -> Self {
        Self::new(id.to_string(), name)
    }

    /// Identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl From<&Flow> for EntityKey {
    fn from(flow: &Flow) -> Self {
        Self::new(flow.external_ref(), flow.name())
    }
}

impl From<&ProcessRef> for EntityKey {
    fn from(process: &ProcessRef) -> Self {
        Self::new(process.external_ref(), process.name())
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// One characterized exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedScore {
    /// Exchanged flow
    pub flow: Flow,
    /// Direction of the exchange
    pub direction: Direction,
    /// Exchanged amount
    pub exchange: f64,
    /// Characterization factor
    pub factor: f64,
}

impl DetailedScore {
    /// Create a detailed score
    #[must_use]
    pub fn new(flow: Flow, direction: Direction, exchange: f64, factor: f64) -> Self {
        Self {
            flow,
            direction,
            exchange,
            factor,
        }
    }

    /// exchange x factor
    #[inline]
    #[must_use]
    pub fn result(&self) -> f64 {
        self.exchange * self.factor
    }

    /// Same score with the exchange multiplied by `factor`
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            exchange: self.exchange * factor,
            ..self.clone()
        }
    }

    fn same_line(&self, other: &Self) -> bool {
        self.flow == other.flow && self.direction == other.direction && self.factor == other.factor
    }
}

/// Detailed scores grouped under one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    /// Owning entity
    pub entity: EntityKey,
    /// Characterized exchanges
    pub details: Vec<DetailedScore>,
}

impl AggregateScore {
    /// Empty aggregate
    #[must_use]
    pub fn new(entity: EntityKey) -> Self {
        Self {
            entity,
            details: Vec::new(),
        }
    }

    /// Add a detail, folding it into an existing line for the same flow,
    /// direction and factor
    pub fn add(&mut self, detail: DetailedScore) {
        if let Some(line) = self.details.iter_mut().find(|d| d.same_line(&detail)) {
            line.exchange += detail.exchange;
        } else {
            self.details.push(detail);
        }
    }

    /// Sum of detail results
    #[must_use]
    pub fn cumulative_result(&self) -> f64 {
        self.details.iter().map(DetailedScore::result).sum()
    }

    fn rescale(&mut self, factor: f64) {
        for d in &mut self.details {
            d.exchange *= factor;
        }
    }
}

/// Per-unit score of a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum UnitScore {
    /// Plain number
    Value(f64),
    /// Nested result per unit node weight
    Nested(Box<LciaResult>),
}

impl UnitScore {
    /// Numeric value of the unit score
    #[must_use]
    pub fn total(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Nested(result) => result.total(),
        }
    }

    /// Whether two unit scores count as "the same" under the addition law
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nested(a), Self::Nested(b)) => {
                a.quantity() == b.quantity()
                    && a.component_ids().eq(b.component_ids())
                    && within_tolerance(a.total(), b.total(), LAW_TOLERANCE, 0.0)
            }
            _ => within_tolerance(self.total(), other.total(), LAW_TOLERANCE, 0.0),
        }
    }

    /// Sum of two unit scores
    pub fn combine(&self, other: &Self) -> Result<Self, ScoreError> {
        match (self, other) {
            (Self::Nested(a), Self::Nested(b)) => {
                let mut merged = (**a).clone();
                merged.merge(b)?;
                Ok(Self::Nested(Box::new(merged)))
            }
            _ => Ok(Self::Value(self.total() + other.total())),
        }
    }
}

/// node weight x unit score under one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryScore {
    /// Owning entity
    pub entity: EntityKey,
    /// Activity level of the entity
    pub node_weight: f64,
    /// Score per unit node weight
    pub unit_score: UnitScore,
}

impl SummaryScore {
    /// Create a summary
    #[must_use]
    pub fn new(entity: EntityKey, node_weight: f64, unit_score: UnitScore) -> Self {
        Self {
            entity,
            node_weight,
            unit_score,
        }
    }

    /// node weight x unit score
    #[must_use]
    pub fn cumulative_result(&self) -> f64 {
        self.node_weight * self.unit_score.total()
    }

    /// Apply the summary addition law.
    ///
    /// Same unit score: node weights add. Same node weight: unit scores add.
    /// Otherwise the two summaries are inconsistent.
    pub fn try_add(&mut self, other: &Self) -> Result<(), ScoreError> {
        if self.entity != other.entity {
            return Err(ScoreError::EntityMismatch {
                left: self.entity.id().to_string(),
                right: other.entity.id().to_string(),
            });
        }
        if self.unit_score.same_as(&other.unit_score) {
            self.node_weight += other.node_weight;
            return Ok(());
        }
        if within_tolerance(self.node_weight, other.node_weight, LAW_TOLERANCE, 0.0) {
            self.unit_score = self.unit_score.combine(&other.unit_score)?;
            return Ok(());
        }
        Err(ScoreError::InconsistentSummary {
            entity: self.entity.id().to_string(),
            existing_weight: self.node_weight,
            existing_unit: self.unit_score.total(),
            weight: other.node_weight,
            unit: other.unit_score.total(),
        })
    }
}

/// One entry of an [`LciaResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScoreComponent {
    /// Characterized exchanges
    Detailed(AggregateScore),
    /// node weight x unit score
    Summary(SummaryScore),
}

impl ScoreComponent {
    /// Owning entity
    #[must_use]
    pub fn entity(&self) -> &EntityKey {
        match self {
            Self::Detailed(a) => &a.entity,
            Self::Summary(s) => &s.entity,
        }
    }

    /// Unscaled result of this component
    #[must_use]
    pub fn cumulative_result(&self) -> f64 {
        match self {
            Self::Detailed(a) => a.cumulative_result(),
            Self::Summary(s) => s.cumulative_result(),
        }
    }

    /// Fold another component for the same entity into this one
    pub fn absorb(&mut self, other: &Self) -> Result<(), ScoreError> {
        match (self, other) {
            (Self::Detailed(mine), Self::Detailed(theirs)) => {
                for d in &theirs.details {
                    mine.add(d.clone());
                }
                Ok(())
            }
            (Self::Summary(mine), Self::Summary(theirs)) => mine.try_add(theirs),
            (mine, _) => Err(ScoreError::ComponentKindMismatch {
                entity: mine.entity().id().to_string(),
            }),
        }
    }

    pub(crate) fn rescale(&mut self, factor: f64) {
        match self {
            Self::Detailed(a) => a.rescale(factor),
            Self::Summary(s) => s.node_weight *= factor,
        }
    }
}
