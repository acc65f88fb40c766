//! Flow, quantity and process references
//!
//! These are lightweight handles onto entities owned by an external catalog.
//! Equality and hashing use the external reference only, so two handles
//! fetched from different lookups compare equal when they name the same entity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EntityError;

/// Reference to a quantity (mass, energy, an impact category, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityRef {
    external_ref: String,
    name: String,
    unit: String,
}

impl QuantityRef {
    /// Create a quantity reference
    #[must_use]
    pub fn new(external_ref: impl Into<String>, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            external_ref: external_ref.into(),
            name: name.into(),
            unit: unit.into(),
        }
    }

    /// Catalog key
    #[inline]
    #[must_use]
    pub fn external_ref(&self) -> &str {
        &self.external_ref
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference unit
    #[inline]
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

impl PartialEq for QuantityRef {
    fn eq(&self, other: &Self) -> bool {
        self.external_ref == other.external_ref
    }
}

impl Eq for QuantityRef {}

impl Hash for QuantityRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.external_ref.hash(state);
    }
}

impl fmt::Display for QuantityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.unit)
    }
}

/// Reference to a flow and its reference quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    external_ref: String,
    name: String,
    reference_quantity: QuantityRef,
}

impl Flow {
    /// Create a flow reference
    #[must_use]
    pub fn new(external_ref: impl Into<String>, name: impl Into<String>, reference_quantity: QuantityRef) -> Self {
        Self {
            external_ref: external_ref.into(),
            name: name.into(),
            reference_quantity,
        }
    }

    /// Catalog key
    #[inline]
    #[must_use]
    pub fn external_ref(&self) -> &str {
        &self.external_ref
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quantity the flow is measured in
    #[inline]
    #[must_use]
    pub fn reference_quantity(&self) -> &QuantityRef {
        &self.reference_quantity
    }
}

impl PartialEq for Flow {
    fn eq(&self, other: &Self) -> bool {
        self.external_ref == other.external_ref
    }
}

impl Eq for Flow {}

impl Hash for Flow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.external_ref.hash(state);
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.reference_quantity.unit)
    }
}

/// Reference to a process in the foreground or background database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRef {
    external_ref: String,
    name: String,
}

impl ProcessRef {
    /// Create a process reference
    #[must_use]
    pub fn new(external_ref: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external_ref: external_ref.into(),
            name: name.into(),
        }
    }

    /// Catalog key
    #[inline]
    #[must_use]
    pub fn external_ref(&self) -> &str {
        &self.external_ref
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for ProcessRef {
    fn eq(&self, other: &Self) -> bool {
        self.external_ref == other.external_ref
    }
}

impl Eq for ProcessRef {}

impl Hash for ProcessRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.external_ref.hash(state);
    }
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Direction of a flow relative to the node it is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Flow enters the node
    Input,
    /// Flow leaves the node
    Output,
}

impl Direction {
    /// Opposite direction, as seen from the other end of the flow
    #[inline]
    #[must_use]
    pub const fn complement(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }

    /// Sign under the "positive = inflow" convention
    #[inline]
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Self::Input => 1.0,
            Self::Output => -1.0,
        }
    }

    /// Direction implied by a signed magnitude (zero counts as input)
    #[inline]
    #[must_use]
    pub fn from_signed(value: f64) -> Self {
        if value < 0.0 {
            Self::Output
        } else {
            Self::Input
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("Input"),
            Self::Output => f.write_str("Output"),
        }
    }
}

impl FromStr for Direction {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "input" | "i" | "in" => Ok(Self::Input),
            "output" | "o" | "out" => Ok(Self::Output),
            _ => Err(EntityError::InvalidDirection(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mass() -> QuantityRef {
        QuantityRef::new("mass", "Mass", "kg")
    }

    #[test]
    fn flow_equality_ignores_name() {
        let a = Flow::new("steel", "Steel", mass());
        let b = Flow::new("steel", "Steel, hot rolled", mass());
        assert_eq!(a, b);
    }

    #[test]
    fn complement_is_involutive() {
        for d in [Direction::Input, Direction::Output] {
            assert_eq!(d.complement().complement(), d);
            assert_ne!(d.complement(), d);
        }
    }

    #[test]
    fn inflow_is_positive() {
        assert!(Direction::Input.sign() > 0.0);
        assert!(Direction::Output.sign() < 0.0);
        assert_eq!(Direction::from_signed(-2.0), Direction::Output);
        assert_eq!(Direction::from_signed(0.0), Direction::Input);
    }

    #[test]
    fn direction_parses_loosely() {
        assert_eq!("Output".parse::<Direction>().unwrap(), Direction::Output);
        assert_eq!("i".parse::<Direction>().unwrap(), Direction::Input);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn flow_serializes_camel_case() {
        let json = serde_json::to_value(Flow::new("co2", "Carbon dioxide", mass())).unwrap();
        assert_eq!(json["externalRef"], "co2");
        assert_eq!(json["referenceQuantity"]["unit"], "kg");
    }
}
