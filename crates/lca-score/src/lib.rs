//! LCIA score aggregation
//!
//! An [`LciaResult`] is a collection of per-entity components scored in one
//! quantity. A component is either:
//! - a detailed score: elementary exchanges times characterization factors
//! - a summary score: node weight times a unit score, where the unit score is a
//!   number or another (nested) result
//!
//! Summaries follow two addition laws (same unit score adds node weights, same
//! node weight adds unit scores) and anything else is an inconsistency.
//! [`LciaResult::flatten`] rewrites a nested tree into flat detailed scores and
//! checks that the total survives.
//!
//! # Example
//!
//! ```rust
//! use lca_entity::{Direction, Flow, QuantityRef};
//! use lca_score::{DetailedScore, EntityKey, LciaResult, UnitScore};
//!
//! let gwp = QuantityRef::new("gwp", "GWP", "kg CO2 eq");
//! let co2 = Flow::new("co2", "CO2", QuantityRef::new("mass", "Mass", "kg"));
//!
//! let mut unit = LciaResult::new(gwp.clone());
//! unit.add_detail(EntityKey::from(&co2), DetailedScore::new(co2.clone(), Direction::Output, 2.0, 1.0))?;
//!
//! let mut result = LciaResult::new(gwp);
//! result.add_summary(EntityKey::new("truck", "Truck"), 3.0, UnitScore::Nested(Box::new(unit)))?;
//!
//! assert_eq!(result.total(), 6.0);
//! assert_eq!(result.flatten()?.total(), 6.0);
//! # Ok::<(), lca_score::ScoreError>(())
//! ```

#![warn(missing_docs)]

pub mod component;
pub mod error;
pub mod result;

pub use component::{AggregateScore, DetailedScore, EntityKey, ScoreComponent, SummaryScore, UnitScore};
pub use error::ScoreError;
pub use result::{LciaResult, DEFAULT_FLATTEN_TOLERANCE};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Relative closeness test used by the addition laws and flatten check.
///
/// `scale` is the magnitude the difference is measured against; exact
/// equality always passes.
#[must_use]
pub fn within_tolerance(expected: f64, actual: f64, tolerance: f64, scale: f64) -> bool {
    if expected == actual {
        return true;
    }
    let reference = scale.max(expected.abs()).max(actual.abs());
    (expected - actual).abs() <= tolerance * reference
}
