//! Traversal configuration

use serde::{Deserialize, Serialize};

/// Numeric and safety settings of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Magnitudes below this are treated as zero
    pub zero_threshold: f64,
    /// Relative tolerance of the flatten total check
    pub flatten_tolerance: f64,
    /// Reject sub-fragment cycles reachable under the traversed scenario
    /// before traversing
    pub check_subfragment_cycles: bool,
}

impl TraversalConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a zero threshold
    #[inline]
    #[must_use]
    pub fn with_zero_threshold(mut self, threshold: f64) -> Self {
        self.zero_threshold = threshold;
        self
    }

    /// With a flatten tolerance
    #[inline]
    #[must_use]
    pub fn with_flatten_tolerance(mut self, tolerance: f64) -> Self {
        self.flatten_tolerance = tolerance;
        self
    }

    /// With or without the static cycle check
    #[inline]
    #[must_use]
    pub fn with_cycle_check(mut self, check: bool) -> Self {
        self.check_subfragment_cycles = check;
        self
    }

    /// Whether `value` counts as zero
    #[inline]
    #[must_use]
    pub fn is_zero(&self, value: f64) -> bool {
        value.abs() < self.zero_threshold
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            zero_threshold: 1e-16,
            flatten_tolerance: 1e-6,
            check_subfragment_cycles: true,
        }
    }
}
