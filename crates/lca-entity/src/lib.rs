//! Entity layer for fragment LCA
//!
//! Everything the fragment engine consumes from the outside world:
//! - Stable fragment identifiers
//! - Flow, quantity and process references
//! - Flow directions and scenario keys
//! - Collaborator traits for characterization, background inventories and
//!   entity lookup
//!
//! # Example
//!
//! ```rust
//! use lca_entity::{Direction, Flow, QuantityRef};
//!
//! let mass = QuantityRef::new("mass", "Mass", "kg");
//! let steel = Flow::new("steel", "Steel, hot rolled", mass);
//!
//! assert_eq!(Direction::Input.complement(), Direction::Output);
//! assert_eq!(steel.reference_quantity().unit(), "kg");
//! ```

#![warn(missing_docs)]

pub mod collaborator;
pub mod error;
pub mod flow;
pub mod id;
pub mod memory;
pub mod scenario;

pub use collaborator::{
    BackgroundSolver, Entity, EntityKind, EntityResolver, ExchangeRecord, NullBackground,
    QuantityProvider,
};
pub use error::EntityError;
pub use flow::{Direction, Flow, ProcessRef, QuantityRef};
pub use id::FragmentId;
pub use memory::{Catalog, InMemoryBackground, InMemoryQuantities, InventoryTable};
pub use scenario::{Scenario, ScenarioKey, TerminationKey};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
