//! Fragment traversal
//!
//! Walks a fragment tree under a scenario context and produces one
//! [`FragmentFlow`] per visited node:
//! - reference nodes are reciprocal (`magnitude = 1 / ev` at unit upstream)
//! - balance flows absorb whatever their parent's other flows leave over
//! - sub-fragments are inlined or aggregated, with their boundary flows
//!   matched against the terminated node's own children
//! - background sub-fragments stand in for the node that terminates to them
//!
//! [`Traversal::fragment_lcia`] scores the records into an [`LciaResult`].
//!
//! # Example
//!
//! ```rust
//! use lca_entity::{Direction, Flow, InMemoryQuantities, QuantityRef, Scenario, TerminationKey};
//! use lca_fragment::{FragmentSpec, FragmentStore, TerminationSpec};
//! use lca_traversal::Traversal;
//!
//! let mass = QuantityRef::new("mass", "Mass", "kg");
//! let mut store = FragmentStore::new();
//! let a = store.create(FragmentSpec::new(Flow::new("frame", "Frame", mass.clone()), Direction::Output))?;
//! store.terminate(a, TerminationKey::Default, TerminationSpec::foreground())?;
//! store.create(FragmentSpec::new(Flow::new("steel", "Steel", mass), Direction::Input).child_of(a).with_value(10.0))?;
//!
//! let quantities = InMemoryQuantities::new();
//! let records = Traversal::new(&store, &quantities).traverse(a, &Scenario::Default, false)?;
//! assert_eq!(records[1].magnitude(), 10.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`LciaResult`]: lca_score::LciaResult

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod lcia;
pub mod record;

pub use config::TraversalConfig;
pub use engine::Traversal;
pub use error::TraversalError;
pub use io::{aggregate_flows, group_io, IoFlow};
pub use record::{FragmentFlow, FragmentFlowView};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
