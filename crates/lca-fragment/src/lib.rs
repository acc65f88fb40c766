//! Fragment model
//!
//! Fragments are nodes of a product-system tree. Each one records a flow
//! observed entering or leaving its parent; a parentless fragment is the
//! reference node of its tree. What a fragment's flow connects to is its
//! [`Termination`], chosen per scenario.
//!
//! The [`FragmentStore`] arena owns every fragment, the parent-to-children
//! index and the operations that keep the model consistent:
//! - at most one balance child per parent
//! - balance flows never take stored exchange values
//! - terminations and cached values are set once
//! - fragments targeted by a termination cannot be deleted
//!
//! # Example
//!
//! ```rust
//! use lca_entity::{Direction, Flow, QuantityRef, Scenario, TerminationKey};
//! use lca_fragment::{FragmentSpec, FragmentStore, TerminationSpec};
//!
//! let mass = QuantityRef::new("mass", "Mass", "kg");
//! let mut store = FragmentStore::new();
//! let a = store.create(FragmentSpec::new(Flow::new("frame", "Frame", mass.clone()), Direction::Output))?;
//! let b = store.create(
//!     FragmentSpec::new(Flow::new("steel", "Steel", mass), Direction::Input)
//!         .child_of(a)
//!         .with_value(10.0),
//! )?;
//! store.terminate(a, TerminationKey::Default, TerminationSpec::foreground())?;
//!
//! let steel = store.get(b)?;
//! assert_eq!(steel.exchange_value(&Scenario::Default, false)?, 10.0);
//! # Ok::<(), lca_fragment::FragmentError>(())
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod fragment;
pub mod graph;
pub mod record;
pub mod store;
pub mod termination;

pub use builder::fragment_from_process;
pub use error::FragmentError;
pub use fragment::{Fragment, FragmentSpec};
pub use graph::SubfragmentGraph;
pub use record::{FragmentRecord, TerminationRecord};
pub use store::FragmentStore;
pub use termination::{ScoreCache, ScoreKey, TargetSpec, TermTarget, Termination, TerminationKind, TerminationSpec};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
