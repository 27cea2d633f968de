//! pygmalion-core: scenario catalog and condition assignment.
//!
//! The survey shows each participant one of two framing texts per scenario
//! and asks for a rating on the scenario's scale. This crate holds the parts
//! that need no I/O:
//!
//! - [`Catalog`] -- the ordered, fixed list of [`ScenarioDefinition`]s
//! - [`Condition`] and the [`ConditionAssigner`] capability that draws it
//! - [`SessionId`] -- the grouping key a participant's responses share
//!
//! Flow controllers live in `pygmalion-flow`; persistence in `pygmalion-storage`.

pub mod catalog;
pub mod condition;
pub mod error;
pub mod session;

pub use catalog::{Catalog, ScenarioDefinition, ScenarioId};
pub use condition::{Condition, ConditionAssigner, FixedAssigner, RandomAssigner, SequenceAssigner};
pub use error::CatalogError;
pub use session::{SessionId, DEFAULT_SESSION_ID};
