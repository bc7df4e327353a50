//! Database module: decision log storage.
//!
//! - `model`: raw row shape of the `decisions` table.
//! - `repo`: SQL-only functions over a [`Pool`].
//! - `store`: the [`DecisionStore`] seam used by the card processor.

pub mod model;
pub mod repo;
pub mod store;

pub use repo::*;
pub use store::{DecisionStore, SqliteDecisionStore};
