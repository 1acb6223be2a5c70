//! `cohort-grouping`: constrained grouping engine.
//!
//! Pure engine crate: receives pre-loaded items, returns disjoint matches
//! whose weights fall within a configured range. Partition search over
//! ordered attributes, conflict-free selection, ancestor merge repair and a
//! randomized bin-covering splitter. No CLI dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod existing;
pub mod export;
pub mod merge;
pub mod model;
pub mod partition;
pub mod roster;
pub mod select;
pub mod split;
pub mod summary;

pub use config::{CohortConfig, GroupingConfig, SizeBounds};
pub use engine::{group_items, run};
pub use error::GroupingError;
pub use model::{GroupingResult, Item, ItemId, ItemStore, Match, MatchSource};
