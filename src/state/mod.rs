//! In-memory lifecycle board
//!
//! Keeps every lifecycle started through the API addressable by id and
//! follows their transitions as a notification sink, for lookups, stats and
//! retention pruning.

mod manager;

pub use manager::{LifecycleStats, StateManager};
