#![deny(warnings)]

//! The allocation engine: turns a pool of bills and a payment order into a
//! scored, constraint-checked, split-aware selection.

mod constraints;
mod engine;
mod splitter;

pub use constraints::{
    constraints_satisfied, count_cap_ok, is_close_enough, prefilter_indices, split_admissible,
    small_ticket_coverage_ok,
};
pub use engine::{Engine, EngineError};
pub use splitter::{SplitOutcome, MAX_SPLIT_ITERATIONS};
