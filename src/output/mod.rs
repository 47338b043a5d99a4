//! Output module for run summaries
//!
//! Per-site link statistics are logged at the end of every run and printed by
//! `--stats`.

pub mod stats;

pub use stats::{load_statistics, log_statistics, print_statistics, LinkStatistics};
