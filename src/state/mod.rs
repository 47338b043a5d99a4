//! State module for tracking link processing
//!
//! # Components
//!
//! - `LinkState`: the lifecycle of a discovered listing link
//! - `MAX_ATTEMPTS`: the fixed retry ceiling for listing-issue failures

mod link_state;

pub use link_state::{LinkState, MAX_ATTEMPTS};
