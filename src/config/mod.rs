//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use auction_ingest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("auction-ingest.toml")).unwrap();
//! println!("Database: {}", config.database.path);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArtifactsConfig, BringATrailerConfig, BrowserConfig, CarsAndBidsConfig, Config,
    DatabaseConfig, EbayConfig, HttpConfig, NotifyConfig, PipelineConfig,
};

// Re-export parser functions
pub use parser::{load_config, load_config_with_hash, parse_config};
