//! Configuration module for broker-sieve
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use broker_sieve::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sieve.toml")).unwrap();
//! println!("Crawling {} sources", config.sources.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, DetectorConfig, HttpConfig, KnowledgeConfig, OutputConfig, Source,
    VerticalFilter,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
