// src/config/mod.rs
//! Configuration management for the pool miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Validating values serde cannot check
//! - Generating configuration templates
//! - Converting to the typed settings the engine and pool client take
//!
//! The configuration uses TOML format.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and related types that define
/// the miner's configuration structure and behavior.
#[allow(clippy::module_inception)]
pub mod config;

// Re-export key items for easy access
pub use config::{Config, PoolConfig};

use crate::utils::error::MinerError;
use std::path::PathBuf;

/// Loads and validates miner configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
pub fn load(path: impl Into<PathBuf>) -> Result<Config, MinerError> {
    let config = Config::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Generates a commented configuration template
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
