//! Configuration management
//!
//! The topology and policy parameters live in a single TOML file that is
//! read once at startup. Nothing here is consulted on the packet path.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    from_toml(&content)
}

/// Parse configuration from TOML text
pub fn from_toml(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Load and validate; any validation error is fatal.
pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<(Config, ValidationResult)> {
    let config = load(path)?;
    let validation = validate(&config);
    if validation.has_errors() {
        return Err(Error::Config(validation.errors.join("; ")));
    }
    Ok((config, validation))
}
