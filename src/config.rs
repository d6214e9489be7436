//! Data-directory resolution for the file store backend.
//!
//! Sources (highest priority first):
//! 1. `NAMEVAULT_HOME` environment variable
//! 2. Default (`~/.namevault`)
//!
//! Per-composite overrides via the store-path annotation take precedence over
//! both; they are handled by the store factory, not here.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolve the default data directory for persisted identity records.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("NAMEVAULT_HOME") {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home.join(".namevault"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_resolves() {
        // Either the env override or the home default must resolve on any
        // machine that has a home directory.
        let dir = data_dir().unwrap();
        assert!(dir.is_absolute() || std::env::var("NAMEVAULT_HOME").is_ok());
    }
}
