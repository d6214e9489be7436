//! Fatal error taxonomy for one reconciliation invocation.
//!
//! Everything here aborts the invocation as a single structured result; no
//! partially mutated graph is ever returned alongside an error. Soft absence
//! (no record found outside require-restore mode, retiring an already-absent
//! entry) is not an error and never appears here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The composite selected a store backend this process does not support.
    #[error("unsupported store type: '{name}' (supported types: 'file', 'memory')")]
    UnsupportedStore { name: String },

    /// Configuration was structurally unusable before any mutation happened.
    #[error("configuration error: {0}")]
    Config(String),

    /// A store backend failed mid-invocation.
    #[error("store operation failed: {0:#}")]
    Store(#[source] anyhow::Error),

    /// Require-restore mode found no records at all for the composition.
    /// Usually a misconfigured override annotation pointing at the wrong key.
    #[error("restore required but no records found for composition '{composition_key}'")]
    RestoreRequired { composition_key: String },

    /// Require-restore mode found no stored external name for one member.
    #[error(
        "restore required but no stored external name for resource '{resource_key}' \
         in composition '{composition_key}'"
    )]
    RestoreRequiredForResource {
        composition_key: String,
        resource_key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offending_keys() {
        let err = Error::RestoreRequiredForResource {
            composition_key: "default/claim1/v1/X/xr1".to_string(),
            resource_key: "bucket".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("default/claim1/v1/X/xr1"));
        assert!(message.contains("bucket"));

        let err = Error::UnsupportedStore {
            name: "awsdynamodb".to_string(),
        };
        assert!(err.to_string().contains("awsdynamodb"));
    }
}
