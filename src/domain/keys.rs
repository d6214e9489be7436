//! Composition keys: the durable lookup key for one composite instance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one top-level composite instance in the store.
///
/// The key is the composite string
/// `{namespace}/{claimName}/{apiVersion}/{kind}/{name}`. The same logical
/// composite must always resolve to the same key across invocations,
/// otherwise restoration silently finds nothing. Override annotations may
/// replace the namespace and kind segments so a migrated composite can keep
/// reading data stored under its previous shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionKey(String);

impl CompositionKey {
    /// Build a key from its five segments.
    pub fn new(
        namespace: &str,
        claim_name: &str,
        api_version: &str,
        kind: &str,
        name: &str,
    ) -> Self {
        Self(format!(
            "{}/{}/{}/{}/{}",
            namespace, claim_name, api_version, kind, name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
