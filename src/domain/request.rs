//! The orchestrator invocation contract.
//!
//! One invocation carries two parallel resource graphs: the desired graph,
//! freshly computed by earlier pipeline steps and mutated here, and the
//! observed graph holding last-known real state. Members are arbitrary
//! structured documents keyed by their pipeline-assigned name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One side of the invocation: a composite document plus its member graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// The top-level composite document, if the orchestrator supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<Value>,

    /// Member documents keyed by pipeline-assigned resource name.
    #[serde(default)]
    pub resources: BTreeMap<String, Value>,
}

/// The orchestrator's request for one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// The target graph; mutated and returned to the orchestrator.
    #[serde(default)]
    pub desired: State,

    /// Last-known real state; read-mostly, tracking annotations may be
    /// stripped from it during retirement.
    #[serde(default)]
    pub observed: State,

    /// Free-form credential material, carried opaquely for store backends
    /// that need it.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: BTreeMap<String, Value>,
}

/// The successful result of one reconciliation pass. Fatal conditions are the
/// `Err` arm of [`crate::engine::Reconciler::reconcile`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The mutated desired graph.
    pub desired: State,

    /// Human-readable status for the orchestrator's audit trail.
    pub message: String,
}
