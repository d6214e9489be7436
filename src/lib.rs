//! namevault - Identity backup/restore engine for declarative composition pipelines
//!
//! When a composition is destroyed and rebuilt from source control, the
//! provider-assigned identities of its members (external names, generated
//! resource names) are lost unless something preserves them. namevault
//! reconciles those identities against a durable store so a rebuilt graph
//! adopts its existing backing resources instead of duplicating them.
//!
//! # Architecture
//!
//! One invocation receives the orchestrator's desired and observed resource
//! graphs and runs a synchronous multi-phase pass:
//! - Retire: drop stored identities for members whose policy flipped to delete
//! - Restore: write stored identities back onto members that lack them
//! - Capture: persist identities that appeared or changed since the last pass
//!
//! Tracking annotations on the members record what has already been captured,
//! restored, or retired, which is what makes repeated invocations idempotent.
//!
//! # Modules
//!
//! - `domain`: Data structures (Request, IdentityRecord, Policy, CompositionKey)
//! - `engine`: The reconciliation pass itself
//! - `resolver`: Composition key and policy resolution from composite metadata
//! - `store`: Persistence backends (file, memory) behind the `IdentityStore` trait
//! - `document`: Typed accessors over the JSON resource documents
//! - `annotations`: Annotation names and tracking helpers
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run one reconciliation over a request read from a file
//! namevault run --request request.json
//!
//! # Or from stdin
//! cat request.json | namevault run
//! ```

pub mod annotations;
pub mod cli;
pub mod config;
pub mod document;
pub mod domain;
pub mod engine;
pub mod error;
pub mod resolver;
pub mod store;

// Re-export main types at crate root for convenience
pub use domain::{
    BackupScope, CompositionKey, IdentityRecord, Policy, RecordSet, Request, Response, State,
};
pub use engine::Reconciler;
pub use error::Error;
pub use store::{open_store, FileStore, IdentityStore, MemoryStore};
