//! Core data structures for identity reconciliation.
//!
//! The orchestrator contract (request/response graphs), the persisted record
//! shape, composition keys, and the per-invocation policy all live here.

mod keys;
mod policy;
mod record;
mod request;

pub use keys::CompositionKey;
pub use policy::{BackupScope, DeletionPolicy, ManagementPolicies, MemberPolicy, Policy};
pub use record::{merge_records, IdentityRecord, RecordSet, ResourceKey};
pub use request::{Request, Response, State};
