//! SakDb: a decentralized, typed object graph persisted as field-record
//! blobs inside a git-compatible object database, synchronized across
//! remotes via a field-level last-writer-wins merge (§1, §2).
//!
//! # Layout
//!
//! - [`field`] (C1) — the wire format for one blob's worth of fields.
//! - [`merge`] (C2) — the three-way, field-keyed, timestamp-ordered merge.
//! - [`backend`] (C3) — the git-backed [`backend::NamespaceBackend`] and its
//!   session-branch state machine.
//! - [`session`] (C4) — staged writes scoped to one [`graph::Graph::session`] call.
//! - [`namespace`] (C5) — object paths, metadata, version gating.
//! - [`graph`] (C6) — namespace/class registries and the active session slot.
//! - [`sync`] (C7) — propagating branches to and from remotes.
//! - [`object`] (C8) — the typed-object encoding convention and class registry.
//! - [`config`] — on-disk configuration.
//! - [`error`] — the crate-wide error taxonomy (§7).

#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod error;
pub mod field;
pub mod graph;
pub mod merge;
pub mod namespace;
pub mod object;
pub mod session;
pub mod sync;

pub use error::SakDbError;
pub use graph::{Graph, SessionHandle};
pub use namespace::{Namespace, ObjectKey, VERSION};
pub use object::{AttributeShape, ClassRegistry, ObjectClass, TypedObject};
pub use sync::{BranchSyncResult, SyncEngine};
