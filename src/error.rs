//! Crate-wide error taxonomy (§7).
//!
//! Each subsystem gets its own `thiserror` enum; [`SakDbError`] composes
//! them into one top-level error type via `#[from]`, matching the teacher's
//! pattern of a single top-level error assembled from per-subsystem leaves.

use thiserror::Error;

pub use crate::field::EncodingError;

/// `NoActiveSession`, `AlreadyActive`, `IndexMissing` (§7).
#[derive(Debug, Error)]
pub enum SessionError {
    /// A write was attempted outside any active session.
    #[error("no active session")]
    NoActiveSession,

    /// `graph.session(...)` was called while a session was already active (P8).
    #[error("a session is already active")]
    AlreadyActive,

    /// A backend method that requires `Active` state was called while `Idle`,
    /// or vice versa; an internal-state inconsistency rather than user error.
    #[error("backend session index missing or in the wrong state: {detail}")]
    IndexMissing {
        /// What was expected versus observed.
        detail: String,
    },
}

/// Duplicate or unknown class names in the [`crate::graph::Graph`]'s registry.
#[derive(Debug, Error)]
pub enum ClassRegistryError {
    /// A class with this name is already registered (IV-3).
    #[error("class `{name}` is already registered")]
    DuplicateClass {
        /// The colliding class name.
        name: String,
    },

    /// A stored `_cl` field named a class that was never registered.
    #[error("unknown class `{name}`")]
    UnknownClass {
        /// The unregistered class name.
        name: String,
    },
}

/// Namespace registration and object lookup failures.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// Two namespaces were registered under the same name in one Graph.
    #[error("namespace `{name}` is already registered")]
    DuplicateNamespace {
        /// The colliding namespace name.
        name: String,
    },

    /// A read/write was addressed to a namespace name with no registration.
    #[error("namespace `{name}` is not registered")]
    UnknownNamespace {
        /// The unregistered namespace name.
        name: String,
    },

    /// `get_object` found no namespace holding the given key.
    #[error("object `{key}` not found")]
    ObjectNotFound {
        /// The object key that was not found.
        key: String,
    },

    /// An `ObjectKey` did not meet the sharding-prefix requirement (§3).
    #[error("invalid object key `{key}`: {reason}")]
    InvalidObjectKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// `VersionMismatch` / `VersionIncompatible` (§7).
#[derive(Debug, Error)]
pub enum VersionError {
    /// A local namespace's stored major version exceeds this software's (P7).
    #[error("namespace version `{stored}` has a major version newer than this software supports (`{supported}`)")]
    Mismatch {
        /// The version string read from `metadata/version`.
        stored: String,
        /// This software's own `VERSION`.
        supported: String,
    },

    /// A remote branch's `metadata/version` is incompatible during sync (§4.7c).
    #[error("remote branch `{branch}` version `{stored}` is incompatible with this software (`{supported}`)")]
    Incompatible {
        /// The remote branch whose version was rejected.
        branch: String,
        /// The version string read from the remote branch.
        stored: String,
        /// This software's own `VERSION`.
        supported: String,
    },

    /// A version string did not parse as `MAJOR.MINOR.PATCH`.
    #[error("malformed version string `{raw}`")]
    Malformed {
        /// The unparseable string.
        raw: String,
    },
}

/// Wrapped failures from the embedded git object database, remote
/// transport, or filesystem (§7).
#[derive(Debug, Error)]
pub enum BackendError {
    /// A failure surfaced by [`sakdb_git::GitRepo`].
    #[error(transparent)]
    Git(#[from] sakdb_git::GitError),

    /// The system `git` CLI (used for remote fetch/push, §10.6) exited
    /// non-zero or could not be spawned.
    #[error("git subprocess for remote `{remote}` failed: {message}")]
    Subprocess {
        /// The remote the command targeted.
        remote: String,
        /// Captured stderr or spawn-failure description.
        message: String,
    },

    /// A conflicting blob at `path` failed to decode or re-encode as a
    /// field record during a three-way tree merge (§4.3, §4.7b).
    #[error("failed to field-merge conflicting blob at `{path}`: {message}")]
    FieldMerge {
        /// The conflicting path within the tree.
        path: String,
        /// The underlying encoding failure.
        message: String,
    },
}

/// An unresolved conflict the field-merge policy cannot settle.
///
/// Reserved per §7: constructible but never returned by the shipped merge
/// algorithm, which always produces a result for every input combination.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Placeholder variant so the enum is inhabited without being
    /// constructible by any code path in this crate today.
    #[error("unresolved merge conflict: {detail}")]
    Unresolved {
        /// Freeform description, reserved for future merge strategies.
        detail: String,
    },
}

/// The crate-wide error type.
///
/// `#[non_exhaustive]` so new taxonomy kinds can be added without a breaking
/// change to downstream `match` expressions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SakDbError {
    /// See [`EncodingError`].
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// See [`SessionError`].
    #[error(transparent)]
    Session(#[from] SessionError),

    /// See [`ClassRegistryError`].
    #[error(transparent)]
    ClassRegistry(#[from] ClassRegistryError),

    /// See [`NamespaceError`].
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// See [`VersionError`].
    #[error(transparent)]
    Version(#[from] VersionError),

    /// See [`BackendError`].
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// See [`MergeError`].
    #[error(transparent)]
    Merge(#[from] MergeError),
}

impl From<sakdb_git::GitError> for SakDbError {
    fn from(err: sakdb_git::GitError) -> Self {
        Self::Backend(BackendError::Git(err))
    }
}
