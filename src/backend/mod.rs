//! Git namespace backend (C3, §4.3).
//!
//! [`NamespaceBackend`] is the interface [`crate::namespace::Namespace`]
//! programs against; [`git::GitNamespaceBackend`] is the sole shipped
//! implementation, built atop [`sakdb_git::GitRepo`].

mod git;
pub(crate) mod merge_tree;

pub use git::GitNamespaceBackend;

use crate::error::BackendError;

/// Blob I/O and session-branch lifecycle against a named git ref (§4.3).
///
/// Mutating operations take `&mut self`: the backend's in-memory index
/// (the current session's working tree OID) is interior state that only
/// ever has one writer, matching the "single-threaded, cooperative"
/// concurrency model of §5.
pub trait NamespaceBackend {
    /// Read a blob at `path`, walking the currently-readable tree (the
    /// active session branch if `Active`, else the namespace branch).
    /// Returns `None` on any lookup failure along the path (§4.3).
    ///
    /// # Errors
    /// Propagates git object-database failures.
    fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Stage a blob write into the current session index. A no-op if the
    /// blob at `path` under the active session already hashes identically
    /// (IV-8).
    ///
    /// # Errors
    /// Returns [`crate::error::SessionError::IndexMissing`] (wrapped) if no
    /// session is active, or propagates git object-database failures.
    fn write_blob(&mut self, path: &str, value: &[u8]) -> Result<(), BackendError>;

    /// Create a session branch at the namespace branch's current tip and
    /// transition `Idle -> Active` (§4.3).
    ///
    /// # Errors
    /// Returns [`crate::error::SessionError::AlreadyActive`] (wrapped) if a
    /// session is already active.
    fn start_session(&mut self, name: &str) -> Result<(), BackendError>;

    /// Commit the current index onto the session branch if its tree
    /// differs from the session branch's tip; otherwise a no-op.
    ///
    /// # Errors
    /// Returns an `IndexMissing` error (wrapped) if no session is active.
    fn commit(&mut self, msg: &str) -> Result<(), BackendError>;

    /// Final `commit`, then merge the session branch into the namespace
    /// branch (reusing §4.7's merge logic), then delete the session branch
    /// and transition `Active -> Idle`.
    ///
    /// # Errors
    /// Returns an `IndexMissing` error (wrapped) if no session is active,
    /// or propagates merge/git failures.
    fn close_session(&mut self, msg: &str) -> Result<(), BackendError>;

    /// Reset the session branch to the namespace branch's current tip and
    /// reinitialize the index from it, transitioning `Active -> Idle`.
    ///
    /// # Errors
    /// Returns an `IndexMissing` error (wrapped) if no session is active.
    fn rollback(&mut self) -> Result<(), BackendError>;

    /// `true` if a session branch is currently active (§4.3 state machine).
    fn is_active(&self) -> bool;

    /// List every object key under the four-level sharding tree rooted at
    /// `objects_prefix` (e.g. `"<namespace>/objects"`), always against the
    /// committed namespace branch regardless of session state (§4.5
    /// `node_keys`).
    ///
    /// # Errors
    /// Propagates git object-database failures.
    fn node_keys(&self, objects_prefix: &str) -> Result<Vec<String>, BackendError>;
}
