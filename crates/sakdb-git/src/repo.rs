//! The [`GitRepo`] trait — the single abstraction boundary between SakDb and git.
//!
//! All SakDb crates interact with git exclusively through this trait. No
//! other SakDb crate is permitted to import `gix` directly.
//!
//! | Group        | Methods                                               |
//! |--------------|--------------------------------------------------------|
//! | Refs         | `read_ref`, `write_ref`, `delete_ref`, `list_refs`      |
//! | Rev-parse    | `rev_parse_opt`                                         |
//! | Object read  | `read_blob`, `read_tree`, `read_commit`                 |
//! | Object write | `write_blob`, `write_tree`, `create_commit`             |
//! | Tree editing | `edit_tree`                                             |
//! | Ancestry     | `is_ancestor`, `merge_base`                             |

use std::collections::BTreeMap;

use crate::error::GitError;
use crate::types::{CommitInfo, EntryMode, GitOid, RefName, TreeEdit, TreeEntry};

/// The git abstraction trait used by SakDb's namespace backend.
///
/// Implementations may be backed by `gix` (the only one shipped) or a test
/// double. The trait is object-safe: no generic methods, no `Self` in
/// return position outside `Result`.
pub trait GitRepo {
    // -- Refs --

    /// Resolve a ref to its OID, returning `None` if the ref does not exist.
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError>;

    /// Create or overwrite a ref unconditionally. `log_message` is written to
    /// the reflog; pass an empty string if no reflog message is needed.
    fn write_ref(&self, name: &RefName, oid: GitOid, log_message: &str) -> Result<(), GitError>;

    /// Delete a ref. No-op if the ref does not exist.
    fn delete_ref(&self, name: &RefName) -> Result<(), GitError>;

    /// List refs matching a literal prefix (e.g. `"refs/heads/session/"`),
    /// sorted by ref name.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError>;

    // -- Rev-parse --

    /// Resolve a revision spec to an OID, returning `None` if it cannot be
    /// resolved rather than an error.
    fn rev_parse_opt(&self, spec: &str) -> Result<Option<GitOid>, GitError>;

    // -- Object read --

    /// Read the contents of a blob object.
    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError>;

    /// Read the entries of a tree object (one level deep).
    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError>;

    /// Read a commit object's metadata.
    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError>;

    // -- Object write --

    /// Write a blob to the object store and return its OID.
    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError>;

    /// Write a tree object from a list of entries and return its OID.
    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError>;

    /// Create a commit object and optionally update a ref to point to it.
    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
        update_ref: Option<&RefName>,
    ) -> Result<GitOid, GitError>;

    // -- Tree editing --

    /// Apply a set of edits to an existing tree and return the OID of the
    /// resulting tree. Edits may address nested paths; intermediate trees
    /// are created or pruned (when left empty) as needed. `base` of `None`
    /// starts from an empty tree.
    ///
    /// Implemented in terms of [`read_tree`](Self::read_tree) and
    /// [`write_tree`](Self::write_tree) — no backend-specific tree-editor
    /// API is required.
    fn edit_tree(&self, base: Option<GitOid>, edits: &[TreeEdit]) -> Result<GitOid, GitError> {
        apply_tree_edits(self, base, edits)
    }

    // -- Ancestry --

    /// `true` if `ancestor` is reachable from `descendant` following parent
    /// links.
    ///
    /// Implemented in terms of [`read_commit`](Self::read_commit) by walking
    /// the commit graph breadth-first, so a backend only has to get object
    /// reads right to inherit correct ancestry.
    fn is_ancestor(&self, ancestor: GitOid, descendant: GitOid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut frontier = vec![descendant];
        let mut seen = std::collections::HashSet::new();
        seen.insert(descendant);
        while let Some(oid) = frontier.pop() {
            let commit = self.read_commit(oid)?;
            for parent in commit.parents {
                if parent == ancestor {
                    return Ok(true);
                }
                if seen.insert(parent) {
                    frontier.push(parent);
                }
            }
        }
        Ok(false)
    }

    /// The best common ancestor of two commits, or `None` if there is none.
    ///
    /// Walks both commit graphs breadth-first and returns the first OID
    /// common to both frontiers. Sufficient for the sync engine's
    /// up-to-date check (§4.7); not a full lowest-common-ancestor solver for
    /// criss-cross merge bases.
    fn merge_base(&self, a: GitOid, b: GitOid) -> Result<Option<GitOid>, GitError> {
        let ancestors_of = |start: GitOid| -> Result<std::collections::HashSet<GitOid>, GitError> {
            let mut seen = std::collections::HashSet::new();
            let mut frontier = vec![start];
            seen.insert(start);
            while let Some(oid) = frontier.pop() {
                let commit = self.read_commit(oid)?;
                for parent in commit.parents {
                    if seen.insert(parent) {
                        frontier.push(parent);
                    }
                }
            }
            Ok(seen)
        };
        let ancestors_a = ancestors_of(a)?;
        if ancestors_a.contains(&b) {
            return Ok(Some(b));
        }
        let mut frontier = vec![b];
        let mut seen = std::collections::HashSet::new();
        seen.insert(b);
        while let Some(oid) = frontier.pop() {
            if ancestors_a.contains(&oid) {
                return Ok(Some(oid));
            }
            let commit = self.read_commit(oid)?;
            for parent in commit.parents {
                if seen.insert(parent) {
                    frontier.push(parent);
                }
            }
        }
        Ok(None)
    }

    /// Absolute path to the repository (the bare repository root).
    fn path(&self) -> &std::path::Path;
}

/// Recursively rebuild a tree from `base` plus `edits`, grouping edits by
/// their first path component and recursing into subtrees. A subtree left
/// with no entries after edits is pruned from its parent rather than kept
/// as an empty tree entry.
fn apply_tree_edits<R: GitRepo + ?Sized>(
    repo: &R,
    base: Option<GitOid>,
    edits: &[TreeEdit],
) -> Result<GitOid, GitError> {
    let mut entries: BTreeMap<String, TreeEntry> = BTreeMap::new();
    if let Some(base_oid) = base {
        for entry in repo.read_tree(base_oid)? {
            entries.insert(entry.name.clone(), entry);
        }
    }

    let mut subtree_edits: BTreeMap<String, Vec<TreeEdit>> = BTreeMap::new();
    for edit in edits {
        match edit {
            TreeEdit::Upsert { path, oid } => match path.split_once('/') {
                Some((first, rest)) => subtree_edits
                    .entry(first.to_owned())
                    .or_default()
                    .push(TreeEdit::Upsert { path: rest.to_owned(), oid: *oid }),
                None => {
                    entries.insert(
                        path.clone(),
                        TreeEntry { name: path.clone(), mode: EntryMode::Blob, oid: *oid },
                    );
                }
            },
            TreeEdit::Remove { path } => match path.split_once('/') {
                Some((first, rest)) => subtree_edits
                    .entry(first.to_owned())
                    .or_default()
                    .push(TreeEdit::Remove { path: rest.to_owned() }),
                None => {
                    entries.remove(path);
                }
            },
        }
    }

    for (name, sub_edits) in subtree_edits {
        let existing_sub = entries.get(&name).filter(|e| e.mode == EntryMode::Tree).map(|e| e.oid);
        let new_sub_oid = apply_tree_edits(repo, existing_sub, &sub_edits)?;
        if repo.read_tree(new_sub_oid)?.is_empty() {
            entries.remove(&name);
        } else {
            entries.insert(name.clone(), TreeEntry { name, mode: EntryMode::Tree, oid: new_sub_oid });
        }
    }

    let mut entry_vec: Vec<TreeEntry> = entries.into_values().collect();
    entry_vec.sort_by(|a, b| a.name.cmp(&b.name));
    repo.write_tree(&entry_vec)
}
