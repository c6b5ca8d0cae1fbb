//! Shared three-way git-tree merge, reused by [`super::git::GitNamespaceBackend::close_session`]
//! and by [`crate::sync::SyncEngine`] (§4.3, §4.7b).
//!
//! Both call sites need the same operation: given a `base`/`ours`/`theirs`
//! commit triple, compute a merged tree where non-conflicting path changes
//! are taken from whichever side changed them, and conflicting paths are
//! resolved by decoding both blobs as [`crate::field::FieldRecord`]s and
//! calling [`crate::merge::merge`].

use std::collections::BTreeMap;

use sakdb_git::{GitOid, GitRepo, TreeEdit};

use crate::error::BackendError;
use crate::merge::merge_blobs;

/// Flatten a tree recursively into `path -> blob oid`, joining path
/// components with `/`. Only blob entries are included; subtrees are
/// descended into rather than emitted.
pub(crate) fn flatten_tree(repo: &dyn GitRepo, tree: GitOid) -> Result<BTreeMap<String, GitOid>, BackendError> {
    let mut out = BTreeMap::new();
    flatten_into(repo, tree, "", &mut out)?;
    Ok(out)
}

fn flatten_into(
    repo: &dyn GitRepo,
    tree: GitOid,
    prefix: &str,
    out: &mut BTreeMap<String, GitOid>,
) -> Result<(), BackendError> {
    for entry in repo.read_tree(tree).map_err(BackendError::Git)? {
        let path = if prefix.is_empty() { entry.name.clone() } else { format!("{prefix}/{}", entry.name) };
        match entry.mode {
            sakdb_git::EntryMode::Blob => {
                out.insert(path, entry.oid);
            }
            sakdb_git::EntryMode::Tree => {
                flatten_into(repo, entry.oid, &path, out)?;
            }
        }
    }
    Ok(())
}

/// Compute a merge commit for `ours`/`theirs` against common ancestor
/// `base` (`None` if there is none), resolving conflicting paths via the
/// field-record merge function. Does not update any ref; the caller
/// decides where the resulting commit is pointed.
///
/// # Errors
/// Propagates git object-database failures and field-record
/// encode/decode failures from conflicting blobs.
pub(crate) fn three_way_merge_commit(
    repo: &dyn GitRepo,
    base: Option<GitOid>,
    ours: GitOid,
    theirs: GitOid,
    message: &str,
) -> Result<GitOid, BackendError> {
    let base_tree = match base {
        Some(commit) => Some(repo.read_commit(commit).map_err(BackendError::Git)?.tree_oid),
        None => None,
    };
    let ours_commit = repo.read_commit(ours).map_err(BackendError::Git)?;
    let theirs_commit = repo.read_commit(theirs).map_err(BackendError::Git)?;

    let base_map = match base_tree {
        Some(t) => flatten_tree(repo, t)?,
        None => BTreeMap::new(),
    };
    let ours_map = flatten_tree(repo, ours_commit.tree_oid)?;
    let theirs_map = flatten_tree(repo, theirs_commit.tree_oid)?;

    let mut paths: Vec<&String> = ours_map.keys().collect();
    for key in theirs_map.keys() {
        if !ours_map.contains_key(key) {
            paths.push(key);
        }
    }

    let mut edits = Vec::with_capacity(paths.len());
    for path in paths {
        let ours_oid = ours_map.get(path).copied();
        let theirs_oid = theirs_map.get(path).copied();
        let resolved = match (ours_oid, theirs_oid) {
            (Some(o), Some(t)) if o == t => o,
            (Some(o), None) => o,
            (None, Some(t)) => t,
            (Some(ours_oid), Some(theirs_oid)) => {
                tracing::debug!(path, "resolving conflicting blob via field merge");
                let base_oid = base_map.get(path).copied();
                let base_bytes = base_oid.map(|o| repo.read_blob(o)).transpose().map_err(BackendError::Git)?;
                let ours_bytes = repo.read_blob(ours_oid).map_err(BackendError::Git)?;
                let theirs_bytes = repo.read_blob(theirs_oid).map_err(BackendError::Git)?;
                let merged_bytes = merge_blobs(base_bytes.as_deref(), Some(&ours_bytes), Some(&theirs_bytes))
                    .map_err(|e| BackendError::FieldMerge { path: path.clone(), message: e.to_string() })?;
                repo.write_blob(&merged_bytes).map_err(BackendError::Git)?
            }
            (None, None) => unreachable!("path came from the union of ours and theirs"),
        };
        edits.push(TreeEdit::Upsert { path: path.clone(), oid: resolved });
    }

    let merged_tree = repo.edit_tree(None, &edits).map_err(BackendError::Git)?;
    let parents: Vec<GitOid> = if ours == theirs { vec![ours] } else { vec![ours, theirs] };
    repo.create_commit(merged_tree, &parents, message, None).map_err(BackendError::Git)
}
