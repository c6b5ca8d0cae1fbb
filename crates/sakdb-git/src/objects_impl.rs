//! `gix`-backed object read/write operations.

use crate::error::GitError;
use crate::gix_repo::GixRepo;
use crate::types::*;

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

fn from_gix_entry_mode(mode: gix::objs::tree::EntryMode) -> EntryMode {
    match mode.kind() {
        gix::objs::tree::EntryKind::Tree => EntryMode::Tree,
        _ => EntryMode::Blob,
    }
}

fn to_gix_entry_kind(mode: EntryMode) -> gix::objs::tree::EntryKind {
    match mode {
        EntryMode::Blob => gix::objs::tree::EntryKind::Blob,
        EntryMode::Tree => gix::objs::tree::EntryKind::Tree,
    }
}

pub fn read_blob(repo: &GixRepo, oid: GitOid) -> Result<Vec<u8>, GitError> {
    let mut blob = repo
        .repo
        .find_blob(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound { message: format!("blob {oid}: {e}") })?;
    Ok(blob.take_data())
}

pub fn read_tree(repo: &GixRepo, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
    let tree = repo
        .repo
        .find_tree(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound { message: format!("tree {oid}: {e}") })?;

    let mut entries = Vec::new();
    for result in tree.iter() {
        let entry = result.map_err(|e| GitError::BackendError {
            message: format!("failed to decode tree entry: {e}"),
        })?;
        let bytes: [u8; 20] = entry.inner.oid.as_bytes().try_into().expect("SHA1 is 20 bytes");
        entries.push(TreeEntry {
            name: entry.inner.filename.to_string(),
            mode: from_gix_entry_mode(entry.inner.mode),
            oid: GitOid::from_bytes(bytes),
        });
    }
    Ok(entries)
}

pub fn read_commit(repo: &GixRepo, oid: GitOid) -> Result<CommitInfo, GitError> {
    let commit = repo
        .repo
        .find_commit(to_gix_oid(oid))
        .map_err(|e| GitError::NotFound { message: format!("commit {oid}: {e}") })?;

    let decoded = commit
        .decode()
        .map_err(|e| GitError::BackendError { message: format!("failed to decode commit {oid}: {e}") })?;

    Ok(CommitInfo {
        tree_oid: from_gix_oid(decoded.tree()),
        parents: decoded.parents().map(from_gix_oid).collect(),
        message: decoded.message.to_string(),
    })
}

pub fn write_blob(repo: &GixRepo, data: &[u8]) -> Result<GitOid, GitError> {
    let id = repo
        .repo
        .write_blob(data)
        .map_err(|e| GitError::BackendError { message: format!("failed to write blob: {e}") })?;
    Ok(from_gix_oid(id.detach()))
}

pub fn write_tree(repo: &GixRepo, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
    let mut gix_entries: Vec<gix::objs::tree::Entry> = entries
        .iter()
        .map(|e| gix::objs::tree::Entry {
            mode: to_gix_entry_kind(e.mode).into(),
            filename: e.name.as_str().into(),
            oid: to_gix_oid(e.oid),
        })
        .collect();
    // gix requires tree entries sorted by the git tree-entry ordering rules.
    gix_entries.sort();
    let tree = gix::objs::Tree { entries: gix_entries };
    let id = repo
        .repo
        .write_object(&tree)
        .map_err(|e| GitError::BackendError { message: format!("failed to write tree: {e}") })?;
    Ok(from_gix_oid(id.detach()))
}

pub fn create_commit(
    repo: &GixRepo,
    tree: GitOid,
    parents: &[GitOid],
    message: &str,
    update_ref: Option<&RefName>,
) -> Result<GitOid, GitError> {
    let tree_oid = to_gix_oid(tree);
    let parent_oids: Vec<gix::ObjectId> = parents.iter().map(|p| to_gix_oid(*p)).collect();

    let author_sig = repo
        .repo
        .author()
        .ok_or_else(|| GitError::BackendError { message: "no author identity configured".into() })?
        .map_err(|e| GitError::BackendError { message: format!("failed to read author identity: {e}") })?;
    let committer_sig = repo
        .repo
        .committer()
        .ok_or_else(|| GitError::BackendError { message: "no committer identity configured".into() })?
        .map_err(|e| GitError::BackendError { message: format!("failed to read committer identity: {e}") })?;

    match update_ref {
        Some(ref_name) => {
            let id = repo
                .repo
                .commit_as(committer_sig, author_sig, ref_name.as_str(), message, tree_oid, parent_oids)
                .map_err(|e| GitError::BackendError { message: format!("failed to create commit: {e}") })?;
            Ok(from_gix_oid(id.detach()))
        }
        None => {
            let commit = gix::objs::Commit {
                message: message.into(),
                tree: tree_oid,
                author: author_sig.into(),
                committer: committer_sig.into(),
                encoding: None,
                parents: parent_oids.into_iter().collect(),
                extra_headers: Vec::new(),
            };
            let id = repo
                .repo
                .write_object(&commit)
                .map_err(|e| GitError::BackendError { message: format!("failed to create commit: {e}") })?;
            Ok(from_gix_oid(id.detach()))
        }
    }
}
