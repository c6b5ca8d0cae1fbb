//! The `gix`-backed implementation of [`GitRepo`].

use std::path::{Path, PathBuf};

use crate::error::GitError;
use crate::repo::GitRepo;
use crate::types::*;

/// A [`GitRepo`] implementation backed by [gix](https://github.com/GitoxideLabs/gitoxide).
///
/// Construct via [`GixRepo::open`] (opens an existing repository) or
/// [`GixRepo::init_bare`] (creates one), matching the "opens or initializes
/// a bare repository" construction step of the namespace backend (§4.3).
pub struct GixRepo {
    pub(crate) repo: gix::Repository,
    path: PathBuf,
}

impl GixRepo {
    /// Open an existing (bare or non-bare) repository at `path`.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo =
            gix::open(path).map_err(|e| GitError::BackendError { message: e.to_string() })?;
        Ok(Self { repo, path: path.to_path_buf() })
    }

    /// Open the bare repository at `path`, initializing it if it does not
    /// already exist.
    pub fn open_or_init_bare(path: &Path) -> Result<Self, GitError> {
        match gix::open(path) {
            Ok(repo) => Ok(Self { repo, path: path.to_path_buf() }),
            Err(_) => {
                let repo = gix::init_bare(path)
                    .map_err(|e| GitError::BackendError { message: e.to_string() })?;
                Ok(Self { repo, path: path.to_path_buf() })
            }
        }
    }
}

impl GitRepo for GixRepo {
    fn read_ref(&self, name: &RefName) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::read_ref(self, name)
    }

    fn write_ref(&self, name: &RefName, oid: GitOid, log_message: &str) -> Result<(), GitError> {
        crate::refs_impl::write_ref(self, name, oid, log_message)
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), GitError> {
        crate::refs_impl::delete_ref(self, name)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, GitOid)>, GitError> {
        crate::refs_impl::list_refs(self, prefix)
    }

    fn rev_parse_opt(&self, spec: &str) -> Result<Option<GitOid>, GitError> {
        crate::refs_impl::rev_parse_opt(self, spec)
    }

    fn read_blob(&self, oid: GitOid) -> Result<Vec<u8>, GitError> {
        crate::objects_impl::read_blob(self, oid)
    }

    fn read_tree(&self, oid: GitOid) -> Result<Vec<TreeEntry>, GitError> {
        crate::objects_impl::read_tree(self, oid)
    }

    fn read_commit(&self, oid: GitOid) -> Result<CommitInfo, GitError> {
        crate::objects_impl::read_commit(self, oid)
    }

    fn write_blob(&self, data: &[u8]) -> Result<GitOid, GitError> {
        crate::objects_impl::write_blob(self, data)
    }

    fn write_tree(&self, entries: &[TreeEntry]) -> Result<GitOid, GitError> {
        crate::objects_impl::write_tree(self, entries)
    }

    fn create_commit(
        &self,
        tree: GitOid,
        parents: &[GitOid],
        message: &str,
        update_ref: Option<&RefName>,
    ) -> Result<GitOid, GitError> {
        crate::objects_impl::create_commit(self, tree, parents, message, update_ref)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
