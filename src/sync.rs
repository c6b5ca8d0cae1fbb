//! Sync engine (C7, §4.7): propagate local branches to remotes and fold
//! remote changes back in, resolving blob conflicts via the three-way
//! field merge.
//!
//! Fetch and push shell out to the system `git` CLI (there is no `gix`
//! transport in [`sakdb_git::GitRepo`]); every other step — ref reads,
//! ancestry checks, tree merges, commit creation — goes through
//! [`GitRepo`] so the object database itself is never touched outside the
//! abstraction boundary.

use std::process::Command;

use sakdb_git::{GitRepo, RefName};

use crate::backend::merge_tree::three_way_merge_commit;
use crate::error::{BackendError, SakDbError, VersionError};
use crate::field::FieldRecord;
use crate::namespace::{self, VERSION};

const SYNCED_PREFIX: &str = "synced/";
const SESSION_PREFIX: &str = "session/";

/// Outcome of syncing one local branch, returned for logging/testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSyncResult {
    /// Local and `synced/<B>` were already identical; nothing to do.
    UpToDate,
    /// `synced/<B>` fast-forwarded onto the local branch tip without a merge.
    FastForwarded,
    /// A three-way merge commit was created on `synced/<B>`.
    Merged,
}

/// Runs the five-step sync algorithm of §4.7 against a single [`GitRepo`].
pub struct SyncEngine<'a> {
    repo: &'a dyn GitRepo,
    remotes: &'a [String],
}

impl<'a> SyncEngine<'a> {
    /// Build a sync engine over `repo`, propagating to `remotes` by name
    /// (as configured in `git remote`).
    #[must_use]
    pub fn new(repo: &'a dyn GitRepo, remotes: &'a [String]) -> Self {
        Self { repo, remotes }
    }

    /// Run the full algorithm: fetch every remote, sync every local branch,
    /// push `synced/<B>` back out, and refetch (§4.7 steps 1-5).
    ///
    /// # Errors
    /// A failure on one branch aborts that branch's sync and is raised
    /// immediately; branches already processed keep their progress (§7).
    pub fn sync(&self) -> Result<Vec<(String, BranchSyncResult)>, SakDbError> {
        for remote in self.remotes {
            self.fetch(remote)?;
        }

        let mut results = Vec::new();
        for branch in self.local_branches()? {
            let result = self.sync_branch(&branch)?;
            for remote in self.remotes {
                self.push_synced(remote, &branch)?;
                self.fetch(remote)?;
            }
            results.push((branch, result));
        }
        Ok(results)
    }

    fn local_branches(&self) -> Result<Vec<String>, SakDbError> {
        let refs = self.repo.list_refs("refs/heads/").map_err(BackendError::Git)?;
        Ok(refs
            .into_iter()
            .map(|(name, _)| name.short().to_owned())
            .filter(|short| !short.starts_with(SYNCED_PREFIX) && !short.starts_with(SESSION_PREFIX))
            .collect())
    }

    /// Step 2 for one branch `b`: ensure `synced/<b>` exists, merge local
    /// onto it, fold in compatible remote `synced/<b>` branches, then
    /// fast-forward `b` onto the result (§4.7 2a-2d).
    fn sync_branch(&self, b: &str) -> Result<BranchSyncResult, SakDbError> {
        let branch_ref = RefName::heads(b);
        let synced_ref = RefName::heads(&format!("{SYNCED_PREFIX}{b}"));

        let branch_tip = self
            .repo
            .read_ref(&branch_ref)
            .map_err(BackendError::Git)?
            .ok_or_else(|| BackendError::Git(sakdb_git::GitError::NotFound { message: branch_ref.to_string() }))?;

        let mut result = if let Some(existing_synced) = self.repo.read_ref(&synced_ref).map_err(BackendError::Git)? {
            self.merge_onto_synced(&synced_ref, existing_synced, branch_tip, &format!("sync: merge {b}"))?
        } else {
            self.repo.write_ref(&synced_ref, branch_tip, "sync: initialize synced branch").map_err(BackendError::Git)?;
            BranchSyncResult::FastForwarded
        };

        for (remote, remote_tip) in self.remote_synced_tips(b)? {
            self.check_version_compatible(&remote, remote_tip, b)?;
            let synced_tip = self.repo.read_ref(&synced_ref).map_err(BackendError::Git)?.expect("just written above");
            let step = self.merge_onto_synced(
                &synced_ref,
                synced_tip,
                remote_tip,
                &format!("sync: merge {b} from {remote}"),
            )?;
            if step != BranchSyncResult::UpToDate {
                result = step;
            }
        }

        let final_synced = self.repo.read_ref(&synced_ref).map_err(BackendError::Git)?.expect("synced ref always set by now");
        self.repo.write_ref(&branch_ref, final_synced, "sync: fast-forward onto synced").map_err(BackendError::Git)?;
        Ok(result)
    }

    /// Merge `incoming` into `synced/<b>` (currently at `synced_tip`),
    /// fast-forwarding instead of creating a merge commit when possible.
    fn merge_onto_synced(
        &self,
        synced_ref: &RefName,
        synced_tip: sakdb_git::GitOid,
        incoming: sakdb_git::GitOid,
        message: &str,
    ) -> Result<BranchSyncResult, SakDbError> {
        if synced_tip == incoming {
            return Ok(BranchSyncResult::UpToDate);
        }
        if self.repo.is_ancestor(synced_tip, incoming).map_err(BackendError::Git)? {
            self.repo.write_ref(synced_ref, incoming, message).map_err(BackendError::Git)?;
            return Ok(BranchSyncResult::FastForwarded);
        }
        if self.repo.is_ancestor(incoming, synced_tip).map_err(BackendError::Git)? {
            return Ok(BranchSyncResult::UpToDate);
        }
        let base = self.repo.merge_base(synced_tip, incoming).map_err(BackendError::Git)?;
        let merged = three_way_merge_commit(self.repo, base, synced_tip, incoming, message)?;
        self.repo.write_ref(synced_ref, merged, message).map_err(BackendError::Git)?;
        Ok(BranchSyncResult::Merged)
    }

    fn remote_synced_tips(&self, b: &str) -> Result<Vec<(String, sakdb_git::GitOid)>, SakDbError> {
        let mut out = Vec::new();
        for remote in self.remotes {
            let prefix = format!("refs/remotes/{remote}/{SYNCED_PREFIX}{b}");
            if let Some(oid) = self.repo.rev_parse_opt(&prefix).map_err(BackendError::Git)? {
                out.push((remote.clone(), oid));
            }
        }
        Ok(out)
    }

    /// §4.7 2c: a remote `synced/<b>` branch must carry a compatible
    /// `metadata/version`. Branch name `b` doubles as the namespace name
    /// here, matching the one-branch-per-namespace convention established
    /// by `GitNamespaceBackend::new`.
    fn check_version_compatible(&self, remote: &str, remote_tip: sakdb_git::GitOid, b: &str) -> Result<(), SakDbError> {
        let commit = self.repo.read_commit(remote_tip).map_err(BackendError::Git)?;
        let path = namespace::metadata_path(b, "version");
        let Some(blob_oid) = lookup_path(self.repo, commit.tree_oid, &path)? else {
            return Ok(());
        };
        let bytes = self.repo.read_blob(blob_oid).map_err(BackendError::Git)?;
        let Some(fr) = FieldRecord::decode(&String::from_utf8_lossy(&bytes))? else {
            return Ok(());
        };
        let Some(field) = fr.get("version") else { return Ok(()) };
        let stored: String = serde_json::from_str(&field.payload).map_err(crate::field::EncodingError::from)?;
        namespace::check_major_compatible(&stored, VERSION).map_err(|_| {
            SakDbError::from(VersionError::Incompatible { branch: format!("{remote}/{SYNCED_PREFIX}{b}"), stored, supported: VERSION.to_owned() })
        })?;
        Ok(())
    }

    fn fetch(&self, remote: &str) -> Result<(), SakDbError> {
        let refspec = format!("+refs/heads/*:refs/remotes/{remote}/*");
        self.run_git(remote, &["fetch", remote, &refspec])
    }

    fn push_synced(&self, remote: &str, b: &str) -> Result<(), SakDbError> {
        let refspec = format!("refs/heads/{SYNCED_PREFIX}{b}:refs/heads/{SYNCED_PREFIX}{b}");
        self.run_git(remote, &["push", remote, &refspec])
    }

    fn run_git(&self, remote: &str, args: &[&str]) -> Result<(), SakDbError> {
        tracing::debug!(remote, args = ?args, "running git subprocess for sync");
        let output = Command::new("git")
            .args(args)
            .current_dir(self.repo.path())
            .output()
            .map_err(|e| BackendError::Subprocess { remote: remote.to_owned(), message: e.to_string() })?;
        if !output.status.success() {
            return Err(BackendError::Subprocess {
                remote: remote.to_owned(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            }
            .into());
        }
        Ok(())
    }
}

fn lookup_path(repo: &dyn GitRepo, root: sakdb_git::GitOid, path: &str) -> Result<Option<sakdb_git::GitOid>, SakDbError> {
    let mut current = root;
    let components: Vec<&str> = path.split('/').collect();
    for (i, component) in components.iter().enumerate() {
        let entries = repo.read_tree(current).map_err(BackendError::Git)?;
        let Some(entry) = entries.into_iter().find(|e| e.name == *component) else {
            return Ok(None);
        };
        if i == components.len() - 1 {
            return Ok(Some(entry.oid));
        }
        current = entry.oid;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_sync_result_equality() {
        assert_eq!(BranchSyncResult::UpToDate, BranchSyncResult::UpToDate);
        assert_ne!(BranchSyncResult::UpToDate, BranchSyncResult::Merged);
    }
}
