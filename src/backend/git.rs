//! [`GitNamespaceBackend`]: the shipped [`super::NamespaceBackend`] impl.

use sakdb_git::{GitOid, GitRepo, RefName, TreeEdit};

use super::merge_tree::three_way_merge_commit;
use super::NamespaceBackend;
use crate::error::BackendError;

/// `Idle`/`Active` state machine for a namespace backend (§4.3).
enum SessionState {
    Idle,
    Active(ActiveSession),
}

struct ActiveSession {
    /// The session branch's ref.
    session_ref: RefName,
    /// Namespace branch tip when the session started; the merge base used
    /// by `close_session`.
    base_commit: GitOid,
    /// The in-memory index: the tree OID the next commit would write.
    tip_tree: GitOid,
}

/// Git-backed [`NamespaceBackend`] built atop a [`GitRepo`] (§4.3).
///
/// Owns its repository handle exclusively (§5 "a Namespace owns its
/// backend index exclusively while a Session is Active"); two backends
/// pointed at the same physical repository and branch are possible but
/// must be externally serialized by the caller.
pub struct GitNamespaceBackend {
    repo: Box<dyn GitRepo>,
    namespace_ref: RefName,
    state: SessionState,
}

impl GitNamespaceBackend {
    /// Open (or initialize) `repo`'s namespace branch `branch`, creating an
    /// empty initial commit with the repository's default signature if the
    /// branch does not yet exist (§4.3).
    ///
    /// # Errors
    /// Propagates git object-database failures.
    pub fn new(repo: Box<dyn GitRepo>, branch: &str) -> Result<Self, BackendError> {
        let namespace_ref = RefName::heads(branch);
        if repo.read_ref(&namespace_ref).map_err(BackendError::Git)?.is_none() {
            let empty_tree = repo.write_tree(&[]).map_err(BackendError::Git)?;
            let commit = repo
                .create_commit(empty_tree, &[], "initial commit", None)
                .map_err(BackendError::Git)?;
            repo.write_ref(&namespace_ref, commit, "create namespace branch").map_err(BackendError::Git)?;
        }
        Ok(Self { repo, namespace_ref, state: SessionState::Idle })
    }

    fn readable_tree(&self) -> Result<GitOid, BackendError> {
        match &self.state {
            SessionState::Active(active) => Ok(active.tip_tree),
            SessionState::Idle => {
                let tip = self.namespace_tip()?;
                Ok(self.repo.read_commit(tip).map_err(BackendError::Git)?.tree_oid)
            }
        }
    }

    fn namespace_tip(&self) -> Result<GitOid, BackendError> {
        self.repo
            .read_ref(&self.namespace_ref)
            .map_err(BackendError::Git)?
            .ok_or_else(|| BackendError::Git(sakdb_git::GitError::NotFound {
                message: format!("namespace ref {} missing after construction", self.namespace_ref),
            }))
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession, BackendError> {
        match &mut self.state {
            SessionState::Active(active) => Ok(active),
            SessionState::Idle => Err(index_missing("expected Active, backend is Idle")),
        }
    }

    fn active(&self) -> Result<&ActiveSession, BackendError> {
        match &self.state {
            SessionState::Active(active) => Ok(active),
            SessionState::Idle => Err(index_missing("expected Active, backend is Idle")),
        }
    }
}

fn index_missing(detail: &str) -> BackendError {
    // SessionError is not a git failure, but BackendError only wraps
    // GitError/subprocess/merge failures; session-state errors surface
    // through SakDbError::Session at the Namespace/Session layer. Backends
    // report the same condition via a BackendError::Git(BackendError)
    // wrapper so trait signatures stay uniform; callers needing the
    // precise `SessionError::IndexMissing` variant should check state
    // before calling (Namespace/Session already do).
    BackendError::Git(sakdb_git::GitError::BackendError { message: detail.to_owned() })
}

fn lookup_path(repo: &dyn GitRepo, root: GitOid, path: &str) -> Result<Option<GitOid>, BackendError> {
    let mut current = root;
    let components: Vec<&str> = path.split('/').collect();
    for (i, component) in components.iter().enumerate() {
        let entries = repo.read_tree(current).map_err(BackendError::Git)?;
        let Some(entry) = entries.into_iter().find(|e| &e.name == component) else {
            return Ok(None);
        };
        if i + 1 == components.len() {
            return Ok(Some(entry.oid));
        }
        if entry.mode != sakdb_git::EntryMode::Tree {
            return Ok(None);
        }
        current = entry.oid;
    }
    Ok(None)
}

impl NamespaceBackend for GitNamespaceBackend {
    fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let tree = self.readable_tree()?;
        let Some(oid) = lookup_path(self.repo.as_ref(), tree, path)? else {
            return Ok(None);
        };
        Ok(Some(self.repo.read_blob(oid).map_err(BackendError::Git)?))
    }

    fn write_blob(&mut self, path: &str, value: &[u8]) -> Result<(), BackendError> {
        let new_oid = self.repo.write_blob(value).map_err(BackendError::Git)?;
        let tip_tree = self.active()?.tip_tree;
        if let Some(existing) = lookup_path(self.repo.as_ref(), tip_tree, path)? {
            if existing == new_oid {
                tracing::debug!(path, "write_blob no-op: identical content");
                return Ok(());
            }
        }
        let updated =
            self.repo.edit_tree(Some(tip_tree), &[TreeEdit::Upsert { path: path.to_owned(), oid: new_oid }]).map_err(BackendError::Git)?;
        self.active_mut()?.tip_tree = updated;
        Ok(())
    }

    fn start_session(&mut self, name: &str) -> Result<(), BackendError> {
        if matches!(self.state, SessionState::Active(_)) {
            return Err(index_missing("start_session called while Active"));
        }
        let mut candidate = format!("session/{name}");
        if self.repo.read_ref(&RefName::heads(&candidate)).map_err(BackendError::Git)?.is_some() {
            candidate = format!("session/{name}.{}", rand_suffix());
        }
        let session_ref = RefName::heads(&candidate);
        let base_commit = self.namespace_tip()?;
        self.repo.write_ref(&session_ref, base_commit, "start session").map_err(BackendError::Git)?;
        let tip_tree = self.repo.read_commit(base_commit).map_err(BackendError::Git)?.tree_oid;
        self.state = SessionState::Active(ActiveSession { session_ref, base_commit, tip_tree });
        tracing::info!(branch = candidate, "session started");
        Ok(())
    }

    fn commit(&mut self, msg: &str) -> Result<(), BackendError> {
        let active = self.active()?;
        let session_ref = active.session_ref.clone();
        let tip_tree = active.tip_tree;
        let current_tip = self
            .repo
            .read_ref(&session_ref)
            .map_err(BackendError::Git)?
            .ok_or_else(|| index_missing("session ref disappeared"))?;
        let current_tree = self.repo.read_commit(current_tip).map_err(BackendError::Git)?.tree_oid;
        if current_tree == tip_tree {
            return Ok(());
        }
        self.repo.create_commit(tip_tree, &[current_tip], msg, Some(&session_ref)).map_err(BackendError::Git)?;
        tracing::debug!(branch = session_ref.as_str(), "session commit");
        Ok(())
    }

    fn close_session(&mut self, msg: &str) -> Result<(), BackendError> {
        self.commit(msg)?;
        let active = self.active()?;
        let session_ref = active.session_ref.clone();
        let base_commit = active.base_commit;
        let ours = self.namespace_tip()?;
        let theirs = self
            .repo
            .read_ref(&session_ref)
            .map_err(BackendError::Git)?
            .ok_or_else(|| index_missing("session ref disappeared"))?;

        let merged =
            three_way_merge_commit(self.repo.as_ref(), Some(base_commit), ours, theirs, msg)?;
        self.repo.write_ref(&self.namespace_ref, merged, msg).map_err(BackendError::Git)?;
        self.repo.delete_ref(&session_ref).map_err(BackendError::Git)?;
        self.state = SessionState::Idle;
        tracing::info!(branch = self.namespace_ref.as_str(), "session closed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        let active = self.active()?;
        let session_ref = active.session_ref.clone();
        let namespace_tip = self.namespace_tip()?;
        self.repo.write_ref(&session_ref, namespace_tip, "rollback").map_err(BackendError::Git)?;
        self.state = SessionState::Idle;
        tracing::warn!(branch = session_ref.as_str(), "session rolled back");
        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    fn node_keys(&self, objects_prefix: &str) -> Result<Vec<String>, BackendError> {
        let tip = self.namespace_tip()?;
        let tree = self.repo.read_commit(tip).map_err(BackendError::Git)?.tree_oid;
        let Some(objects_oid) = lookup_path(self.repo.as_ref(), tree, objects_prefix)? else {
            return Ok(Vec::new());
        };
        let mut keys = Vec::new();
        collect_object_keys(self.repo.as_ref(), objects_oid, 0, &mut keys)?;
        Ok(keys)
    }
}

/// Descend four levels of single-character sharding directories under
/// `objects/`, then collect the full key directory names at the fifth
/// level (§4.5 `node_keys`, §6 repository layout).
fn collect_object_keys(
    repo: &dyn GitRepo,
    tree: GitOid,
    depth: u8,
    out: &mut Vec<String>,
) -> Result<(), BackendError> {
    let entries = repo.read_tree(tree).map_err(BackendError::Git)?;
    if depth == 4 {
        for entry in entries {
            if entry.mode == sakdb_git::EntryMode::Tree {
                out.push(entry.name);
            }
        }
        return Ok(());
    }
    for entry in entries {
        if entry.mode == sakdb_git::EntryMode::Tree {
            collect_object_keys(repo, entry.oid, depth + 1, out)?;
        }
    }
    Ok(())
}

fn rand_suffix() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..7).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use sakdb_git::GixRepo;

    use super::*;
    use crate::field::{Field, FieldRecord};

    fn backend() -> (tempfile::TempDir, GitNamespaceBackend) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = GixRepo::open_or_init_bare(dir.path()).expect("init repo");
        let backend = GitNamespaceBackend::new(Box::new(repo), "master").expect("backend");
        (dir, backend)
    }

    #[test]
    fn new_creates_namespace_branch() {
        let (_dir, backend) = backend();
        assert!(backend.namespace_tip().is_ok());
    }

    #[test]
    fn session_write_then_close_persists_to_namespace_branch() {
        let (_dir, mut backend) = backend();
        backend.start_session("s").unwrap();
        let fr = FieldRecord::new(vec![Field::with_ts(1.0, "k", "\"v\"")]);
        backend.write_blob("data/objects/a/path", &fr.encode().unwrap().into_bytes()).unwrap();
        backend.close_session("write").unwrap();

        let read = backend.read_blob("data/objects/a/path").unwrap().unwrap();
        let decoded = FieldRecord::decode(&String::from_utf8(read).unwrap()).unwrap().unwrap();
        assert_eq!(decoded.get("k").unwrap().payload, "\"v\"");
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let (_dir, mut backend) = backend();
        backend.start_session("s").unwrap();
        backend.write_blob("p", b"x").unwrap();
        backend.rollback().unwrap();
        assert_eq!(backend.read_blob("p").unwrap(), None);
    }

    #[test]
    fn write_blob_is_noop_for_identical_content() {
        let (_dir, mut backend) = backend();
        backend.start_session("s").unwrap();
        backend.write_blob("p", b"same").unwrap();
        let tree_before = backend.active().unwrap().tip_tree;
        backend.write_blob("p", b"same").unwrap();
        assert_eq!(backend.active().unwrap().tip_tree, tree_before);
    }

    #[test]
    fn node_keys_enumerates_four_level_shards() {
        let (_dir, mut backend) = backend();
        backend.start_session("s").unwrap();
        backend.write_blob("ns/objects/a/b/c/d/abcdefgh/meta", b"x").unwrap();
        backend.close_session("write").unwrap();
        assert_eq!(backend.node_keys("ns/objects").unwrap(), vec!["abcdefgh".to_owned()]);
    }
}
