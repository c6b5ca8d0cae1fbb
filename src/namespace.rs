//! Namespace (C5): path construction, metadata, object enumeration, version
//! gating (§4.5).

use crate::backend::NamespaceBackend;
use crate::error::{NamespaceError, SakDbError, VersionError};
use crate::field::{Field, FieldRecord};
use crate::session::{sanitize_timestamps, Session, SessionChanges};

/// This software's own version, compared against a namespace's stored
/// `metadata/version` major component (§4.5, §6).
pub const VERSION: &str = "1.0.0";

const METADATA_VERSION_KEY: &str = "version";
const INIT_SESSION_NAME: &str = "namespace-init";

/// An opaque object identifier (§3).
///
/// By convention a 32-character lowercase hex UUID, but any non-empty
/// string of at least four characters is accepted (the four-level object
/// sharding tree requires at least that many leading characters).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate and wrap `key` (§3: non-empty, at least four leading
    /// characters for path sharding).
    ///
    /// # Errors
    /// Returns [`NamespaceError::InvalidObjectKey`] if `key` is empty or
    /// shorter than four characters. spec.md §9 leaves shorter keys
    /// "undefined"; this crate treats that as a construction-time error
    /// rather than silently truncating or panicking during sharding.
    pub fn new(key: impl Into<String>) -> Result<Self, NamespaceError> {
        let key = key.into();
        if key.is_empty() {
            return Err(NamespaceError::InvalidObjectKey { key, reason: "must not be empty".to_owned() });
        }
        if key.chars().count() < 4 {
            return Err(NamespaceError::InvalidObjectKey {
                key,
                reason: "must have at least four characters for path sharding".to_owned(),
            });
        }
        Ok(Self(key))
    }

    /// Generate a fresh key: a random UUID v4 rendered as 32 lowercase hex
    /// characters (§3 `ObjectKey` convention).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// The raw key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn shard(&self) -> [char; 4] {
        let mut chars = self.0.chars();
        [
            chars.next().expect("validated non-empty"),
            chars.next().expect("validated len >= 4"),
            chars.next().expect("validated len >= 4"),
            chars.next().expect("validated len >= 4"),
        ]
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `<namespace-name>/objects/<k0>/<k1>/<k2>/<k3>/<k>/<data-key>` (§3).
#[must_use]
pub fn object_path(namespace: &str, key: &ObjectKey, data_key: &str) -> String {
    let [a, b, c, d] = key.shard();
    format!("{namespace}/objects/{a}/{b}/{c}/{d}/{key}/{data_key}")
}

/// `<namespace-name>/objects/<k0>/<k1>/<k2>/<k3>` — the four-level sharding
/// root passed to [`NamespaceBackend::node_keys`].
#[must_use]
pub fn objects_root(namespace: &str) -> String {
    format!("{namespace}/objects")
}

/// `<namespace-name>/metadata/<key>` (§3).
#[must_use]
pub fn metadata_path(namespace: &str, key: &str) -> String {
    format!("{namespace}/metadata/{key}")
}

/// Owns a name, a backend, and the blobs reachable through it (§3, §4.5).
pub struct Namespace {
    name: String,
    backend: Box<dyn NamespaceBackend>,
}

impl Namespace {
    /// Open a namespace over `backend`, running the version gate (§4.5):
    /// if `metadata/version` is absent it is written as [`VERSION`] under
    /// an internal session; if present, its major component must not
    /// exceed this software's major component (IV-10, P7).
    ///
    /// # Errors
    /// Returns [`VersionError::Mismatch`] if the stored major version is
    /// newer than [`VERSION`]'s, or propagates backend/encoding failures.
    pub fn open(name: impl Into<String>, backend: Box<dyn NamespaceBackend>) -> Result<Self, SakDbError> {
        let mut namespace = Self { name: name.into(), backend };
        namespace.check_version()?;
        Ok(namespace)
    }

    /// The namespace's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn NamespaceBackend {
        self.backend.as_mut()
    }

    fn check_version(&mut self) -> Result<(), SakDbError> {
        let path = metadata_path(&self.name, METADATA_VERSION_KEY);
        match self.backend.read_blob(&path)? {
            None => {
                let fr = metadata_record(VERSION);
                self.backend.start_session(INIT_SESSION_NAME).map_err(wrap_backend)?;
                self.backend.write_blob(&path, &fr.encode()?.into_bytes()).map_err(wrap_backend)?;
                self.backend.commit("set initial namespace version").map_err(wrap_backend)?;
                self.backend.close_session("set initial namespace version").map_err(wrap_backend)?;
                Ok(())
            }
            Some(bytes) => {
                let fr = FieldRecord::decode(&String::from_utf8_lossy(&bytes))?;
                let stored = fr
                    .and_then(|fr| fr.get(METADATA_VERSION_KEY).cloned())
                    .map(|field| unquote_json_string(&field.payload))
                    .unwrap_or_default();
                check_major_compatible(&stored, VERSION).map(|_| ()).map_err(SakDbError::from)
            }
        }
    }

    /// Read the field record staged (via `session`) or persisted at
    /// `(key, data_key)` (§4.5 `read`).
    ///
    /// # Errors
    /// Propagates backend read or decode failures.
    pub fn read(
        &self,
        key: &ObjectKey,
        data_key: &str,
        session: Option<&Session>,
    ) -> Result<Option<FieldRecord>, SakDbError> {
        let path = object_path(&self.name, key, data_key);
        if let Some(session) = session {
            if let Some(staged) = session.staged(&self.name, &path) {
                return Ok(Some(staged.clone()));
            }
        }
        let bytes = self.backend.read_blob(&path).map_err(wrap_backend)?;
        Ok(match bytes {
            Some(bytes) => FieldRecord::decode(&String::from_utf8_lossy(&bytes))?,
            None => None,
        })
    }

    /// Stage a write for `(key, data_key)` through `session` (§4.5 `write`).
    pub fn write(&self, key: &ObjectKey, data_key: &str, fr: FieldRecord, session: &mut Session) {
        let path = object_path(&self.name, key, data_key);
        session.stage(&self.name, path, fr);
    }

    /// Read a metadata value (§4.5 `get_metadata`): the two-field record at
    /// `metadata/<key>` decoded to the JSON value in its `<key>` field.
    ///
    /// # Errors
    /// Propagates backend read or decode failures.
    pub fn get_metadata(
        &self,
        key: &str,
        session: Option<&Session>,
    ) -> Result<Option<serde_json::Value>, SakDbError> {
        let path = metadata_path(&self.name, key);
        let fr = if let Some(session) = session {
            if let Some(staged) = session.staged(&self.name, &path) {
                Some(staged.clone())
            } else {
                self.read_metadata_blob(&path)?
            }
        } else {
            self.read_metadata_blob(&path)?
        };
        let Some(fr) = fr else { return Ok(None) };
        let Some(field) = fr.get(key) else { return Ok(None) };
        let value = serde_json::from_str(&field.payload).map_err(crate::field::EncodingError::from)?;
        Ok(Some(value))
    }

    fn read_metadata_blob(&self, path: &str) -> Result<Option<FieldRecord>, SakDbError> {
        match self.backend.read_blob(path).map_err(wrap_backend)? {
            Some(bytes) => Ok(FieldRecord::decode(&String::from_utf8_lossy(&bytes))?),
            None => Ok(None),
        }
    }

    /// Stage a metadata write through `session` (§4.5 `set_metadata`): a
    /// two-field record, `_type` naming the value's JSON type and `<key>`
    /// holding the JSON-encoded value.
    ///
    /// # Errors
    /// Propagates JSON serialization failures.
    pub fn set_metadata(
        &self,
        key: &str,
        value: &serde_json::Value,
        session: &mut Session,
    ) -> Result<(), SakDbError> {
        let path = metadata_path(&self.name, key);
        let payload = serde_json::to_string(value).map_err(crate::field::EncodingError::from)?;
        let fr = FieldRecord::new(vec![Field::new("_type", json_string(json_type_name(value))), Field::new(key, payload)]);
        session.stage(&self.name, path, fr);
        Ok(())
    }

    /// Enumerate every object key stored under this namespace's four-level
    /// sharding tree (§4.5 `node_keys`).
    ///
    /// # Errors
    /// Propagates backend read failures.
    pub fn node_keys(&self) -> Result<Vec<ObjectKey>, SakDbError> {
        let raw = self.backend.node_keys(&objects_root(&self.name)).map_err(wrap_backend)?;
        raw.into_iter().map(ObjectKey::new).collect::<Result<_, _>>().map_err(SakDbError::from)
    }

    /// Read the class name recorded at `<key>/_cl` (§4.5 `get_object`,
    /// first half — instantiating the typed object is the collaborator's
    /// job, see §4.8).
    ///
    /// # Errors
    /// Returns [`NamespaceError::ObjectNotFound`] if no `_cl` blob exists
    /// at that key, or propagates decode failures.
    pub fn get_object_class_name(&self, key: &ObjectKey) -> Result<String, SakDbError> {
        let fr = self
            .read(key, "_cl", None)?
            .ok_or_else(|| NamespaceError::ObjectNotFound { key: key.to_string() })?;
        let field = fr.get("_cl").ok_or_else(|| NamespaceError::ObjectNotFound { key: key.to_string() })?;
        Ok(unquote_json_string(&field.payload))
    }

    /// Apply every staged write for this namespace to the backend,
    /// starting a session branch lazily if one is not already active, then
    /// commit (without closing). Used by both an explicit mid-scope
    /// `Session::commit` and the final drain at scope exit (§4.4).
    ///
    /// # Errors
    /// Propagates backend or encoding failures.
    pub(crate) fn drain_staged(
        &mut self,
        session_name: &str,
        message: &str,
        staged: &mut SessionChanges,
    ) -> Result<(), SakDbError> {
        if staged.is_empty() {
            return Ok(());
        }
        if !self.backend.is_active() {
            self.backend.start_session(session_name).map_err(wrap_backend)?;
        }
        for (path, fr) in staged.drain() {
            let current = self.backend.read_blob(&path).map_err(wrap_backend)?;
            let current_fr = match current {
                Some(bytes) => FieldRecord::decode(&String::from_utf8_lossy(&bytes))?,
                None => None,
            };
            let sanitized = match &current_fr {
                Some(current) => sanitize_timestamps(fr, current),
                None => fr,
            };
            self.backend.write_blob(&path, &sanitized.encode()?.into_bytes()).map_err(wrap_backend)?;
        }
        self.backend.commit(message).map_err(wrap_backend)?;
        Ok(())
    }

    /// Merge the backend's active session branch into the namespace branch
    /// and delete it, if one is active. No-op otherwise.
    ///
    /// # Errors
    /// Propagates backend merge failures.
    pub(crate) fn close_if_active(&mut self, message: &str) -> Result<(), SakDbError> {
        if self.backend.is_active() {
            self.backend.close_session(message).map_err(wrap_backend)?;
        }
        Ok(())
    }

    /// Reset the backend's active session branch to the namespace branch
    /// tip, if one is active. No-op otherwise.
    ///
    /// # Errors
    /// Propagates backend failures.
    pub(crate) fn rollback_if_active(&mut self) -> Result<(), SakDbError> {
        if self.backend.is_active() {
            self.backend.rollback().map_err(wrap_backend)?;
        }
        Ok(())
    }
}

fn wrap_backend(err: crate::error::BackendError) -> SakDbError {
    SakDbError::Backend(err)
}

fn metadata_record(version: &str) -> FieldRecord {
    FieldRecord::new(vec![
        Field::new("_type", json_string("str")),
        Field::new(METADATA_VERSION_KEY, json_string(version)),
    ])
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).expect("string always serializes")
}

fn unquote_json_string(payload: &str) -> String {
    serde_json::from_str(payload).unwrap_or_else(|_| payload.to_owned())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "dict",
        serde_json::Value::String(_) => "str",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Null => "null",
    }
}

/// Parse `version` as `MAJOR.MINOR.PATCH` and check its major component
/// does not exceed `supported`'s (§4.5, IV-10).
///
/// # Errors
/// Returns [`VersionError::Malformed`] if either string does not parse, or
/// [`VersionError::Mismatch`] if `version`'s major exceeds `supported`'s.
pub fn check_major_compatible(version: &str, supported: &str) -> Result<u32, VersionError> {
    let (major, _, _) = parse_version(version)?;
    let (supported_major, _, _) = parse_version(supported)?;
    if major > supported_major {
        return Err(VersionError::Mismatch { stored: version.to_owned(), supported: supported.to_owned() });
    }
    Ok(major)
}

fn parse_version(s: &str) -> Result<(u32, u32, u32), VersionError> {
    let parts: Vec<&str> = s.split('.').collect();
    let [major, minor, patch] = parts[..] else {
        return Err(VersionError::Malformed { raw: s.to_owned() });
    };
    let parse = |p: &str| p.parse::<u32>().map_err(|_| VersionError::Malformed { raw: s.to_owned() });
    Ok((parse(major)?, parse(minor)?, parse(patch)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GitNamespaceBackend;
    use sakdb_git::GixRepo;

    fn namespace(name: &str) -> (tempfile::TempDir, Namespace) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = GixRepo::open_or_init_bare(dir.path()).expect("init repo");
        let backend = GitNamespaceBackend::new(Box::new(repo), "master").expect("backend");
        let namespace = Namespace::open(name, Box::new(backend)).expect("open namespace");
        (dir, namespace)
    }

    #[test]
    fn object_key_rejects_short() {
        assert!(ObjectKey::new("abc").is_err());
        assert!(ObjectKey::new("").is_err());
        assert!(ObjectKey::new("abcd").is_ok());
    }

    #[test]
    fn object_path_shards_by_leading_chars() {
        let key = ObjectKey::new("abcdefgh").unwrap();
        assert_eq!(object_path("data", &key, "meta"), "data/objects/a/b/c/d/abcdefgh/meta");
    }

    #[test]
    fn open_writes_initial_version() {
        let (_dir, ns) = namespace("data");
        let version = ns.get_metadata("version", None).unwrap().unwrap();
        assert_eq!(version, serde_json::Value::String(VERSION.to_owned()));
    }

    #[test]
    fn version_gate_rejects_newer_major() {
        assert!(check_major_compatible("2.0.0", "1.0.0").is_err());
        assert!(check_major_compatible("1.9.9", "1.0.0").is_ok());
    }

    #[test]
    fn read_without_session_returns_persisted_value() {
        let (_dir, ns) = namespace("data");
        let key = ObjectKey::new("abcdefgh").unwrap();
        assert_eq!(ns.read(&key, "meta", None).unwrap(), None);
    }
}
