//! Session (C4): in-memory write-through staging above the git backend (§4.4).

use std::collections::HashMap;

use crate::field::{Field, FieldRecord};
use crate::merge;

/// Per-namespace staged writes, keyed by `NodePath`, not yet applied to any
/// backend (§4.4).
pub type SessionChanges = HashMap<String, FieldRecord>;

/// Groups writes into a dedicated session branch; commit / rollback / close
/// semantics (§4.4).
///
/// A `Session` never touches a backend directly — [`crate::graph::Graph`]
/// drains staged changes into each touched [`crate::namespace::Namespace`]'s
/// backend on explicit [`crate::graph::SessionHandle::commit`] or on scope
/// exit.
pub struct Session {
    name: String,
    default_message: String,
    changes: HashMap<String, SessionChanges>,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>, default_message: impl Into<String>) -> Self {
        Self { name: name.into(), default_message: default_message.into(), changes: HashMap::new() }
    }

    /// The session's logical name (used to derive the backend session
    /// branch name, §3 Branch layout).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The commit message used when no explicit message is supplied to
    /// `commit`/`close`.
    #[must_use]
    pub fn default_message(&self) -> &str {
        &self.default_message
    }

    /// Stage a write for `path` in `namespace` (§4.4 steps 1-3):
    /// timestamp-sanitize `new` against whatever is already staged for that
    /// path, then replace the staged entry with `merge(None, new, staged)`.
    pub(crate) fn stage(&mut self, namespace: &str, path: String, new: FieldRecord) {
        let ns_changes = self.changes.entry(namespace.to_owned()).or_default();
        let merged = match ns_changes.get(&path) {
            Some(staged) => {
                let sanitized = sanitize_timestamps(new, staged);
                merge::merge(None, Some(&sanitized), Some(staged))
            }
            None => new,
        };
        ns_changes.insert(path, merged);
    }

    /// The staged field record for `path` in `namespace`, if any (consulted
    /// before falling through to the backend on reads, §4.4).
    #[must_use]
    pub(crate) fn staged(&self, namespace: &str, path: &str) -> Option<&FieldRecord> {
        self.changes.get(namespace)?.get(path)
    }

    /// Names of every namespace this session has staged a write for.
    pub(crate) fn touched_namespaces(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    /// Mutable access to one namespace's staged-change map, draining it as
    /// changes are applied to a backend.
    pub(crate) fn changes_for_mut(&mut self, namespace: &str) -> &mut SessionChanges {
        self.changes.entry(namespace.to_owned()).or_default()
    }
}

/// Copy `reference`'s `ts` onto any field in `new` whose key matches and
/// whose `crc` is identical, leaving all other fields untouched (IV-9, P6).
pub(crate) fn sanitize_timestamps(new: FieldRecord, reference: &FieldRecord) -> FieldRecord {
    let fields: Vec<Field> = new
        .into_fields()
        .into_iter()
        .map(|mut field| {
            if let Some(existing) = reference.get(&field.key) {
                if existing.crc == field.crc {
                    field.ts = existing.ts;
                }
            }
            field
        })
        .collect();
    FieldRecord::new(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    #[test]
    fn sanitize_preserves_ts_for_identical_content() {
        let reference = FieldRecord::new(vec![Field::with_ts(10.0, "k", "\"v\"")]);
        let new = FieldRecord::new(vec![Field::with_ts(99.0, "k", "\"v\"")]);
        let sanitized = sanitize_timestamps(new, &reference);
        assert_eq!(sanitized.get("k").unwrap().ts, 10.0);
    }

    #[test]
    fn sanitize_leaves_changed_content_alone() {
        let reference = FieldRecord::new(vec![Field::with_ts(10.0, "k", "\"old\"")]);
        let new = FieldRecord::new(vec![Field::with_ts(99.0, "k", "\"new\"")]);
        let sanitized = sanitize_timestamps(new, &reference);
        assert_eq!(sanitized.get("k").unwrap().ts, 99.0);
    }

    #[test]
    fn stage_merges_onto_previous_staged_value() {
        let mut session = Session::new("s", "msg");
        session.stage("ns", "p".to_owned(), FieldRecord::new(vec![Field::with_ts(1.0, "a", "\"1\"")]));
        session.stage("ns", "p".to_owned(), FieldRecord::new(vec![Field::with_ts(2.0, "b", "\"2\"")]));
        let staged = session.staged("ns", "p").unwrap();
        assert_eq!(staged.keys(), vec!["a", "b"]);
    }
}
