//! Graph (C6): namespace and class registries, plus the single active
//! session slot (§4.6).

use crate::error::{ClassRegistryError, NamespaceError, SakDbError, SessionError};
use crate::field::FieldRecord;
use crate::namespace::{Namespace, ObjectKey};
use crate::object::{ClassRegistry, ObjectClass, TypedObject};
use crate::session::Session;

/// Registries for namespaces and classes, plus the one session slot a
/// [`Graph`] may have active at a time (§4.6).
///
/// Namespaces are kept in registration order (a plain `Vec`, not a
/// `HashMap`) because `get_object` scans them in that order and the first
/// match wins — registration order must be stable for that to be
/// deterministic.
pub struct Graph {
    namespaces: Vec<(String, Namespace)>,
    classes: ClassRegistry,
    current_session: Option<Session>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// An empty graph: no namespaces, no registered classes, no active session.
    #[must_use]
    pub fn new() -> Self {
        Self { namespaces: Vec::new(), classes: ClassRegistry::new(), current_session: None }
    }

    /// Register `namespace` under its own name.
    ///
    /// # Errors
    /// Returns [`NamespaceError::DuplicateNamespace`] if a namespace with
    /// this name is already registered.
    pub fn register_namespace(&mut self, namespace: Namespace) -> Result<(), NamespaceError> {
        if self.find_namespace(namespace.name()).is_some() {
            return Err(NamespaceError::DuplicateNamespace { name: namespace.name().to_owned() });
        }
        self.namespaces.push((namespace.name().to_owned(), namespace));
        Ok(())
    }

    /// Register typed class `C` so `get_object` can instantiate it (IV-3).
    ///
    /// # Errors
    /// Returns [`ClassRegistryError::DuplicateClass`] if a class with this
    /// name is already registered.
    pub fn register_class<C>(&mut self) -> Result<(), ClassRegistryError>
    where
        C: ObjectClass + TypedObject + 'static,
    {
        self.classes.register::<C>()
    }

    fn find_namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|(n, _)| n == name).map(|(_, ns)| ns)
    }

    fn find_namespace_mut(&mut self, name: &str) -> Option<&mut Namespace> {
        self.namespaces.iter_mut().find(|(n, _)| n == name).map(|(_, ns)| ns)
    }

    /// Open a scoped session. Only one may be active at a time.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyActive`] if a session is already open.
    pub fn session(
        &mut self,
        name: impl Into<String>,
        default_message: impl Into<String>,
    ) -> Result<SessionHandle<'_>, SessionError> {
        if self.current_session.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.current_session = Some(Session::new(name, default_message));
        Ok(SessionHandle { graph: self, closed: false })
    }

    /// Read `(key, data_key)` in `namespace`, consulting the active
    /// session's staged changes first (§4.5 `read`).
    ///
    /// # Errors
    /// Propagates backend or decode failures.
    pub fn read(
        &self,
        namespace: &str,
        key: &ObjectKey,
        data_key: &str,
    ) -> Result<Option<FieldRecord>, SakDbError> {
        let ns = self
            .find_namespace(namespace)
            .ok_or_else(|| NamespaceError::UnknownNamespace { name: namespace.to_owned() })?;
        ns.read(key, data_key, self.current_session.as_ref())
    }

    /// Scan registered namespaces in registration order and instantiate the
    /// typed object at the first one holding `key` (§4.5, §4.6 `get_object`).
    ///
    /// # Errors
    /// Returns [`NamespaceError::ObjectNotFound`] if no namespace holds
    /// `key`, or propagates class-registry or backend failures.
    pub fn get_object(&self, key: &ObjectKey) -> Result<Box<dyn TypedObject>, SakDbError> {
        for (name, namespace) in &self.namespaces {
            match namespace.get_object_class_name(key) {
                Ok(class_name) => {
                    return Ok(self.classes.instantiate(&class_name, name.clone(), key.clone())?);
                }
                Err(SakDbError::Namespace(NamespaceError::ObjectNotFound { .. })) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(NamespaceError::ObjectNotFound { key: key.to_string() }.into())
    }
}

/// A scoped session borrowed from its owning [`Graph`] (§4.4).
///
/// Dropping the handle without calling [`close`](Self::close) rolls back
/// every namespace touched during the session — the same outcome as an
/// explicit [`rollback`](Self::rollback) — so a session can never leak an
/// active backend branch or a half-applied write, including across an
/// early return or a panic unwind.
pub struct SessionHandle<'g> {
    graph: &'g mut Graph,
    closed: bool,
}

impl SessionHandle<'_> {
    /// Stage a write through the session (§4.4).
    pub fn write(&mut self, namespace: &str, key: &ObjectKey, data_key: &str, fr: FieldRecord) -> Result<(), SakDbError> {
        let Graph { namespaces, current_session, .. } = &mut *self.graph;
        let ns = namespaces
            .iter_mut()
            .find(|(n, _)| n == namespace)
            .map(|(_, ns)| ns)
            .ok_or_else(|| NamespaceError::UnknownNamespace { name: namespace.to_owned() })?;
        let session = current_session.as_mut().expect("handle implies active session");
        ns.write(key, data_key, fr, session);
        Ok(())
    }

    /// Read `(key, data_key)`, consulting this session's staged changes
    /// first (§4.4).
    ///
    /// # Errors
    /// Propagates backend or decode failures.
    pub fn read(&self, namespace: &str, key: &ObjectKey, data_key: &str) -> Result<Option<FieldRecord>, SakDbError> {
        self.graph.read(namespace, key, data_key)
    }

    /// The session's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.graph.current_session.as_ref().expect("handle implies active session").name()
    }

    /// Drain currently staged writes into each touched namespace's backend
    /// and commit, without closing the namespace's session branch
    /// (scenario: a mid-scope commit that keeps the scope open).
    ///
    /// # Errors
    /// Propagates backend or encoding failures.
    pub fn commit(&mut self, message: Option<&str>) -> Result<(), SakDbError> {
        self.drain_all(message)
    }

    /// Reset every touched namespace's backend session branch and drop all
    /// staged changes, without ending the scope.
    ///
    /// # Errors
    /// Propagates backend failures.
    pub fn rollback(&mut self) -> Result<(), SakDbError> {
        let touched = self.graph.current_session.as_ref().expect("handle implies active session").touched_namespaces();
        for name in &touched {
            if let Some(ns) = self.graph.find_namespace_mut(name) {
                ns.rollback_if_active()?;
            }
            let session = self.graph.current_session.as_mut().expect("handle implies active session");
            session.changes_for_mut(name).clear();
        }
        Ok(())
    }

    /// Final scope exit: drain any remaining staged writes, then close
    /// every touched namespace's backend session branch (merging it into
    /// the namespace branch). Clears the graph's session slot.
    ///
    /// # Errors
    /// On failure, every touched namespace is rolled back before the error
    /// is returned, so a failed close never leaves a half-merged branch.
    pub fn close(mut self) -> Result<(), SakDbError> {
        let result = self.finish();
        self.closed = true;
        result
    }

    fn finish(&mut self) -> Result<(), SakDbError> {
        if let Err(err) = self.drain_all(None) {
            let _ = self.rollback();
            return Err(err);
        }
        let touched = self.graph.current_session.as_ref().expect("handle implies active session").touched_namespaces();
        let default_message =
            self.graph.current_session.as_ref().expect("handle implies active session").default_message().to_owned();
        for name in &touched {
            if let Some(ns) = self.graph.find_namespace_mut(name) {
                if let Err(err) = ns.close_if_active(&default_message) {
                    let _ = self.rollback();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn drain_all(&mut self, message: Option<&str>) -> Result<(), SakDbError> {
        let Graph { namespaces, current_session, .. } = &mut *self.graph;
        let session = current_session.as_mut().expect("handle implies active session");
        let session_name = session.name().to_owned();
        let message = message.map(str::to_owned).unwrap_or_else(|| session.default_message().to_owned());

        let names: Vec<String> = namespaces.iter().map(|(n, _)| n.clone()).collect();
        for name in &names {
            let changes = session.changes_for_mut(name);
            if changes.is_empty() {
                continue;
            }
            let namespace = namespaces
                .iter_mut()
                .find(|(n, _)| n == name)
                .map(|(_, ns)| ns)
                .expect("namespace list did not change during drain");
            namespace.drain_staged(&session_name, &message, changes)?;
        }
        Ok(())
    }
}

impl Drop for SessionHandle<'_> {
    fn drop(&mut self) {
        if !self.closed {
            let touched =
                self.graph.current_session.as_ref().map(Session::touched_namespaces).unwrap_or_default();
            for name in &touched {
                if let Some(ns) = self.graph.find_namespace_mut(name) {
                    let _ = ns.rollback_if_active();
                }
            }
        }
        self.graph.current_session = None;
    }
}
