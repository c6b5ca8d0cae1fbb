//! Object surface (C8): the field-encoding convention typed objects must
//! follow for merges to stay meaningful (§4.8), plus the class registry and
//! construction hook used by [`crate::graph::Graph::get_object`].

use std::collections::HashMap;

use crate::error::ClassRegistryError;
use crate::field::{Field, FieldRecord};
use crate::namespace::ObjectKey;

/// Name of the single-field blob every typed object stores at `_cl` (§4.8).
pub const CLASS_BLOB_KEY: &str = "_cl";

/// Name of the attribute-union blob every typed object stores at `meta` (§4.8).
pub const META_BLOB_KEY: &str = "meta";

/// Implemented by every typed object shape the object surface can
/// instantiate. The hard core does not dictate attribute access; it only
/// needs a name to store at `_cl` and a way to materialize an instance from
/// `(namespace, key)` once that name has been looked up in the registry.
pub trait ObjectClass {
    /// The name stored in `_cl` and used as the registry key.
    fn class_name() -> &'static str
    where
        Self: Sized;

    /// Build an instance bound to `namespace`/`key`. Does not read any
    /// blobs itself; attribute access happens lazily through whatever API
    /// the concrete type exposes.
    fn instantiate(namespace: String, key: ObjectKey) -> Self
    where
        Self: Sized;
}

/// A type-erased handle to a just-instantiated object, returned by
/// [`crate::graph::Graph::get_object`] (§4.5 `get_object`).
pub trait TypedObject {
    /// The class name this instance was constructed under.
    fn class_name(&self) -> &str;
}

struct Registration {
    name: &'static str,
    construct: Box<dyn Fn(String, ObjectKey) -> Box<dyn TypedObject> + Send + Sync>,
}

/// Maps class names to constructors, so [`crate::graph::Graph`] can
/// instantiate the right concrete type for a `_cl` blob it reads back (§4.6).
#[derive(Default)]
pub struct ClassRegistry {
    by_name: HashMap<String, Registration>,
}

impl ClassRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register class `C`, wrapping its instances behind [`TypedObject`].
    ///
    /// # Errors
    /// Returns [`ClassRegistryError::DuplicateClass`] if a class with this
    /// name is already registered (IV-3).
    pub fn register<C>(&mut self) -> Result<(), ClassRegistryError>
    where
        C: ObjectClass + TypedObject + 'static,
    {
        let name = <C as ObjectClass>::class_name();
        if self.by_name.contains_key(name) {
            return Err(ClassRegistryError::DuplicateClass { name: name.to_owned() });
        }
        let construct: Box<dyn Fn(String, ObjectKey) -> Box<dyn TypedObject> + Send + Sync> =
            Box::new(|namespace, key| Box::new(C::instantiate(namespace, key)));
        self.by_name.insert(name.to_owned(), Registration { name, construct });
        Ok(())
    }

    /// Instantiate the class named `name` bound to `(namespace, key)`.
    ///
    /// # Errors
    /// Returns [`ClassRegistryError::UnknownClass`] if no class with this
    /// name was ever registered.
    pub fn instantiate(
        &self,
        name: &str,
        namespace: String,
        key: ObjectKey,
    ) -> Result<Box<dyn TypedObject>, ClassRegistryError> {
        let registration = self
            .by_name
            .get(name)
            .ok_or_else(|| ClassRegistryError::UnknownClass { name: name.to_owned() })?;
        Ok((registration.construct)(namespace, key))
    }

    /// `true` if a class with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry").field("classes", &self.by_name.keys().collect::<Vec<_>>()).finish()
    }
}

/// The `_cl` blob content for an object of class `class_name` (§4.8).
#[must_use]
pub fn class_record(class_name: &str) -> FieldRecord {
    FieldRecord::new(vec![Field::new(CLASS_BLOB_KEY, json_string(class_name))])
}

/// Read the class name back out of a decoded `_cl` blob, if present.
#[must_use]
pub fn class_name_of(fr: &FieldRecord) -> Option<String> {
    fr.get(CLASS_BLOB_KEY).map(|field| unquote_json_string(&field.payload))
}

/// The JSON type-name tag stored at `_<attr>:type` for a scalar, list, or
/// dict attribute (§4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeShape {
    /// A single value at key `<attr>`.
    Scalar,
    /// Indexed elements at keys `<attr>:<index>`.
    List,
    /// Keyed entries at keys `<attr>:<dict-key>`.
    Dict,
}

impl AttributeShape {
    fn type_tag(self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::Dict => "dict",
        }
    }
}

/// Reassign attribute `attr` on `existing` (the object's current `meta`
/// record, or `None` if this is the first write) to `shape`/`fields`, where
/// `fields` are the data-field suffixes and JSON payloads to write (e.g.
/// `("", payload)` for a scalar, `("0", payload)` for a list element,
/// `("key", payload)` for a dict entry).
///
/// Drops every field with key prefix `_<attr>:type` or `<attr>:` from
/// `existing` first, plus the exact scalar key `<attr>` (§4.8), so a
/// reassignment from a list to a dict (or to a bare scalar) cannot leave
/// stale sibling fields behind without also clobbering a different
/// attribute whose name happens to start with `attr` (e.g. `ab` when
/// reassigning `a`).
#[must_use]
pub fn reassign_attribute(
    existing: Option<&FieldRecord>,
    attr: &str,
    shape: AttributeShape,
    fields: &[(&str, String)],
) -> FieldRecord {
    let mut record = existing.cloned().unwrap_or_else(FieldRecord::empty);
    record.drop_prefix(&format!("_{attr}:type"));
    record.drop_prefix(&format!("{attr}:"));
    record.remove_key(attr);

    let mut new_fields = vec![Field::new(format!("_{attr}:type"), json_string(shape.type_tag()))];
    for (suffix, payload) in fields {
        let key = if suffix.is_empty() { attr.to_owned() } else { format!("{attr}:{suffix}") };
        new_fields.push(Field::new(key, payload.clone()));
    }

    for field in new_fields {
        record.push(field);
    }
    record
}

fn json_string(s: &str) -> String {
    serde_json::to_string(s).expect("string always serializes")
}

fn unquote_json_string(payload: &str) -> String {
    serde_json::from_str(payload).unwrap_or_else(|_| payload.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        namespace: String,
        key: ObjectKey,
    }

    impl ObjectClass for Widget {
        fn class_name() -> &'static str {
            "Widget"
        }

        fn instantiate(namespace: String, key: ObjectKey) -> Self {
            Self { namespace, key }
        }
    }

    impl TypedObject for Widget {
        fn class_name(&self) -> &str {
            "Widget"
        }
    }

    #[test]
    fn registry_rejects_duplicate_class() {
        let mut registry = ClassRegistry::new();
        registry.register::<Widget>().unwrap();
        assert!(matches!(registry.register::<Widget>(), Err(ClassRegistryError::DuplicateClass { .. })));
    }

    #[test]
    fn registry_instantiates_registered_class() {
        let mut registry = ClassRegistry::new();
        registry.register::<Widget>().unwrap();
        let key = ObjectKey::new("abcd1234").unwrap();
        let obj = registry.instantiate("Widget", "ns".to_owned(), key).unwrap();
        assert_eq!(obj.class_name(), "Widget");
    }

    #[test]
    fn registry_rejects_unknown_class() {
        let registry = ClassRegistry::new();
        let key = ObjectKey::new("abcd1234").unwrap();
        assert!(matches!(
            registry.instantiate("Ghost", "ns".to_owned(), key),
            Err(ClassRegistryError::UnknownClass { .. })
        ));
    }

    #[test]
    fn class_record_roundtrips_name() {
        let fr = class_record("Widget");
        assert_eq!(class_name_of(&fr).as_deref(), Some("Widget"));
    }

    #[test]
    fn reassign_scalar_drops_stale_list_fields() {
        let existing = reassign_attribute(
            None,
            "tags",
            AttributeShape::List,
            &[("0", "\"a\"".to_owned()), ("1", "\"b\"".to_owned())],
        );
        assert!(existing.get("tags:0").is_some());

        let reassigned = reassign_attribute(Some(&existing), "tags", AttributeShape::Scalar, &[("", "\"solo\"".to_owned())]);
        assert!(reassigned.get("tags:0").is_none());
        assert!(reassigned.get("tags:1").is_none());
        assert_eq!(reassigned.get("tags").unwrap().payload, "\"solo\"");
    }

    #[test]
    fn reassign_dict_merges_concurrent_keys() {
        let left = reassign_attribute(None, "opts", AttributeShape::Dict, &[("foo", "1".to_owned())]);
        let right = reassign_attribute(None, "opts", AttributeShape::Dict, &[("bar", "2".to_owned())]);
        let merged = crate::merge::merge(None, Some(&left), Some(&right));
        assert!(merged.get("opts:foo").is_some());
        assert!(merged.get("opts:bar").is_some());
    }

    #[test]
    fn reassign_scalar_does_not_clobber_prefix_colliding_attribute() {
        let existing = reassign_attribute(None, "a", AttributeShape::Scalar, &[("", "\"first\"".to_owned())]);
        let existing = reassign_attribute(Some(&existing), "ab", AttributeShape::Scalar, &[("", "\"second\"".to_owned())]);

        let reassigned = reassign_attribute(Some(&existing), "a", AttributeShape::Scalar, &[("", "\"updated\"".to_owned())]);
        assert_eq!(reassigned.get("a").unwrap().payload, "\"updated\"");
        assert_eq!(reassigned.get("ab").unwrap().payload, "\"second\"");
    }
}
