//! Field records: the on-blob payload format (§3, §4.1, §6).
//!
//! A [`Field`] is the atom of the merge function: an immutable, timestamped,
//! keyed value. A [`FieldRecord`] is the ordered sequence of fields that one
//! blob encodes. Encoding is line-oriented so textual diffs stay meaningful
//! even though merges are resolved at the field level, not the line level.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Line separator between a field's header and its payload (§6).
const SEPARATOR: char = '&';

/// Errors from encoding or decoding a [`FieldRecord`] (§7 `EncodingError`).
///
/// Both directions share one enum: the wire format is simple enough that
/// encode-time and decode-time failures are both "this header/payload pair
/// is not representable," not meaningfully distinct failure domains.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// A field's header JSON would contain the line separator (`&`).
    #[error("header for field `{key}` contains the `&` separator")]
    SeparatorInHeader {
        /// The offending field's key.
        key: String,
    },

    /// A decoded line had no `&` separator to split on.
    #[error("malformed record line (no `&` separator): {line:?}")]
    MalformedLine {
        /// The raw line that failed to parse.
        line: String,
    },

    /// The header or payload segment of a line was not valid JSON, or the
    /// header JSON was missing a required field.
    #[error("malformed record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Wire header: compact JSON `{"t":...,"k":...,"c":...}` with key order
/// `t,k,c` fixed by field declaration order (§6).
#[derive(Serialize, Deserialize)]
struct Header {
    t: f64,
    k: String,
    c: String,
}

/// An immutable `(ts, key, crc, payload)` tuple — the atom of the merge
/// function (§3).
///
/// Equality is by all four attributes, matching the value-object semantics
/// spec.md describes.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Wall-clock seconds since the Unix epoch (UTC), used to order
    /// conflicting writes during merge.
    pub ts: f64,
    /// Identifies the field within its enclosing [`FieldRecord`].
    pub key: String,
    /// `"md5:"` followed by the lowercase hex digest of `payload`.
    pub crc: String,
    /// Opaque UTF-8 payload; by convention a compact JSON value.
    pub payload: String,
}

impl Field {
    /// Create a field with the given key and payload, auto-deriving `ts`
    /// (current wall-clock time) and `crc` (IV-1).
    #[must_use]
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let crc = crc_of(&payload);
        Self { ts: now_unix_seconds(), key: key.into(), crc, payload }
    }

    /// Create a field with an explicit timestamp, auto-deriving `crc`.
    #[must_use]
    pub fn with_ts(ts: f64, key: impl Into<String>, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let crc = crc_of(&payload);
        Self { ts, key: key.into(), crc, payload }
    }

    /// Create a field with every attribute supplied explicitly (used by
    /// [`decode`] and the merge function, which never recompute `crc`).
    #[must_use]
    pub fn from_parts(ts: f64, key: impl Into<String>, crc: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { ts, key: key.into(), crc: crc.into(), payload: payload.into() }
    }
}

/// `"md5:"` + lowercase hex digest of `payload`'s UTF-8 bytes (IV-1, P2).
#[must_use]
pub fn crc_of(payload: &str) -> String {
    format!("md5:{:x}", md5::compute(payload.as_bytes()))
}

fn now_unix_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// An ordered sequence of [`Field`]s — the on-blob payload (§3).
///
/// Key uniqueness is expected but not enforced by the encoder: callers
/// (the object surface, the merge function) are responsible for maintaining
/// it. [`FieldRecord::get`] always returns the *first* match for a key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldRecord {
    fields: Vec<Field>,
}

impl FieldRecord {
    /// Build a `FieldRecord` from an explicit field list, preserving order.
    #[must_use]
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// An empty record.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// All fields, in encoded order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Consume self, returning the field list.
    #[must_use]
    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    /// `true` if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The first field with the given key, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// All distinct field keys, in first-occurrence order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.fields.iter().filter_map(|f| seen.insert(f.key.as_str()).then_some(f.key.as_str())).collect()
    }

    /// Remove every field whose key begins with `prefix` (used by the
    /// object surface to clear an attribute's old encoding before a
    /// reassignment, §4.8).
    pub fn drop_prefix(&mut self, prefix: &str) {
        self.fields.retain(|f| !f.key.starts_with(prefix));
    }

    /// Remove every field whose key is exactly `key` (used by the object
    /// surface to clear a scalar attribute's data field, which is keyed
    /// exactly `<attr>` rather than under a `<attr>:` prefix, §4.8).
    pub fn remove_key(&mut self, key: &str) {
        self.fields.retain(|f| f.key != key);
    }

    /// Serialize to the wire format (§4.1, §6).
    ///
    /// # Errors
    /// Returns [`EncodingError::SeparatorInHeader`] if any field's header
    /// JSON would contain the `&` line separator.
    pub fn encode(&self) -> Result<String, EncodingError> {
        let mut out = String::new();
        for field in &self.fields {
            let header = Header { t: field.ts, k: field.key.clone(), c: field.crc.clone() };
            let header_json = serde_json::to_string(&header)?;
            if header_json.contains(SEPARATOR) {
                return Err(EncodingError::SeparatorInHeader { key: field.key.clone() });
            }
            let payload_json = serde_json::to_string(&field.payload)?;
            out.push_str(&header_json);
            out.push(SEPARATOR);
            out.push_str(&payload_json);
            out.push('\n');
        }
        // An extra blank line at EOF is intentional (§4.1): it keeps
        // single-field-appended diffs from touching the final line twice.
        out.push('\n');
        Ok(out)
    }

    /// Parse the wire format (§4.1, §6).
    ///
    /// Blank/whitespace-only lines are ignored. Returns `None` if the input
    /// has no non-blank lines (the "absent" case).
    ///
    /// # Errors
    /// Returns [`EncodingError::MalformedLine`] if a non-blank line has no
    /// `&` separator, or [`EncodingError::Json`] if the header or payload
    /// segment fails to parse.
    pub fn decode(data: &str) -> Result<Option<Self>, EncodingError> {
        let mut fields = Vec::new();
        for raw_line in data.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let (header_str, payload_str) = line
                .split_once(SEPARATOR)
                .ok_or_else(|| EncodingError::MalformedLine { line: line.to_owned() })?;
            let header: Header = serde_json::from_str(header_str)?;
            let payload: String = serde_json::from_str(payload_str)?;
            fields.push(Field::from_parts(header.t, header.k, header.c, payload));
        }
        if fields.is_empty() { Ok(None) } else { Ok(Some(Self { fields })) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_auto_derives_from_payload() {
        let f = Field::new("k", "hello");
        assert_eq!(f.crc, crc_of("hello"));
        assert!(f.crc.starts_with("md5:"));
    }

    #[test]
    fn round_trip_preserves_fields_and_order() {
        let fr = FieldRecord::new(vec![
            Field::with_ts(1.0, "a", "\"one\""),
            Field::with_ts(2.0, "b", "\"two\""),
        ]);
        let encoded = fr.encode().unwrap();
        let decoded = FieldRecord::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded.fields(), fr.fields());
    }

    #[test]
    fn encode_ends_with_blank_line() {
        let fr = FieldRecord::new(vec![Field::with_ts(1.0, "a", "\"x\"")]);
        let encoded = fr.encode().unwrap();
        assert!(encoded.ends_with("\n\n"));
    }

    #[test]
    fn decode_ignores_blank_lines() {
        let decoded = FieldRecord::decode("\n   \n\n").unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_rejects_missing_separator() {
        let err = FieldRecord::decode("not-a-valid-line").unwrap_err();
        assert!(matches!(err, EncodingError::MalformedLine { .. }));
    }

    #[test]
    fn encode_rejects_separator_in_header() {
        // A key containing the separator produces header JSON containing it.
        let fr = FieldRecord::new(vec![Field::with_ts(1.0, "a&b", "\"x\"")]);
        let err = fr.encode().unwrap_err();
        assert!(matches!(err, EncodingError::SeparatorInHeader { .. }));
    }

    #[test]
    fn get_returns_first_match() {
        let fr = FieldRecord::new(vec![
            Field::with_ts(1.0, "k", "\"first\""),
            Field::with_ts(2.0, "k", "\"second\""),
        ]);
        assert_eq!(fr.get("k").unwrap().payload, "\"first\"");
    }

    #[test]
    fn drop_prefix_removes_matching_keys_only() {
        let mut fr = FieldRecord::new(vec![
            Field::with_ts(1.0, "tags:0", "\"a\""),
            Field::with_ts(1.0, "tags:1", "\"b\""),
            Field::with_ts(1.0, "name", "\"x\""),
        ]);
        fr.drop_prefix("tags");
        assert_eq!(fr.keys(), vec!["name"]);
    }

    #[test]
    fn remove_key_drops_exact_match_only() {
        let mut fr = FieldRecord::new(vec![
            Field::with_ts(1.0, "a", "\"x\""),
            Field::with_ts(1.0, "ab", "\"y\""),
        ]);
        fr.remove_key("a");
        assert_eq!(fr.keys(), vec!["ab"]);
    }

    #[test]
    fn encode_is_deterministic() {
        let fr = FieldRecord::new(vec![Field::with_ts(1.0, "a", "\"x\"")]);
        assert_eq!(fr.encode().unwrap(), fr.encode().unwrap());
    }
}

/// Randomized generalization of `round_trip_preserves_fields_and_order` over
/// arbitrary field lists, rather than one hand-picked example.
#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    fn arb_field() -> impl Strategy<Value = Field> {
        (0.0f64..1_000_000.0, "[a-z][a-z0-9_]{0,7}", "[a-zA-Z0-9 ]{0,16}")
            .prop_map(|(ts, key, payload)| Field::with_ts(ts, key, payload))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any record whose keys can't contain `&` round-trips through the
        /// wire format exactly, field-for-field (P1).
        #[test]
        fn round_trip_preserves_arbitrary_records(fields in prop::collection::vec(arb_field(), 0..10)) {
            let fr = FieldRecord::new(fields);
            let encoded = fr.encode().unwrap();
            let decoded = FieldRecord::decode(&encoded).unwrap();
            match decoded {
                Some(d) => prop_assert_eq!(d.fields(), fr.fields()),
                None => prop_assert!(fr.is_empty()),
            }
        }
    }
}
