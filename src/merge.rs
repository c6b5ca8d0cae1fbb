//! Three-way, field-keyed, timestamp-ordered merge (§4.2).
//!
//! This is the conflict-resolution primitive the sync engine (C7) and the
//! session backend's `close_session` (C3) both call whenever two sides of a
//! blob have diverged. It never fails: every input combination has a
//! defined (if sometimes underspecified, per the open questions in spec.md
//! §9) output.

use crate::field::FieldRecord;

/// Reconcile `base`/`ours`/`theirs` into a single [`FieldRecord`] (§4.2).
///
/// - If exactly one of `ours`/`theirs` is present and `base` is absent, that
///   side is returned verbatim, preserving field order.
/// - If both `ours` and `theirs` are present, the result is the union over
///   field keys processed in ascending lexicographic order; for each key the
///   field with the strictly newer `ts` wins, ties favor `theirs` (IV-6).
/// - If only `base` is present, or `base` is present together with exactly
///   one of `ours`/`theirs`, spec.md leaves the outcome an open question.
///   This implementation returns empty / the one present side respectively,
///   logging a `tracing::warn!` each time, per spec.md §9's direction to
///   "surface a warning."
#[must_use]
pub fn merge(base: Option<&FieldRecord>, ours: Option<&FieldRecord>, theirs: Option<&FieldRecord>) -> FieldRecord {
    match (base, ours, theirs) {
        (_, Some(o), Some(t)) => merge_both_present(o, t),
        (None, Some(o), None) => o.clone(),
        (None, None, Some(t)) => t.clone(),
        (Some(_), Some(o), None) => {
            tracing::warn!("merge: base+ours-only branch hit (underspecified, §9); returning ours verbatim");
            o.clone()
        }
        (Some(_), None, Some(t)) => {
            tracing::warn!("merge: base+theirs-only branch hit (underspecified, §9); returning theirs verbatim");
            t.clone()
        }
        (Some(_), None, None) => {
            tracing::warn!("merge: base-only branch hit (underspecified, §9); returning empty record");
            FieldRecord::empty()
        }
        (None, None, None) => FieldRecord::empty(),
    }
}

fn merge_both_present(ours: &FieldRecord, theirs: &FieldRecord) -> FieldRecord {
    let mut keys: Vec<&str> = ours.keys();
    for key in theirs.keys() {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys.sort_unstable();

    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        let winner = match (ours.get(key), theirs.get(key)) {
            (Some(o), Some(t)) => {
                if o.ts > t.ts {
                    o
                } else {
                    t
                }
            }
            (Some(o), None) => o,
            (None, Some(t)) => t,
            (None, None) => unreachable!("key came from the union of ours and theirs"),
        };
        out.push(winner.clone());
    }
    FieldRecord::new(out)
}

/// Convenience for merging two whole namespace-branch trees' worth of
/// conflicting blobs: decode, merge, re-encode. Used by the sync engine and
/// by session close (§4.3, §4.7) wherever a conflicting path needs
/// resolution rather than a straight fast-forward.
///
/// # Errors
/// Propagates [`crate::error::EncodingError`] if any present side fails to
/// decode, or if the merged record fails to encode.
pub fn merge_blobs(
    base: Option<&[u8]>,
    ours: Option<&[u8]>,
    theirs: Option<&[u8]>,
) -> Result<Vec<u8>, crate::field::EncodingError> {
    let decode = |bytes: Option<&[u8]>| -> Result<Option<FieldRecord>, crate::field::EncodingError> {
        match bytes {
            Some(b) => FieldRecord::decode(&String::from_utf8_lossy(b)),
            None => Ok(None),
        }
    };
    let base_fr = decode(base)?;
    let ours_fr = decode(ours)?;
    let theirs_fr = decode(theirs)?;
    let merged = merge(base_fr.as_ref(), ours_fr.as_ref(), theirs_fr.as_ref());
    Ok(merged.encode()?.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn fr(fields: &[(f64, &str, &str)]) -> FieldRecord {
        FieldRecord::new(fields.iter().map(|(ts, k, p)| Field::with_ts(*ts, *k, *p)).collect())
    }

    #[test]
    fn ours_only_no_base_is_verbatim() {
        let ours = fr(&[(1.0, "a", "\"x\"")]);
        let merged = merge(None, Some(&ours), None);
        assert_eq!(merged, ours);
    }

    #[test]
    fn theirs_only_no_base_is_verbatim() {
        let theirs = fr(&[(1.0, "a", "\"x\"")]);
        let merged = merge(None, None, Some(&theirs));
        assert_eq!(merged, theirs);
    }

    #[test]
    fn base_only_is_empty() {
        let base = fr(&[(1.0, "a", "\"x\"")]);
        let merged = merge(Some(&base), None, None);
        assert!(merged.is_empty());
    }

    #[test]
    fn newest_ts_wins_p4() {
        let ours = fr(&[(2.0, "k", "\"new\"")]);
        let theirs = fr(&[(1.0, "k", "\"old\"")]);
        let merged = merge(None, Some(&ours), Some(&theirs));
        assert_eq!(merged.get("k").unwrap().payload, "\"new\"");
    }

    #[test]
    fn tie_favors_theirs() {
        let ours = fr(&[(1.0, "k", "\"ours\"")]);
        let theirs = fr(&[(1.0, "k", "\"theirs\"")]);
        let merged = merge(None, Some(&ours), Some(&theirs));
        assert_eq!(merged.get("k").unwrap().payload, "\"theirs\"");
    }

    #[test]
    fn idempotence_p3() {
        let x = fr(&[(1.0, "a", "\"1\""), (2.0, "b", "\"2\"")]);
        let merged = merge(None, Some(&x), Some(&x));
        assert_eq!(merged.keys(), x.keys());
        for key in x.keys() {
            assert_eq!(merged.get(key).unwrap().payload, x.get(key).unwrap().payload);
        }
    }

    #[test]
    fn determinism_across_order_p5() {
        let x = fr(&[(2.0, "a", "\"1\""), (1.0, "b", "\"2\"")]);
        let y = fr(&[(1.0, "a", "\"3\""), (2.0, "b", "\"4\"")]);
        let xy = merge(None, Some(&x), Some(&y));
        let yx = merge(None, Some(&y), Some(&x));
        assert_eq!(xy.keys(), yx.keys());
        for key in xy.keys() {
            assert_eq!(xy.get(key).unwrap().payload, yx.get(key).unwrap().payload);
        }
    }

    #[test]
    fn disjoint_keys_union_merge() {
        let ours = fr(&[(1.0, "a", "\"1\"")]);
        let theirs = fr(&[(1.0, "b", "\"2\"")]);
        let merged = merge(None, Some(&ours), Some(&theirs));
        assert_eq!(merged.keys(), vec!["a", "b"]);
    }

    #[test]
    fn merge_blobs_round_trips_through_encoding() {
        let ours = fr(&[(2.0, "k", "\"new\"")]).encode().unwrap();
        let theirs = fr(&[(1.0, "k", "\"old\"")]).encode().unwrap();
        let merged_bytes = merge_blobs(None, Some(ours.as_bytes()), Some(theirs.as_bytes())).unwrap();
        let merged = FieldRecord::decode(&String::from_utf8(merged_bytes).unwrap()).unwrap().unwrap();
        assert_eq!(merged.get("k").unwrap().payload, "\"new\"");
    }
}

/// Randomized generalizations of `idempotence_p3` and `determinism_across_order_p5`
/// over arbitrary field records, rather than a single hand-picked example.
#[cfg(test)]
mod proptests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::field::Field;

    fn arb_payload() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]{0,12}".prop_map(|s| format!("\"{s}\""))
    }

    /// A record of `n` fields keyed `k00`..`k{n-1}`, with arbitrary timestamps
    /// and payloads. Two records built this way share the same key set, which
    /// exercises the both-present merge path rather than the disjoint-union one.
    fn arb_record(n: usize) -> impl Strategy<Value = FieldRecord> {
        (prop::collection::vec(0.0f64..1_000_000.0, n), prop::collection::vec(arb_payload(), n)).prop_map(
            move |(timestamps, payloads)| {
                let fields = timestamps
                    .into_iter()
                    .zip(payloads)
                    .enumerate()
                    .map(|(i, (ts, p))| Field::with_ts(ts, format!("k{i:02}"), p))
                    .collect();
                FieldRecord::new(fields)
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Merging a record with itself must reproduce its key set and every payload (P3).
        #[test]
        fn idempotence_holds_for_arbitrary_records(record in arb_record(6)) {
            let merged = merge(None, Some(&record), Some(&record));
            let merged_keys: BTreeSet<&str> = merged.keys().into_iter().collect();
            let record_keys: BTreeSet<&str> = record.keys().into_iter().collect();
            prop_assert_eq!(merged_keys, record_keys);
            for key in record.keys() {
                prop_assert_eq!(&merged.get(key).unwrap().payload, &record.get(key).unwrap().payload);
            }
        }

        /// Swapping which side is `ours` and which is `theirs` must not change the
        /// resulting key set, which is always the union of both sides' keys (P5).
        #[test]
        fn merge_key_set_is_order_independent(ours in arb_record(5), theirs in arb_record(5)) {
            let merged_ot = merge(None, Some(&ours), Some(&theirs));
            let merged_to = merge(None, Some(&theirs), Some(&ours));
            let keys_ot: BTreeSet<&str> = merged_ot.keys().into_iter().collect();
            let keys_to: BTreeSet<&str> = merged_to.keys().into_iter().collect();
            prop_assert_eq!(&keys_ot, &keys_to);

            let union: BTreeSet<&str> = ours.keys().into_iter().chain(theirs.keys()).collect();
            prop_assert_eq!(keys_ot, union);
        }

        /// For any two fields sharing a key with strictly distinct timestamps,
        /// the merge keeps whichever has the larger `ts`, regardless of which
        /// side it arrives on (P4).
        #[test]
        fn newest_ts_wins_for_arbitrary_values(
            key in "[a-z][a-z0-9_]{0,7}",
            ts_low in 0.0f64..500_000.0,
            gap in 0.001f64..500_000.0,
            payload_low in arb_payload(),
            payload_high in arb_payload(),
        ) {
            let ts_high = ts_low + gap;
            let older = FieldRecord::new(vec![Field::with_ts(ts_low, key.as_str(), payload_low)]);
            let newer = FieldRecord::new(vec![Field::with_ts(ts_high, key.as_str(), payload_high.clone())]);

            let merged = merge(None, Some(&older), Some(&newer));
            prop_assert_eq!(&merged.get(&key).unwrap().payload, &payload_high);

            let merged_rev = merge(None, Some(&newer), Some(&older));
            prop_assert_eq!(&merged_rev.get(&key).unwrap().payload, &payload_high);
        }
    }
}
