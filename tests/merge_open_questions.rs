//! Exercises the merge branches spec.md §9 leaves as open questions, with
//! logging enabled so the `tracing::warn!` surfaced on each one (per §9's
//! "surface a warning" direction) is actually visible under `RUST_LOG=warn`.

use sakdb::field::{Field, FieldRecord};
use sakdb::merge::merge;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
}

fn fr(fields: &[(f64, &str, &str)]) -> FieldRecord {
    FieldRecord::new(fields.iter().map(|(ts, k, p)| Field::with_ts(*ts, *k, *p)).collect())
}

#[test]
fn base_only_warns_and_returns_empty() {
    init_tracing();
    let base = fr(&[(1.0, "a", "\"x\"")]);
    let merged = merge(Some(&base), None, None);
    assert!(merged.is_empty());
}

#[test]
fn base_plus_ours_only_warns_and_returns_ours_verbatim() {
    init_tracing();
    let base = fr(&[(1.0, "a", "\"old\"")]);
    let ours = fr(&[(2.0, "a", "\"new\"")]);
    let merged = merge(Some(&base), Some(&ours), None);
    assert_eq!(merged, ours);
}

#[test]
fn base_plus_theirs_only_warns_and_returns_theirs_verbatim() {
    init_tracing();
    let base = fr(&[(1.0, "a", "\"old\"")]);
    let theirs = fr(&[(2.0, "a", "\"new\"")]);
    let merged = merge(Some(&base), None, Some(&theirs));
    assert_eq!(merged, theirs);
}
