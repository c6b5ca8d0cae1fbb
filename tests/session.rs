//! Session commit/rollback integration tests (S1, S6).

use sakdb::backend::GitNamespaceBackend;
use sakdb::field::FieldRecord;
use sakdb::graph::Graph;
use sakdb::namespace::{Namespace, ObjectKey};
use sakdb::object::{reassign_attribute, AttributeShape};
use sakdb_git::GixRepo;

const NS: &str = "data";

fn open_graph(dir: &std::path::Path) -> Graph {
    let repo = GixRepo::open_or_init_bare(dir).expect("init repo");
    let backend = GitNamespaceBackend::new(Box::new(repo), "master").expect("backend");
    let namespace = Namespace::open(NS, Box::new(backend)).expect("open namespace");
    let mut graph = Graph::new();
    graph.register_namespace(namespace).expect("register namespace");
    graph
}

fn int_meta(existing: Option<&FieldRecord>, value: i64) -> FieldRecord {
    reassign_attribute(existing, "my_int", AttributeShape::Scalar, &[("", value.to_string())])
}

fn read_int(fr: &FieldRecord) -> i64 {
    fr.get("my_int").expect("my_int field present").payload.parse().expect("int payload")
}

#[test]
fn s1_integer_increment_within_a_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut graph = open_graph(dir.path());
    let key = ObjectKey::generate();

    {
        let mut session = graph.session("create", "create a").expect("open session");
        session.write(NS, &key, "meta", int_meta(None, 42)).expect("write");
        session.close().expect("close");
    }

    let outside = graph.read(NS, &key, "meta").expect("read").expect("present");
    assert_eq!(read_int(&outside), 42);

    {
        let mut session = graph.session("increment", "increment a").expect("open session");
        let current = session.read(NS, &key, "meta").expect("read").expect("present");
        session.write(NS, &key, "meta", int_meta(Some(&current), 43)).expect("write");
        session.close().expect("close");
    }

    let after = graph.read(NS, &key, "meta").expect("read").expect("present");
    assert_eq!(read_int(&after), 43);
}

#[test]
fn s6_rollback_after_partial_commit() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut graph = open_graph(dir.path());
    let key = ObjectKey::generate();

    {
        let mut session = graph.session("create", "create a").expect("open session");
        session.write(NS, &key, "meta", int_meta(None, 42)).expect("write");
        session.close().expect("close");
    }

    {
        let mut session = graph.session("mutate", "mutate a").expect("open session");
        let current = session.read(NS, &key, "meta").expect("read").expect("present");
        session.write(NS, &key, "meta", int_meta(Some(&current), 11)).expect("write");
        session.commit(None).expect("commit");

        let observed = session.read(NS, &key, "meta").expect("read").expect("present");
        assert_eq!(read_int(&observed), 11);

        session.rollback().expect("rollback");
        let rolled_back = session.read(NS, &key, "meta").expect("read").expect("present");
        assert_eq!(read_int(&rolled_back), 42);

        session.close().expect("close");
    }

    let after = graph.read(NS, &key, "meta").expect("read").expect("present");
    assert_eq!(read_int(&after), 42);
}
