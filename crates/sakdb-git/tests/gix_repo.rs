//! Integration tests exercising `GixRepo` against a real bare repository.

use sakdb_git::{EntryMode, GitRepo, GixRepo, RefName, TreeEdit, TreeEntry};

fn open_repo() -> (tempfile::TempDir, GixRepo) {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = GixRepo::open_or_init_bare(dir.path()).expect("init bare repo");
    (dir, repo)
}

#[test]
fn blob_write_then_read_roundtrips() {
    let (_dir, repo) = open_repo();
    let oid = repo.write_blob(b"hello world").unwrap();
    assert_eq!(repo.read_blob(oid).unwrap(), b"hello world");
}

#[test]
fn edit_tree_builds_nested_paths() {
    let (_dir, repo) = open_repo();
    let blob = repo.write_blob(b"payload").unwrap();

    let tree = repo
        .edit_tree(
            None,
            &[TreeEdit::Upsert { path: "a/b/c".to_owned(), oid: blob }],
        )
        .unwrap();

    let root = repo.read_tree(tree).unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name, "a");
    assert_eq!(root[0].mode, EntryMode::Tree);

    let a = repo.read_tree(root[0].oid).unwrap();
    assert_eq!(a[0].name, "b");
    let b = repo.read_tree(a[0].oid).unwrap();
    assert_eq!(b[0].name, "c");
    assert_eq!(b[0].oid, blob);
}

#[test]
fn edit_tree_prunes_emptied_subtrees() {
    let (_dir, repo) = open_repo();
    let blob = repo.write_blob(b"payload").unwrap();
    let tree = repo
        .edit_tree(None, &[TreeEdit::Upsert { path: "a/b".to_owned(), oid: blob }])
        .unwrap();

    let pruned = repo.edit_tree(Some(tree), &[TreeEdit::Remove { path: "a/b".to_owned() }]).unwrap();
    let root = repo.read_tree(pruned).unwrap();
    assert!(root.is_empty());
}

#[test]
fn ref_write_read_delete() {
    let (_dir, repo) = open_repo();
    let blob = repo.write_blob(b"c").unwrap();
    let tree = repo.write_tree(&[TreeEntry { name: "f".into(), mode: EntryMode::Blob, oid: blob }]).unwrap();
    let commit = repo.create_commit(tree, &[], "initial", None).unwrap();

    let name = RefName::heads("master");
    repo.write_ref(&name, commit, "update").unwrap();
    assert_eq!(repo.read_ref(&name).unwrap(), Some(commit));

    repo.delete_ref(&name).unwrap();
    assert_eq!(repo.read_ref(&name).unwrap(), None);
}

#[test]
fn is_ancestor_walks_parent_chain() {
    let (_dir, repo) = open_repo();
    let blob = repo.write_blob(b"c").unwrap();
    let tree = repo.write_tree(&[TreeEntry { name: "f".into(), mode: EntryMode::Blob, oid: blob }]).unwrap();
    let c1 = repo.create_commit(tree, &[], "first", None).unwrap();
    let c2 = repo.create_commit(tree, &[c1], "second", None).unwrap();
    let c3 = repo.create_commit(tree, &[c2], "third", None).unwrap();

    assert!(repo.is_ancestor(c1, c3).unwrap());
    assert!(!repo.is_ancestor(c3, c1).unwrap());
    assert_eq!(repo.merge_base(c1, c3).unwrap(), Some(c1));
}
