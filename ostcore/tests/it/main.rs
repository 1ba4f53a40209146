//! End-to-end scenarios exercising the public API the way a caller
//! outside this crate would: create a repo on real disk, write and
//! read back through it, reopen it fresh.

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use cap_std_ext::cap_std;
use ostcore::objects::digest::{ObjectId, ObjectType};
use ostcore::objects::{Commit, DirMeta, DirTree};
use ostcore::objects::{Digest, FileContent, FileInfo, Payload};
use ostcore::refs::RefName;
use ostcore::{Repo, StorageMode};

fn open_root(path: &std::path::Path) -> Dir {
    Dir::open_ambient_dir(path, ambient_authority()).unwrap()
}

#[test]
fn commit_written_in_a_transaction_resolves_after_reopen() {
    let td = tempfile::tempdir().unwrap();
    let repo = Repo::create(open_root(td.path()), StorageMode::BareUserOnly).unwrap();

    let dirmeta = DirMeta::canonical();
    let dirtree = DirTree::default();
    let dirmeta_digest = Digest::of(&dirmeta.to_bytes());
    let dirtree_digest = Digest::of(&dirtree.to_bytes());

    let commit = Commit {
        metadata: Default::default(),
        parent: None,
        related: Vec::new(),
        subject: "initial import".into(),
        body: String::new(),
        timestamp: 1_700_000_000,
        root_dirtree: dirtree_digest,
        root_dirmeta: dirmeta_digest,
    };
    let commit_bytes = commit.to_bytes();
    let commit_digest = Digest::of(&commit_bytes);

    let txn = repo.begin_transaction().unwrap();
    let store = txn.store().unwrap();
    store
        .import_bytes(ObjectId::new(dirmeta_digest, ObjectType::DirMeta), &dirmeta.to_bytes())
        .unwrap();
    store
        .import_bytes(ObjectId::new(dirtree_digest, ObjectType::DirTree), &dirtree.to_bytes())
        .unwrap();
    store
        .import_bytes(ObjectId::new(commit_digest, ObjectType::Commit), &commit_bytes)
        .unwrap();
    txn.commit().unwrap();

    let refs_root = open_root(td.path());
    ostcore::refs::write(&refs_root, &RefName::head("example/x86_64/base"), commit_digest).unwrap();

    // Reopen from scratch, as a second process would.
    let reopened = Repo::open(open_root(td.path())).unwrap();
    let resolved = ostcore::refs::resolve(&open_root(td.path()), &RefName::head("example/x86_64/base"))
        .unwrap()
        .expect("ref was written above");
    assert_eq!(resolved, commit_digest);

    let store = reopened.object_store().unwrap();
    let loaded = store.load_commit(resolved).unwrap();
    assert_eq!(loaded.subject, "initial import");
    assert_eq!(loaded.root_dirtree, dirtree_digest);
    assert_eq!(loaded.root_dirmeta, dirmeta_digest);
}

#[test]
fn deleting_a_commit_with_tombstone_makes_it_unresolvable_but_recorded() {
    let td = tempfile::tempdir().unwrap();
    let repo = Repo::create(open_root(td.path()), StorageMode::Bare).unwrap();
    let store = repo.object_store().unwrap();

    let commit = Commit {
        metadata: Default::default(),
        parent: None,
        related: Vec::new(),
        subject: "to be deleted".into(),
        body: String::new(),
        timestamp: 1_700_000_001,
        root_dirtree: Digest::of(b"tree"),
        root_dirmeta: Digest::of(b"meta"),
    };
    let bytes = commit.to_bytes();
    let digest = Digest::of(&bytes);
    store.import_bytes(ObjectId::new(digest, ObjectType::Commit), &bytes).unwrap();
    assert!(store.load_commit(digest).is_ok());

    store.delete_commit(digest, true).unwrap();

    let err = store.load_commit(digest).unwrap_err();
    assert!(err.is_not_found());

    let tombstone = store.load_tombstone(digest).unwrap().expect("tombstone was written");
    assert_eq!(tombstone.commit, digest);
}

#[test]
fn archive_z2_file_round_trips_through_the_store() {
    let td = tempfile::tempdir().unwrap();
    let repo = Repo::create(open_root(td.path()), StorageMode::ArchiveZ2).unwrap();
    let config = repo.config();

    let content = FileContent {
        info: FileInfo { uid: 0, gid: 0, mode: 0o100644, size: 13 },
        xattrs: Vec::new(),
        payload: Payload::Regular(b"hello, world!".to_vec()),
    };
    let encoded = ostcore::objects::content::encode_archive(&content, config.zlib_level).unwrap();
    let digest = Digest::of(&encoded);

    let txn = repo.begin_transaction().unwrap();
    let store = txn.store().unwrap();
    store.import_bytes(ObjectId::new(digest, ObjectType::File), &encoded).unwrap();
    txn.commit().unwrap();

    let store = repo.object_store().unwrap();
    let loaded = store.load_file(digest).unwrap();
    assert_eq!(loaded.payload, Payload::Regular(b"hello, world!".to_vec()));
    assert_eq!(loaded.info.size, 13);
}

#[test]
fn remote_added_on_a_child_inherits_unset_fields_from_its_parent() {
    let parent_dir = tempfile::tempdir().unwrap();
    let parent_repo = Repo::create(open_root(parent_dir.path()), StorageMode::Bare).unwrap();
    parent_repo
        .remotes()
        .add(ostcore::remotes::Remote::new("upstream", "https://example.invalid/repo"))
        .unwrap();
    parent_repo.remotes().save(&open_root(parent_dir.path())).unwrap();

    let child_dir = tempfile::tempdir().unwrap();
    let child_repo = Repo::create(open_root(child_dir.path()), StorageMode::Bare).unwrap();
    let mut override_remote = ostcore::remotes::Remote::new("upstream", "https://example.invalid/repo");
    override_remote.url = None;
    override_remote.gpg_verify = false;
    child_repo.remotes().add(override_remote).unwrap();
    child_repo.remotes().save(&open_root(child_dir.path())).unwrap();

    let linked = child_repo.with_parent(Repo::open(open_root(parent_dir.path())).unwrap());
    let resolved = linked.get_remote("upstream").expect("present on the child");
    assert_eq!(resolved.url.as_deref(), Some("https://example.invalid/repo"));
    assert!(!resolved.gpg_verify, "the child's own override must not be overridden back by the parent");
}
