use pretty_assertions::assert_eq;
use rstest::rstest;
use scoped_docs_engine::provider::{Fault, MemoryProvider};
use scoped_docs_engine::{SharedProvider, StorageError, VirtualFileHandle, resolve};
use std::sync::Arc;

fn game_tree() -> (MemoryProvider, SharedProvider, VirtualFileHandle) {
    let memory = MemoryProvider::new("Game");
    let provider: SharedProvider = Arc::new(memory.clone());
    let root = VirtualFileHandle::bound(Arc::clone(&provider), memory.root());
    (memory, provider, root)
}

/// Build a handle by walking `relative` from the root
fn walk(root: &VirtualFileHandle, relative: &str) -> VirtualFileHandle {
    relative
        .split('/')
        .fold(root.clone(), |handle, name| handle.child(name).unwrap())
}

#[rstest]
#[case("saves")]
#[case("saves/slot 1.dat")]
#[case("levels/world 2/map.json")]
fn path_round_trips_through_resolve(#[case] relative: &str) {
    let (memory, provider, root) = game_tree();
    memory.add_file("saves/slot 1.dat", b"1").unwrap();
    memory.add_file("levels/world 2/map.json", b"{}").unwrap();

    let handle = walk(&root, relative);
    let resolved = resolve(provider, handle.path()).unwrap();

    assert_eq!(resolved, handle);
    assert_eq!(resolved.name().unwrap(), handle.name().unwrap());
    assert_eq!(resolved.is_directory(), handle.is_directory());
}

#[test]
fn pending_handle_keeps_its_path_once_written() {
    let (_memory, provider, root) = game_tree();
    let mut handle = walk(&root, "notes.md");
    let before = handle.path().to_string();

    handle.write_string("# Notes\n", false).unwrap();

    assert_eq!(handle.path(), before);
    let resolved = resolve(provider, &before).unwrap();
    assert_eq!(resolved.read_string().unwrap(), "# Notes\n");
}

#[test]
fn emptying_with_preserved_tree_is_idempotent() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("a/x.txt", b"x").unwrap();
    memory.add_file("a/b/y.bin", b"y").unwrap();
    memory.add_directory("a/c").unwrap();
    let a = walk(&root, "a");

    a.empty_directory(true).unwrap();
    let once = (memory.child_names("a"), memory.child_names("a/b"));
    a.empty_directory(true).unwrap();
    let twice = (memory.child_names("a"), memory.child_names("a/b"));

    assert_eq!(once, (vec!["b".to_string(), "c".to_string()], vec![]));
    assert_eq!(once, twice);
}

#[test]
fn copy_rejects_file_where_directory_is_needed() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("src/d/inner.txt", b"i").unwrap();
    memory.add_file("dst/d", b"in the way").unwrap();
    let mut dst = walk(&root, "dst");

    let err = walk(&root, "src").copy_to(&mut dst).unwrap_err();

    assert!(matches!(err, StorageError::InvalidOperation(_)));
    assert_eq!(memory.contents("dst/d").unwrap(), b"in the way");
}

#[test]
fn copy_rejects_directory_where_file_is_needed() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("src/f", b"file").unwrap();
    memory.add_directory("dst/f").unwrap();
    let mut dst = walk(&root, "dst");

    let err = walk(&root, "src").copy_to(&mut dst).unwrap_err();

    assert!(matches!(err, StorageError::InvalidOperation(_)));
    assert!(walk(&root, "dst/f").is_directory());
}

#[rstest]
#[case("report.csv")]
#[case("archive.tar.gz")]
#[case("README")]
#[case("notes.txt")]
fn indirect_create_yields_exact_name(#[case] name: &str) {
    let (memory, _provider, root) = game_tree();
    let mut handle = root.child(name).unwrap();

    handle.write_bytes(b"payload", false).unwrap();

    assert_eq!(memory.child_names(""), vec![name.to_string()]);
    assert_eq!(handle.name().unwrap(), name);
}

#[test]
fn recursive_copy_is_complete() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("a/x.txt", "x contents").unwrap();
    memory.add_file("a/b/y.bin", [0u8, 1, 2, 255]).unwrap();
    memory.add_directory("a/b/empty").unwrap();
    let mut z = walk(&root, "z");
    assert!(z.is_pending());

    walk(&root, "a").copy_to(&mut z).unwrap();

    assert!(z.is_directory());
    assert_eq!(memory.child_names("z"), vec!["b", "x.txt"]);
    assert_eq!(memory.child_names("z/b"), vec!["empty", "y.bin"]);
    assert_eq!(memory.contents("z/x.txt").unwrap(), b"x contents");
    assert_eq!(memory.contents("z/b/y.bin").unwrap(), vec![0u8, 1, 2, 255]);
    // Source untouched
    assert_eq!(memory.contents("a/x.txt").unwrap(), b"x contents");
}

#[test]
fn copy_merges_into_existing_directory() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("a/x.txt", "new").unwrap();
    memory.add_file("z/x.txt", "old and longer").unwrap();
    memory.add_file("z/keep.txt", "kept").unwrap();
    let mut z = walk(&root, "z");

    walk(&root, "a").copy_to(&mut z).unwrap();

    assert_eq!(memory.contents("z/x.txt").unwrap(), b"new");
    assert_eq!(memory.contents("z/keep.txt").unwrap(), b"kept");
}

#[test]
fn failed_move_leaves_both_copies() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("a/x.txt", "x").unwrap();
    let a = walk(&root, "a");
    let mut z = walk(&root, "z");
    memory.inject_fault(Fault::Delete);

    let err = a.move_to(&mut z).unwrap_err();

    assert!(matches!(err, StorageError::IoFailure { .. }));
    assert!(a.exists());
    assert_eq!(memory.contents("z/x.txt").unwrap(), b"x");
}

#[test]
fn move_removes_source() {
    let (memory, _provider, root) = game_tree();
    memory.add_file("saves/slot1.dat", "progress").unwrap();
    let source = walk(&root, "saves/slot1.dat");
    let mut target = walk(&root, "saves/backup.dat");

    source.move_to(&mut target).unwrap();

    assert!(!source.exists());
    assert_eq!(memory.child_names("saves"), vec!["backup.dat"]);
    assert_eq!(target.read_string().unwrap(), "progress");
}
