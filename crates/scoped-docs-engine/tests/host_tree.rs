use pretty_assertions::assert_eq;
use scoped_docs_engine::provider::HostProvider;
use scoped_docs_engine::{SharedProvider, StorageError, VirtualFileHandle, resolve};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn host_tree() -> (TempDir, SharedProvider, VirtualFileHandle) {
    let dir = tempfile::tempdir().unwrap();
    let host = HostProvider::new(dir.path()).unwrap();
    let root_ref = host.root();
    let provider: SharedProvider = Arc::new(host);
    let root = VirtualFileHandle::bound(Arc::clone(&provider), root_ref);
    (dir, provider, root)
}

#[test]
fn write_creates_file_on_disk() {
    let (dir, provider, root) = host_tree();
    let mut saves = root.child("saves").unwrap();
    saves.mkdirs().unwrap();
    let mut slot = saves.child("slot1.dat").unwrap();
    let predicted = slot.path().to_string();

    slot.write_string("level=3", false).unwrap();

    assert_eq!(
        fs::read_to_string(dir.path().join("saves/slot1.dat")).unwrap(),
        "level=3"
    );
    let entries: Vec<_> = fs::read_dir(dir.path().join("saves"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec!["slot1.dat"]);
    assert_eq!(resolve(provider, &predicted).unwrap(), slot);
}

#[test]
fn copy_and_delete_tree() {
    let (dir, _provider, root) = host_tree();
    fs::create_dir_all(dir.path().join("a/b")).unwrap();
    fs::write(dir.path().join("a/x.txt"), "x").unwrap();
    fs::write(dir.path().join("a/b/y.txt"), "y").unwrap();
    let a = root.child("a").unwrap();
    let mut z = root.child("z").unwrap();

    a.copy_to(&mut z).unwrap();

    assert_eq!(fs::read_to_string(dir.path().join("z/x.txt")).unwrap(), "x");
    assert_eq!(fs::read_to_string(dir.path().join("z/b/y.txt")).unwrap(), "y");

    assert!(a.delete_directory().unwrap());
    assert!(!dir.path().join("a").exists());
}

#[test]
fn empty_directory_keeps_the_directory() {
    let (dir, _provider, root) = host_tree();
    fs::create_dir_all(dir.path().join("cache/shaders")).unwrap();
    fs::write(dir.path().join("cache/index"), "i").unwrap();
    fs::write(dir.path().join("cache/shaders/a.bin"), "a").unwrap();

    root.child("cache").unwrap().empty_directory(false).unwrap();

    assert!(dir.path().join("cache").is_dir());
    assert_eq!(fs::read_dir(dir.path().join("cache")).unwrap().count(), 0);
}

#[test]
fn resolve_rejects_paths_outside_the_tree() {
    let (_dir, provider, _root) = host_tree();

    let err = resolve(provider, &HostProvider::uri_for(std::path::Path::new("/"))).unwrap_err();

    assert!(matches!(err, StorageError::InvalidArgument(_)));
}
