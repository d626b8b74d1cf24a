//! In-memory document tree.
//!
//! Identifiers are path-derived (`mem://` + the percent-encoded path from the
//! tree root), matching how the Android external storage provider builds its
//! document ids. Creating a file behaves like a document provider too: the
//! extension implied by the declared content type is appended and name
//! clashes are resolved with a ` (n)` suffix.

use super::{
    DocumentProvider, DocumentReader, DocumentRef, DocumentWriter, WriteMode, child_uri,
    encode_uri_component, validate_name,
};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEME: &str = "mem://";

/// Provider operation that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    CreateFile,
    CreateDirectory,
    Rename,
    Delete,
    /// Fails as if the document vanished between the existence check and the open
    OpenInput,
    OpenOutput,
}

#[derive(Debug)]
enum Node {
    Directory {
        children: BTreeMap<String, Node>,
        modified: u64,
    },
    File {
        data: Vec<u8>,
        modified: u64,
        readable: bool,
    },
}

impl Node {
    fn directory() -> Self {
        Node::Directory {
            children: BTreeMap::new(),
            modified: now_millis(),
        }
    }

    fn file(data: Vec<u8>) -> Self {
        Node::File {
            data,
            modified: now_millis(),
            readable: true,
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    fn modified(&self) -> u64 {
        match self {
            Node::Directory { modified, .. } | Node::File { modified, .. } => *modified,
        }
    }

    fn children(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Directory { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }

    fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        match self {
            Node::Directory { children, .. } => Some(children),
            Node::File { .. } => None,
        }
    }

    fn touch(&mut self) {
        match self {
            Node::Directory { modified, .. } | Node::File { modified, .. } => {
                *modified = now_millis()
            }
        }
    }
}

#[derive(Debug)]
struct MemoryTree {
    root_name: String,
    root: Node,
    faults: HashSet<Fault>,
}

impl MemoryTree {
    fn node(&self, path: &[String]) -> Option<&Node> {
        let mut node = &self.root;
        for segment in path {
            node = node.children()?.get(segment)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &[String]) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for segment in path {
            node = node.children_mut()?.get_mut(segment)?;
        }
        Some(node)
    }

    fn uri(&self, path: &[String]) -> String {
        let root = format!("{SCHEME}{}", encode_uri_component(&self.root_name));
        path.iter().fold(root, |uri, segment| child_uri(&uri, segment))
    }

    /// Segments below the root named by `uri`, or `None` if it is not one of ours
    fn parse(&self, uri: &str) -> Option<Vec<String>> {
        let encoded = uri.strip_prefix(SCHEME)?;
        let decoded = urlencoding::decode(encoded).ok()?;
        let mut segments = decoded.split('/');
        if segments.next()? != self.root_name {
            return None;
        }
        segments
            .map(|segment| (!segment.is_empty()).then(|| segment.to_string()))
            .collect()
    }

    fn check_fault(&self, fault: Fault) -> io::Result<()> {
        if !self.faults.contains(&fault) {
            return Ok(());
        }
        let kind = match fault {
            Fault::OpenInput => io::ErrorKind::NotFound,
            _ => io::ErrorKind::PermissionDenied,
        };
        Err(io::Error::new(kind, format!("injected {fault:?} failure")))
    }

    fn ensure_directory(&mut self, path: &[String]) -> io::Result<()> {
        let mut node = &mut self.root;
        for segment in path {
            let children = node.children_mut().ok_or_else(not_a_directory)?;
            node = children
                .entry(segment.clone())
                .or_insert_with(Node::directory);
        }
        if node.is_directory() {
            Ok(())
        } else {
            Err(not_a_directory())
        }
    }

    /// Insert `node` below `parent`, adjusting the name until it is free
    fn insert_unique(
        &mut self,
        parent: &[String],
        name: &str,
        node: Node,
    ) -> io::Result<Vec<String>> {
        let directory = self.node_mut(parent).ok_or_else(not_found)?;
        directory.touch();
        let children = directory.children_mut().ok_or_else(not_a_directory)?;
        let name = unique_name(children, name);
        children.insert(name.clone(), node);

        let mut path = parent.to_vec();
        path.push(name);
        Ok(path)
    }
}

/// A document tree held entirely in memory.
///
/// Cloning is cheap and clones share the same tree.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    tree: Arc<Mutex<MemoryTree>>,
}

impl MemoryProvider {
    /// Create an empty tree whose root directory is called `root_name`
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            tree: Arc::new(Mutex::new(MemoryTree {
                root_name: root_name.into(),
                root: Node::directory(),
                faults: HashSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        lock(&self.tree)
    }

    fn path_of(&self, doc: &DocumentRef) -> Option<Vec<String>> {
        self.lock().parse(doc.as_str())
    }

    pub fn root(&self) -> DocumentRef {
        DocumentRef::new(self.lock().uri(&[]))
    }

    /// Create a directory and any missing ancestors, relative to the root
    pub fn add_directory(&self, relative: &str) -> io::Result<DocumentRef> {
        let path = relative_segments(relative);
        let mut tree = self.lock();
        tree.ensure_directory(&path)?;
        Ok(DocumentRef::new(tree.uri(&path)))
    }

    /// Create or overwrite a file, creating missing ancestors
    pub fn add_file(&self, relative: &str, contents: impl AsRef<[u8]>) -> io::Result<DocumentRef> {
        let path = relative_segments(relative);
        let Some((name, parent)) = path.split_last() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot replace the tree root with a file",
            ));
        };

        let mut tree = self.lock();
        tree.ensure_directory(parent)?;
        let children = tree
            .node_mut(parent)
            .and_then(Node::children_mut)
            .ok_or_else(not_a_directory)?;
        children.insert(name.clone(), Node::file(contents.as_ref().to_vec()));
        Ok(DocumentRef::new(tree.uri(&path)))
    }

    /// Contents of the file at `relative`, if there is one
    pub fn contents(&self, relative: &str) -> Option<Vec<u8>> {
        match self.lock().node(&relative_segments(relative))? {
            Node::File { data, .. } => Some(data.clone()),
            Node::Directory { .. } => None,
        }
    }

    /// Sorted names of the entries of the directory at `relative`
    pub fn child_names(&self, relative: &str) -> Vec<String> {
        self.lock()
            .node(&relative_segments(relative))
            .and_then(Node::children)
            .map(|children| children.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.insert(fault);
    }

    pub fn clear_fault(&self, fault: Fault) {
        self.lock().faults.remove(&fault);
    }

    /// Deny or restore read access to a file
    pub fn set_readable(&self, doc: &DocumentRef, allowed: bool) -> io::Result<()> {
        let path = self.path_of(doc).ok_or_else(not_found)?;
        match self.lock().node_mut(&path) {
            Some(Node::File { readable, .. }) => {
                *readable = allowed;
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "directories are always readable",
            )),
            None => Err(not_found()),
        }
    }
}

impl DocumentProvider for MemoryProvider {
    fn resolve(&self, uri: &str) -> io::Result<DocumentRef> {
        let tree = self.lock();
        let path = tree.parse(uri).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a document of this tree: {uri}"),
            )
        })?;
        if tree.node(&path).is_none() {
            return Err(not_found());
        }
        Ok(DocumentRef::new(tree.uri(&path)))
    }

    fn exists(&self, doc: &DocumentRef) -> bool {
        let tree = self.lock();
        tree.parse(doc.as_str())
            .is_some_and(|path| tree.node(&path).is_some())
    }

    fn is_directory(&self, doc: &DocumentRef) -> bool {
        let tree = self.lock();
        tree.parse(doc.as_str())
            .and_then(|path| tree.node(&path).map(Node::is_directory))
            .unwrap_or(false)
    }

    fn is_file(&self, doc: &DocumentRef) -> bool {
        let tree = self.lock();
        tree.parse(doc.as_str())
            .and_then(|path| tree.node(&path).map(|node| !node.is_directory()))
            .unwrap_or(false)
    }

    fn can_read(&self, doc: &DocumentRef) -> bool {
        let tree = self.lock();
        match tree.parse(doc.as_str()).and_then(|path| tree.node(&path)) {
            Some(Node::File { readable, .. }) => *readable,
            Some(Node::Directory { .. }) => true,
            None => false,
        }
    }

    fn display_name(&self, doc: &DocumentRef) -> Option<String> {
        let tree = self.lock();
        let path = tree.parse(doc.as_str())?;
        tree.node(&path)?;
        Some(path.last().unwrap_or(&tree.root_name).clone())
    }

    fn length(&self, doc: &DocumentRef) -> u64 {
        let tree = self.lock();
        match tree.parse(doc.as_str()).and_then(|path| tree.node(&path)) {
            Some(Node::File { data, .. }) => data.len() as u64,
            _ => 0,
        }
    }

    fn last_modified(&self, doc: &DocumentRef) -> u64 {
        let tree = self.lock();
        tree.parse(doc.as_str())
            .and_then(|path| tree.node(&path).map(Node::modified))
            .unwrap_or(0)
    }

    fn parent(&self, doc: &DocumentRef) -> Option<DocumentRef> {
        let tree = self.lock();
        let path = tree.parse(doc.as_str())?;
        let (_, parent) = path.split_last()?;
        Some(DocumentRef::new(tree.uri(parent)))
    }

    fn list_children(&self, doc: &DocumentRef) -> io::Result<Vec<DocumentRef>> {
        let tree = self.lock();
        let path = tree.parse(doc.as_str()).ok_or_else(not_found)?;
        let children = tree
            .node(&path)
            .ok_or_else(not_found)?
            .children()
            .ok_or_else(not_a_directory)?;
        Ok(children
            .keys()
            .map(|name| DocumentRef::new(child_uri(doc.as_str(), name)))
            .collect())
    }

    fn find_child(&self, parent: &DocumentRef, name: &str) -> io::Result<Option<DocumentRef>> {
        let tree = self.lock();
        let path = tree.parse(parent.as_str()).ok_or_else(not_found)?;
        let children = tree
            .node(&path)
            .ok_or_else(not_found)?
            .children()
            .ok_or_else(not_a_directory)?;
        Ok(children
            .contains_key(name)
            .then(|| DocumentRef::new(child_uri(parent.as_str(), name))))
    }

    fn create_file(
        &self,
        parent: &DocumentRef,
        mime_type: &str,
        name: &str,
    ) -> io::Result<DocumentRef> {
        let mut tree = self.lock();
        tree.check_fault(Fault::CreateFile)?;
        validate_name(name)?;
        let parent = tree.parse(parent.as_str()).ok_or_else(not_found)?;
        let path = tree.insert_unique(
            &parent,
            &name_for_mime(mime_type, name),
            Node::file(Vec::new()),
        )?;
        Ok(DocumentRef::new(tree.uri(&path)))
    }

    fn create_directory(&self, parent: &DocumentRef, name: &str) -> io::Result<DocumentRef> {
        let mut tree = self.lock();
        tree.check_fault(Fault::CreateDirectory)?;
        validate_name(name)?;
        let parent = tree.parse(parent.as_str()).ok_or_else(not_found)?;
        let path = tree.insert_unique(&parent, name, Node::directory())?;
        Ok(DocumentRef::new(tree.uri(&path)))
    }

    fn delete(&self, doc: &DocumentRef) -> io::Result<()> {
        let mut tree = self.lock();
        tree.check_fault(Fault::Delete)?;
        let path = tree.parse(doc.as_str()).ok_or_else(not_found)?;
        let Some((name, parent)) = path.split_last() else {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot delete the root of a granted tree",
            ));
        };
        let directory = tree.node_mut(parent).ok_or_else(not_found)?;
        directory.touch();
        directory
            .children_mut()
            .and_then(|children| children.remove(name))
            .map(|_| ())
            .ok_or_else(not_found)
    }

    fn rename(&self, doc: &DocumentRef, new_name: &str) -> io::Result<DocumentRef> {
        let mut tree = self.lock();
        tree.check_fault(Fault::Rename)?;
        validate_name(new_name)?;
        let path = tree.parse(doc.as_str()).ok_or_else(not_found)?;
        let Some((name, parent)) = path.split_last() else {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "cannot rename the root of a granted tree",
            ));
        };

        let children = tree
            .node_mut(parent)
            .and_then(Node::children_mut)
            .ok_or_else(not_found)?;
        if name != new_name {
            if children.contains_key(new_name) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{new_name} already exists"),
                ));
            }
            let mut node = children.remove(name).ok_or_else(not_found)?;
            node.touch();
            children.insert(new_name.to_string(), node);
        }

        let mut renamed = parent.to_vec();
        renamed.push(new_name.to_string());
        Ok(DocumentRef::new(tree.uri(&renamed)))
    }

    fn open_input(&self, doc: &DocumentRef) -> io::Result<DocumentReader> {
        let tree = self.lock();
        tree.check_fault(Fault::OpenInput)?;
        let path = tree.parse(doc.as_str()).ok_or_else(not_found)?;
        match tree.node(&path) {
            Some(Node::File { readable: false, .. }) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read access denied",
            )),
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Directory { .. }) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot read a directory",
            )),
            None => Err(not_found()),
        }
    }

    fn open_output(&self, doc: &DocumentRef, mode: WriteMode) -> io::Result<DocumentWriter> {
        let mut tree = self.lock();
        tree.check_fault(Fault::OpenOutput)?;
        let path = tree.parse(doc.as_str()).ok_or_else(not_found)?;
        match tree.node_mut(&path) {
            Some(Node::File { data, modified, .. }) => {
                if mode == WriteMode::Truncate {
                    data.clear();
                    *modified = now_millis();
                }
            }
            Some(Node::Directory { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot write to a directory",
                ));
            }
            None => return Err(not_found()),
        }

        Ok(Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            path,
        }))
    }
}

/// Appends straight into the tree; there is nothing to flush
struct MemoryWriter {
    tree: Arc<Mutex<MemoryTree>>,
    path: Vec<String>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match lock(&self.tree).node_mut(&self.path) {
            Some(Node::File { data, modified, .. }) => {
                data.extend_from_slice(buf);
                *modified = now_millis();
                Ok(buf.len())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "document was removed while open",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn lock(tree: &Mutex<MemoryTree>) -> MutexGuard<'_, MemoryTree> {
    // Recover from poisoned mutex (a test panicked while holding the lock)
    tree.lock().unwrap_or_else(|e| e.into_inner())
}

fn relative_segments(relative: &str) -> Vec<String> {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Providers append the extension implied by the declared type
fn name_for_mime(mime_type: &str, name: &str) -> String {
    match mime_type {
        "text/plain" if !name.ends_with(".txt") => format!("{name}.txt"),
        _ => name.to_string(),
    }
}

/// `name`, or `stem (n).ext` for the first `n` that is not taken
fn unique_name(children: &BTreeMap<String, Node>, name: &str) -> String {
    if !children.contains_key(name) {
        return name.to_string();
    }
    let (stem, extension) = match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    };
    (1..)
        .map(|n| format!("{stem} ({n}){extension}"))
        .find(|candidate| !children.contains_key(candidate))
        .unwrap_or_default()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

fn not_found() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "no such document")
}

fn not_a_directory() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "not a directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    fn read_all(provider: &MemoryProvider, doc: &DocumentRef) -> Vec<u8> {
        let mut bytes = Vec::new();
        provider
            .open_input(doc)
            .unwrap()
            .read_to_end(&mut bytes)
            .unwrap();
        bytes
    }

    #[test]
    fn test_identifiers_are_path_derived() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("saves/slot 1.dat", b"x").unwrap();

        assert_eq!(provider.root().as_str(), "mem://Game");
        assert_eq!(doc.as_str(), "mem://Game%2Fsaves%2Fslot%201.dat");
        assert_eq!(provider.display_name(&doc).as_deref(), Some("slot 1.dat"));
    }

    #[test]
    fn test_resolve_rejects_foreign_uris() {
        let provider = MemoryProvider::new("Game");

        let foreign = provider.resolve("content://elsewhere").unwrap_err();
        assert_eq!(foreign.kind(), io::ErrorKind::InvalidInput);

        let other_tree = provider.resolve("mem://Other%2Fa").unwrap_err();
        assert_eq!(other_tree.kind(), io::ErrorKind::InvalidInput);

        let missing = provider.resolve("mem://Game%2Fmissing").unwrap_err();
        assert_eq!(missing.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_create_file_appends_mime_extension() {
        let provider = MemoryProvider::new("Game");
        let root = provider.root();

        let doc = provider.create_file(&root, "text/plain", "report.csv").unwrap();

        assert_eq!(
            provider.display_name(&doc).as_deref(),
            Some("report.csv.txt")
        );
    }

    #[test]
    fn test_create_deduplicates_names() {
        let provider = MemoryProvider::new("Game");
        let root = provider.root();
        provider.add_file("notes.txt", b"").unwrap();

        let doc = provider.create_file(&root, "text/plain", "notes.txt").unwrap();
        let dir = provider.create_directory(&root, "notes.txt").unwrap();

        assert_eq!(provider.display_name(&doc).as_deref(), Some("notes (1).txt"));
        assert_eq!(provider.display_name(&dir).as_deref(), Some("notes (2).txt"));
    }

    #[test]
    fn test_delete_removes_whole_subtree() {
        let provider = MemoryProvider::new("Game");
        let dir = provider.add_directory("levels").unwrap();
        provider.add_file("levels/a/one.map", b"1").unwrap();

        provider.delete(&dir).unwrap();

        assert!(!provider.exists(&dir));
        assert!(provider.child_names("").is_empty());
    }

    #[test]
    fn test_root_cannot_be_deleted() {
        let provider = MemoryProvider::new("Game");
        let err = provider.delete(&provider.root()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_rename_returns_new_identifier() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("abc.txt", b"data").unwrap();

        let renamed = provider.rename(&doc, "final.bin").unwrap();

        assert!(!provider.exists(&doc));
        assert_eq!(renamed.as_str(), "mem://Game%2Ffinal.bin");
        assert_eq!(read_all(&provider, &renamed), b"data");
    }

    #[test]
    fn test_rename_refuses_to_clobber() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("a.txt", b"").unwrap();
        provider.add_file("b.txt", b"").unwrap();

        let err = provider.rename(&doc, "b.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_output_modes() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("log.txt", b"one").unwrap();

        provider
            .open_output(&doc, WriteMode::Append)
            .unwrap()
            .write_all(b" two")
            .unwrap();
        assert_eq!(read_all(&provider, &doc), b"one two");

        provider
            .open_output(&doc, WriteMode::Truncate)
            .unwrap()
            .write_all(b"three")
            .unwrap();
        assert_eq!(read_all(&provider, &doc), b"three");
    }

    #[test]
    fn test_writer_fails_after_removal() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("log.txt", b"").unwrap();
        let mut writer = provider.open_output(&doc, WriteMode::Append).unwrap();

        provider.delete(&doc).unwrap();

        assert!(writer.write_all(b"late").is_err());
    }

    #[test]
    fn test_injected_faults() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("a.txt", b"").unwrap();

        provider.inject_fault(Fault::Delete);
        assert!(provider.delete(&doc).is_err());
        assert!(provider.exists(&doc));

        provider.clear_fault(Fault::Delete);
        assert!(provider.delete(&doc).is_ok());
    }

    #[test]
    fn test_unreadable_file() {
        let provider = MemoryProvider::new("Game");
        let doc = provider.add_file("secret.txt", b"").unwrap();

        provider.set_readable(&doc, false).unwrap();

        assert!(!provider.can_read(&doc));
        let err = provider.open_input(&doc).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_parent_of_missing_document() {
        let provider = MemoryProvider::new("Game");
        provider.add_directory("saves").unwrap();
        let gone = DocumentRef::new("mem://Game%2Fsaves%2Fgone.dat");

        assert_eq!(
            provider.parent(&gone).unwrap().as_str(),
            "mem://Game%2Fsaves"
        );
        assert_eq!(provider.parent(&provider.root()), None);
    }
}
