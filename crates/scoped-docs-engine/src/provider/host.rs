//! Document tree over a directory of the host file system.
//!
//! Used on desktop builds, where there is no document picker and the "granted
//! tree" is just a directory. Identifiers are `file://` followed by the
//! percent-encoded absolute path, so they extend the same way SAF tree URIs do.

use super::{
    DocumentProvider, DocumentReader, DocumentRef, DocumentWriter, WriteMode, encode_uri_component,
    validate_name,
};
use relative_path::{Component, RelativePathBuf};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const SCHEME: &str = "file://";

#[derive(Debug, Clone)]
pub struct HostProvider {
    root: PathBuf,
}

impl HostProvider {
    /// Grant access to the directory at `root` and everything below it
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> DocumentRef {
        DocumentRef::new(Self::uri_for(&self.root))
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn uri_for(path: &Path) -> String {
        format!("{SCHEME}{}", encode_uri_component(&path.to_string_lossy()))
    }

    /// Host path named by a `file://` identifier, without any containment check
    pub fn path_for_uri(uri: &str) -> Option<PathBuf> {
        let encoded = uri.strip_prefix(SCHEME)?;
        let decoded = urlencoding::decode(encoded).ok()?;
        Some(PathBuf::from(decoded.into_owned()))
    }

    /// Path of `doc` if it lies inside the granted directory
    fn path_of(&self, doc: &DocumentRef) -> Option<PathBuf> {
        let path = Self::path_for_uri(doc.as_str())?;
        self.relative(&path)?;
        Some(path)
    }

    fn relative(&self, path: &Path) -> Option<RelativePathBuf> {
        let relative = RelativePathBuf::from_path(path.strip_prefix(&self.root).ok()?).ok()?;
        relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
            .then_some(relative)
    }

    fn require_path(&self, doc: &DocumentRef) -> io::Result<PathBuf> {
        self.path_of(doc).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("outside the granted tree: {doc}"),
            )
        })
    }

    fn reject_root(&self, path: &Path, action: &str) -> io::Result<()> {
        if path == self.root {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot {action} the root of a granted tree"),
            ));
        }
        Ok(())
    }
}

impl DocumentProvider for HostProvider {
    fn resolve(&self, uri: &str) -> io::Result<DocumentRef> {
        let path = Self::path_for_uri(uri).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file identifier: {uri}"),
            )
        })?;
        let doc = DocumentRef::new(Self::uri_for(&path));
        let path = self.require_path(&doc)?;
        if !path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ));
        }
        Ok(doc)
    }

    fn exists(&self, doc: &DocumentRef) -> bool {
        self.path_of(doc).is_some_and(|path| path.exists())
    }

    fn is_directory(&self, doc: &DocumentRef) -> bool {
        self.path_of(doc).is_some_and(|path| path.is_dir())
    }

    fn is_file(&self, doc: &DocumentRef) -> bool {
        self.path_of(doc).is_some_and(|path| path.is_file())
    }

    fn can_read(&self, doc: &DocumentRef) -> bool {
        match self.path_of(doc) {
            Some(path) if path.is_dir() => fs::read_dir(path).is_ok(),
            Some(path) => File::open(path).is_ok(),
            None => false,
        }
    }

    fn display_name(&self, doc: &DocumentRef) -> Option<String> {
        let path = self.path_of(doc).filter(|path| path.exists())?;
        Some(path.file_name()?.to_string_lossy().into_owned())
    }

    fn length(&self, doc: &DocumentRef) -> u64 {
        self.path_of(doc)
            .and_then(|path| fs::metadata(path).ok())
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.len())
            .unwrap_or(0)
    }

    fn last_modified(&self, doc: &DocumentRef) -> u64 {
        self.path_of(doc)
            .and_then(|path| fs::metadata(path).ok())
            .and_then(|metadata| metadata.modified().ok())
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }

    fn parent(&self, doc: &DocumentRef) -> Option<DocumentRef> {
        let path = self.path_of(doc)?;
        if path == self.root {
            return None;
        }
        Some(DocumentRef::new(Self::uri_for(path.parent()?)))
    }

    fn list_children(&self, doc: &DocumentRef) -> io::Result<Vec<DocumentRef>> {
        let path = self.require_path(doc)?;
        let mut children = fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<io::Result<Vec<_>>>()?;
        children.sort();
        Ok(children
            .iter()
            .map(|child| DocumentRef::new(Self::uri_for(child)))
            .collect())
    }

    fn find_child(&self, parent: &DocumentRef, name: &str) -> io::Result<Option<DocumentRef>> {
        if validate_name(name).is_err() {
            return Ok(None);
        }
        let child = self.require_path(parent)?.join(name);
        Ok(child
            .exists()
            .then(|| DocumentRef::new(Self::uri_for(&child))))
    }

    fn create_file(
        &self,
        parent: &DocumentRef,
        mime_type: &str,
        name: &str,
    ) -> io::Result<DocumentRef> {
        validate_name(name)?;
        let path = self.require_path(parent)?.join(name);
        log::debug!("Creating {} ({mime_type})", path.display());
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(DocumentRef::new(Self::uri_for(&path)))
    }

    fn create_directory(&self, parent: &DocumentRef, name: &str) -> io::Result<DocumentRef> {
        validate_name(name)?;
        let path = self.require_path(parent)?.join(name);
        fs::create_dir(&path)?;
        Ok(DocumentRef::new(Self::uri_for(&path)))
    }

    fn delete(&self, doc: &DocumentRef) -> io::Result<()> {
        let path = self.require_path(doc)?;
        self.reject_root(&path, "delete")?;
        if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn rename(&self, doc: &DocumentRef, new_name: &str) -> io::Result<DocumentRef> {
        validate_name(new_name)?;
        let path = self.require_path(doc)?;
        self.reject_root(&path, "rename")?;
        let target = path.with_file_name(new_name);
        if target != path && target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            ));
        }
        fs::rename(&path, &target)?;
        Ok(DocumentRef::new(Self::uri_for(&target)))
    }

    fn open_input(&self, doc: &DocumentRef) -> io::Result<DocumentReader> {
        let path = self.require_path(doc)?;
        if path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot read a directory",
            ));
        }
        Ok(Box::new(File::open(path)?))
    }

    fn open_output(&self, doc: &DocumentRef, mode: WriteMode) -> io::Result<DocumentWriter> {
        let path = self.require_path(doc)?;
        let file = OpenOptions::new()
            .write(true)
            .append(mode == WriteMode::Append)
            .truncate(mode == WriteMode::Truncate)
            .open(path)?;
        Ok(Box::new(file))
    }
}
