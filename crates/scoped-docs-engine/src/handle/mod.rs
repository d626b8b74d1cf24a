//! Virtual file handles
//!
//! A [`VirtualFileHandle`] addresses one entry of a granted document tree. It
//! is either bound to a document that existed when the handle was made, or
//! pending: a name below a known parent that will be created the first time
//! something is written to it. The pending form is what lets callers navigate
//! to `saves/slot1.dat` and write it without caring whether it exists yet.

mod create;
mod pending;
mod tree;

pub use create::create_document;
pub use pending::PendingCreation;

use crate::error::{Result, StorageError};
use crate::provider::{DocumentReader, DocumentRef, DocumentWriter, SharedProvider, WriteMode};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Read, Write};
use std::sync::Arc;

/// What a handle currently points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleState {
    Bound(DocumentRef),
    Pending(PendingCreation),
}

/// File handle over a document tree.
///
/// Handles are compared and hashed by [`path`](Self::path). A pending handle
/// reports the same path its document will have once created, so paths saved
/// before the first write still resolve afterwards.
#[derive(Clone)]
pub struct VirtualFileHandle {
    provider: SharedProvider,
    state: HandleState,
}

impl VirtualFileHandle {
    pub fn bound(provider: SharedProvider, document: DocumentRef) -> Self {
        Self {
            provider,
            state: HandleState::Bound(document),
        }
    }

    pub fn pending(provider: SharedProvider, pending: PendingCreation) -> Self {
        Self {
            provider,
            state: HandleState::Pending(pending),
        }
    }

    /// Rebuild a handle from a string previously returned by [`path`](Self::path)
    pub fn resolve(provider: SharedProvider, path: &str) -> Result<Self> {
        match provider.resolve(path) {
            Ok(document) => Ok(Self::bound(provider, document)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                Err(StorageError::InvalidArgument(format!("{path}: {e}")))
            }
            Err(source) => Err(StorageError::io(format!("Could not resolve {path}"), source)),
        }
    }

    pub fn state(&self) -> &HandleState {
        &self.state
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    /// The backing document, unless the handle is still pending
    pub fn document(&self) -> Option<&DocumentRef> {
        match &self.state {
            HandleState::Bound(document) => Some(document),
            HandleState::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, HandleState::Pending(_))
    }

    pub fn path(&self) -> &str {
        match &self.state {
            HandleState::Bound(document) => document.as_str(),
            HandleState::Pending(pending) => pending.virtual_path(),
        }
    }

    pub fn path_without_extension(&self) -> &str {
        let path = self.path();
        // Only look inside the last segment; encoded separators are "%2F"
        let name_start = path.rfind("%2F").map(|i| i + 3).unwrap_or(0);
        match path[name_start..].rfind('.') {
            Some(i) => &path[..name_start + i],
            None => path,
        }
    }

    pub fn name(&self) -> Result<String> {
        match &self.state {
            HandleState::Pending(pending) => Ok(pending.name().to_string()),
            HandleState::Bound(document) => self
                .provider
                .display_name(document)
                .ok_or_else(|| StorageError::NotFound(format!("No name for {document}"))),
        }
    }

    pub fn extension(&self) -> Result<String> {
        let name = self.name()?;
        Ok(split_extension(&name).1.to_string())
    }

    pub fn name_without_extension(&self) -> Result<String> {
        let name = self.name()?;
        Ok(split_extension(&name).0.to_string())
    }

    /// Live check; a bound document deleted behind our back reports `false`
    pub fn exists(&self) -> bool {
        match &self.state {
            HandleState::Bound(document) => self.provider.exists(document),
            HandleState::Pending(_) => false,
        }
    }

    pub fn is_directory(&self) -> bool {
        match &self.state {
            HandleState::Bound(document) => {
                self.provider.exists(document) && self.provider.is_directory(document)
            }
            HandleState::Pending(_) => false,
        }
    }

    pub fn length(&self) -> Result<u64> {
        let document = self.existing_document()?;
        Ok(self.provider.length(document))
    }

    /// Milliseconds since the Unix epoch
    pub fn last_modified(&self) -> Result<u64> {
        let document = self.existing_document()?;
        Ok(self.provider.last_modified(document))
    }

    fn existing_document(&self) -> Result<&DocumentRef> {
        match &self.state {
            HandleState::Bound(document) if self.provider.exists(document) => Ok(document),
            _ => Err(StorageError::NotFound(format!(
                "Document does not exist: {}",
                self.path()
            ))),
        }
    }

    pub fn read(&self) -> Result<DocumentReader> {
        let document = self.existing_document()?;
        if self.provider.is_directory(document) {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot open a stream to a directory: {document}"
            )));
        }
        if !self.provider.can_read(document) {
            return Err(StorageError::PermissionDenied(format!(
                "Can't read document: {document}"
            )));
        }

        self.provider.open_input(document).map_err(|source| {
            StorageError::io(format!("Could not open input stream: {document}"), source)
        })
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let mut input = self.read()?;
        let mut bytes = Vec::new();
        input
            .read_to_end(&mut bytes)
            .map_err(|source| StorageError::io(format!("Could not read {}", self.path()), source))?;
        Ok(bytes)
    }

    pub fn read_string(&self) -> Result<String> {
        let mut input = self.read()?;
        let mut text = String::new();
        input
            .read_to_string(&mut text)
            .map_err(|source| StorageError::io(format!("Could not read {}", self.path()), source))?;
        Ok(text)
    }

    /// Open an output stream, creating the document first if it does not exist
    pub fn write(&mut self, append: bool) -> Result<DocumentWriter> {
        if self.is_directory() {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot open a stream to a directory: {}",
                self.path()
            )));
        }
        if !self.exists() {
            self.materialize_file()?;
        }

        let document = self.existing_document()?;
        self.provider
            .open_output(document, WriteMode::from_append(append))
            .map_err(|source| {
                StorageError::io(format!("Could not open output stream: {document}"), source)
            })
    }

    pub fn write_bytes(&mut self, bytes: &[u8], append: bool) -> Result<()> {
        let mut output = self.write(append)?;
        output
            .write_all(bytes)
            .and_then(|()| output.flush())
            .map_err(|source| StorageError::io(format!("Could not write {}", self.path()), source))
    }

    pub fn write_string(&mut self, text: &str, append: bool) -> Result<()> {
        self.write_bytes(text.as_bytes(), append)
    }

    /// Parent and name a missing document has to be created with
    fn creation_target(&self) -> Result<(DocumentRef, String)> {
        match &self.state {
            HandleState::Pending(pending) => Ok((
                pending.intended_parent().clone(),
                pending.name().to_string(),
            )),
            HandleState::Bound(document) => {
                let parent = self.provider.parent(document).ok_or_else(|| {
                    StorageError::NotFound(format!(
                        "Could not get parent of {document} (needed to create it)"
                    ))
                })?;
                let name = self
                    .provider
                    .display_name(document)
                    .or_else(|| name_below(&parent, document))
                    .ok_or_else(|| StorageError::NotFound(format!("No name for {document}")))?;
                Ok((parent, name))
            }
        }
    }

    /// Document already sitting at the creation target, which happens when a
    /// pending handle outlives the moment its name was free
    fn find_at_target(&self, parent: &DocumentRef, name: &str) -> Result<Option<DocumentRef>> {
        self.provider
            .find_child(parent, name)
            .map_err(|source| StorageError::io(format!("Could not list {parent}"), source))
    }

    fn materialize_file(&mut self) -> Result<()> {
        let (parent, name) = self.creation_target()?;
        if let Some(existing) = self.find_at_target(&parent, &name)? {
            if !self.provider.is_file(&existing) {
                return Err(StorageError::InvalidOperation(format!(
                    "A directory is in the way of file {}",
                    self.path()
                )));
            }
            log::debug!("{existing} appeared since the handle was made");
            self.state = HandleState::Bound(existing);
            return Ok(());
        }
        let created = create_document(self.provider.as_ref(), &parent, &name)?;
        log::debug!("Materialized {} as {created}", self.path());
        self.state = HandleState::Bound(created);
        Ok(())
    }

    /// Create the directory this handle names, if it does not exist yet.
    ///
    /// Only the handle's own directory is created: a pending handle knows its
    /// parent but nothing above it.
    pub fn mkdirs(&mut self) -> Result<()> {
        if self.is_directory() {
            return Ok(());
        }
        if self.exists() {
            return Err(StorageError::InvalidOperation(format!(
                "A file is in the way of directory {}",
                self.path()
            )));
        }

        let (parent, name) = self.creation_target()?;
        if let Some(existing) = self.find_at_target(&parent, &name)? {
            if self.provider.is_file(&existing) {
                return Err(StorageError::InvalidOperation(format!(
                    "A file is in the way of directory {}",
                    self.path()
                )));
            }
            log::debug!("{existing} appeared since the handle was made");
            self.state = HandleState::Bound(existing);
            return Ok(());
        }

        let created = self
            .provider
            .create_directory(&parent, &name)
            .map_err(|source| {
                StorageError::io(format!("Could not create directory {name} in {parent}"), source)
            })?;
        let created_name = self.provider.display_name(&created);
        if created_name.as_deref() != Some(name.as_str()) {
            if let Err(e) = self.provider.delete(&created) {
                log::warn!("Could not remove misnamed directory {created}: {e}");
            }
            return Err(StorageError::io(
                format!("Could not create directory {name} in {parent}"),
                io::Error::other(format!(
                    "provider named it {}",
                    created_name.unwrap_or_default()
                )),
            ));
        }
        log::debug!("Created directory {created}");
        self.state = HandleState::Bound(created);
        Ok(())
    }

    /// Handles for every entry of this directory; empty for anything else
    pub fn list(&self) -> Result<Vec<Self>> {
        if !self.is_directory() {
            return Ok(Vec::new());
        }
        let document = self.existing_document()?;
        let children = self
            .provider
            .list_children(document)
            .map_err(|source| StorageError::io(format!("Could not list {document}"), source))?;
        Ok(children
            .into_iter()
            .map(|child| Self::bound(Arc::clone(&self.provider), child))
            .collect())
    }

    pub fn list_with_suffix(&self, suffix: &str) -> Result<Vec<Self>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|child| child.name().is_ok_and(|name| name.ends_with(suffix)))
            .collect())
    }

    /// Handle for `name` inside this directory, pending if there is no such entry yet
    pub fn child(&self, name: &str) -> Result<Self> {
        if !self.is_directory() {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot get the child of a file: {}",
                self.path()
            )));
        }
        let document = self.existing_document()?;
        let found = self
            .provider
            .find_child(document, name)
            .map_err(|source| StorageError::io(format!("Could not search {document}"), source))?;

        let provider = Arc::clone(&self.provider);
        Ok(match found {
            Some(child) => Self::bound(provider, child),
            None => Self::pending(provider, PendingCreation::new(document, name)),
        })
    }

    pub fn parent(&self) -> Result<Self> {
        let parent = match &self.state {
            HandleState::Pending(pending) => pending.intended_parent().clone(),
            HandleState::Bound(document) => self.provider.parent(document).ok_or_else(|| {
                StorageError::NotFound(format!("Could not get parent document: {document}"))
            })?,
        };
        Ok(Self::bound(Arc::clone(&self.provider), parent))
    }

    pub fn sibling(&self, name: &str) -> Result<Self> {
        self.parent()?.child(name)
    }
}

impl PartialEq for VirtualFileHandle {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

impl Eq for VirtualFileHandle {}

impl Hash for VirtualFileHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path().hash(state);
    }
}

impl fmt::Debug for VirtualFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualFileHandle")
            .field("state", &self.state)
            .finish()
    }
}

impl fmt::Display for VirtualFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Shorthand for [`VirtualFileHandle::resolve`]
pub fn resolve(provider: SharedProvider, path: &str) -> Result<VirtualFileHandle> {
    VirtualFileHandle::resolve(provider, path)
}

/// (stem, extension) split at the last `.`
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    }
}

/// Name of a vanished document, read back from its path-derived identifier
fn name_below(parent: &DocumentRef, document: &DocumentRef) -> Option<String> {
    let encoded = document.as_str().strip_prefix(parent.as_str())?;
    let decoded = urlencoding::decode(encoded).ok()?;
    let name = decoded.strip_prefix('/')?;
    (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
}
