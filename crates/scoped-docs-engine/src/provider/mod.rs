//! Document reference providers
//!
//! A provider answers questions about, and performs mutations on, nodes of a
//! document tree that it identifies by opaque URI strings. The handle layer
//! never interprets those strings beyond comparing and extending them.

#[cfg(target_os = "android")]
pub mod android;
pub mod host;
pub mod memory;

#[cfg(target_os = "android")]
pub use android::AndroidProvider;
pub use host::HostProvider;
pub use memory::{Fault, MemoryProvider};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Content type used when a file has to be created before its real name is known
pub const NEUTRAL_MIME_TYPE: &str = "text/plain";

/// Opaque identifier of a single document (file or directory) in a tree.
///
/// Carried in its URI form so it can be persisted and handed back to
/// [`DocumentProvider::resolve`] later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an output stream treats existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Append,
    Truncate,
}

impl WriteMode {
    pub fn from_append(append: bool) -> Self {
        if append {
            WriteMode::Append
        } else {
            WriteMode::Truncate
        }
    }

    /// Mode string understood by `ParcelFileDescriptor.parseMode`
    pub fn as_mode_str(self) -> &'static str {
        match self {
            WriteMode::Append => "wa",
            WriteMode::Truncate => "rwt",
        }
    }
}

pub type DocumentReader = Box<dyn Read + Send>;
pub type DocumentWriter = Box<dyn Write + Send>;

/// Capability over a granted document tree.
///
/// Queries mirror what a platform document object can answer and never fail:
/// an unreachable document simply reports `false`, `None` or `0`. Mutations and
/// stream acquisition report the provider's own error.
pub trait DocumentProvider: Send + Sync {
    /// Turn a URI string previously produced by this provider back into a reference.
    ///
    /// Malformed strings fail with `InvalidInput`, well-formed strings naming
    /// nothing fail with `NotFound`.
    fn resolve(&self, uri: &str) -> io::Result<DocumentRef>;

    fn exists(&self, doc: &DocumentRef) -> bool;
    fn is_directory(&self, doc: &DocumentRef) -> bool;
    fn is_file(&self, doc: &DocumentRef) -> bool;
    fn can_read(&self, doc: &DocumentRef) -> bool;
    fn display_name(&self, doc: &DocumentRef) -> Option<String>;
    fn length(&self, doc: &DocumentRef) -> u64;
    /// Milliseconds since the Unix epoch
    fn last_modified(&self, doc: &DocumentRef) -> u64;
    /// `None` for the root of the granted tree
    fn parent(&self, doc: &DocumentRef) -> Option<DocumentRef>;

    fn list_children(&self, doc: &DocumentRef) -> io::Result<Vec<DocumentRef>>;

    fn find_child(&self, parent: &DocumentRef, name: &str) -> io::Result<Option<DocumentRef>> {
        Ok(self
            .list_children(parent)?
            .into_iter()
            .find(|child| self.display_name(child).as_deref() == Some(name)))
    }

    /// Create an empty file. The provider may adjust `name` to fit `mime_type`.
    fn create_file(
        &self,
        parent: &DocumentRef,
        mime_type: &str,
        name: &str,
    ) -> io::Result<DocumentRef>;
    fn create_directory(&self, parent: &DocumentRef, name: &str) -> io::Result<DocumentRef>;
    fn delete(&self, doc: &DocumentRef) -> io::Result<()>;
    /// Returns the renamed document, whose reference may differ from `doc`
    fn rename(&self, doc: &DocumentRef, new_name: &str) -> io::Result<DocumentRef>;

    fn open_input(&self, doc: &DocumentRef) -> io::Result<DocumentReader>;
    fn open_output(&self, doc: &DocumentRef, mode: WriteMode) -> io::Result<DocumentWriter>;
}

pub type SharedProvider = Arc<dyn DocumentProvider>;

/// URI of a document named `name` directly below `parent_uri`.
///
/// Path-derived providers mint child identifiers this way, which lets a handle
/// predict the identifier of a document before it exists.
pub fn child_uri(parent_uri: &str, name: &str) -> String {
    format!("{parent_uri}{}", encode_uri_component(&format!("/{name}")))
}

/// Marks that `android.net.Uri.encode` leaves alone on top of `-_.~`
const UNRESERVED_MARKS: [(&str, &str); 5] = [
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
];

/// Percent-encode `text` the way `android.net.Uri.encode` does: alphanumerics
/// and `_-!.~'()*` stay as they are, everything else is escaped as UTF-8.
pub fn encode_uri_component(text: &str) -> String {
    let mut encoded = urlencoding::encode(text).into_owned();
    for (escape, mark) in UNRESERVED_MARKS {
        if encoded.contains(escape) {
            encoded = encoded.replace(escape, mark);
        }
    }
    encoded
}

/// Reject names that cannot be a single path segment
pub(crate) fn validate_name(name: &str) -> io::Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid document name: {name:?}"),
        ));
    }
    Ok(())
}
