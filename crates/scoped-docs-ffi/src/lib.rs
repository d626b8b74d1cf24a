//! UniFFI bindings for scoped-docs mobile apps
//!
//! Exposes file handles over a granted document tree to the Kotlin side of an
//! Android app. The app launches the directory picker itself; [`GrantCodes`]
//! hands out the request codes and intent flags to use and recognizes the
//! matching results.

use scoped_docs_engine::grant::{RESULT_OK, TreeRequest, first_free_request_code};
use scoped_docs_engine::{SharedProvider, StorageError, VirtualFileHandle, resolve};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

uniffi::setup_scaffolding!();

// ============ Errors ============

/// Errors that can cross the FFI boundary
/// Note: Field is named `reason` not `message` to avoid conflict with Throwable.message in Kotlin
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiError {
    #[error("Not found: {reason}")]
    NotFound { reason: String },
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("IO failure: {reason}")]
    IoFailure { reason: String },
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl From<StorageError> for FfiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(reason) => FfiError::NotFound { reason },
            StorageError::InvalidOperation(reason) => FfiError::InvalidOperation { reason },
            StorageError::PermissionDenied(reason) => FfiError::PermissionDenied { reason },
            StorageError::IoFailure { message, source } => FfiError::IoFailure {
                reason: format!("{message}: {source}"),
            },
            StorageError::InvalidArgument(reason) => FfiError::InvalidArgument { reason },
        }
    }
}

// ============ Providers ============

#[cfg(target_os = "android")]
fn platform_provider(_tree_uri: &str) -> Result<SharedProvider, FfiError> {
    Ok(Arc::new(scoped_docs_engine::provider::AndroidProvider::new()))
}

/// Off Android the "tree" is a host directory named by a `file://` identifier
#[cfg(not(target_os = "android"))]
fn platform_provider(tree_uri: &str) -> Result<SharedProvider, FfiError> {
    use scoped_docs_engine::provider::HostProvider;

    let path = HostProvider::path_for_uri(tree_uri).ok_or_else(|| FfiError::InvalidArgument {
        reason: format!("not a file tree: {tree_uri}"),
    })?;
    let host = HostProvider::new(path).map_err(|e| FfiError::InvalidArgument {
        reason: format!("{tree_uri}: {e}"),
    })?;
    Ok(Arc::new(host))
}

// ============ Tree Handle ============

/// A file or directory in a granted tree, which may not exist yet.
///
/// Writing to a handle that does not exist creates it.
#[derive(uniffi::Object)]
pub struct TreeHandle {
    inner: Mutex<VirtualFileHandle>,
}

impl TreeHandle {
    fn wrap(handle: VirtualFileHandle) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(handle),
        })
    }

    fn lock(&self) -> MutexGuard<'_, VirtualFileHandle> {
        // Recover from poisoned mutex (another thread panicked while holding lock)
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current handle, so no lock is held across tree operations
    fn current(&self) -> VirtualFileHandle {
        self.lock().clone()
    }
}

#[uniffi::export]
impl TreeHandle {
    /// Open the root of a tree returned by the directory picker.
    #[uniffi::constructor]
    pub fn open(tree_uri: String) -> Result<Self, FfiError> {
        Self::resolve(tree_uri.clone(), tree_uri)
    }

    /// Reopen a handle from a path saved earlier, within the tree `tree_uri`.
    #[uniffi::constructor]
    pub fn resolve(tree_uri: String, path: String) -> Result<Self, FfiError> {
        let provider = platform_provider(&tree_uri)?;
        let handle = resolve(provider, &path)?;
        Ok(Self {
            inner: Mutex::new(handle),
        })
    }

    pub fn path(&self) -> String {
        self.lock().path().to_string()
    }

    pub fn path_without_extension(&self) -> String {
        self.lock().path_without_extension().to_string()
    }

    pub fn name(&self) -> Result<String, FfiError> {
        Ok(self.lock().name()?)
    }

    pub fn extension(&self) -> Result<String, FfiError> {
        Ok(self.lock().extension()?)
    }

    pub fn name_without_extension(&self) -> Result<String, FfiError> {
        Ok(self.lock().name_without_extension()?)
    }

    pub fn exists(&self) -> bool {
        self.lock().exists()
    }

    pub fn is_directory(&self) -> bool {
        self.lock().is_directory()
    }

    /// True until the document has been created
    pub fn is_pending(&self) -> bool {
        self.lock().is_pending()
    }

    pub fn length(&self) -> Result<u64, FfiError> {
        Ok(self.lock().length()?)
    }

    pub fn last_modified(&self) -> Result<u64, FfiError> {
        Ok(self.lock().last_modified()?)
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, FfiError> {
        Ok(self.current().read_bytes()?)
    }

    pub fn read_string(&self) -> Result<String, FfiError> {
        Ok(self.current().read_string()?)
    }

    pub fn write_bytes(&self, bytes: Vec<u8>, append: bool) -> Result<(), FfiError> {
        Ok(self.lock().write_bytes(&bytes, append)?)
    }

    pub fn write_string(&self, text: String, append: bool) -> Result<(), FfiError> {
        Ok(self.lock().write_string(&text, append)?)
    }

    pub fn list(&self) -> Result<Vec<Arc<TreeHandle>>, FfiError> {
        let children = self.current().list()?;
        Ok(children.into_iter().map(Self::wrap).collect())
    }

    pub fn list_with_suffix(&self, suffix: String) -> Result<Vec<Arc<TreeHandle>>, FfiError> {
        let children = self.current().list_with_suffix(&suffix)?;
        Ok(children.into_iter().map(Self::wrap).collect())
    }

    pub fn child(&self, name: String) -> Result<Arc<TreeHandle>, FfiError> {
        Ok(Self::wrap(self.lock().child(&name)?))
    }

    pub fn parent(&self) -> Result<Arc<TreeHandle>, FfiError> {
        Ok(Self::wrap(self.lock().parent()?))
    }

    pub fn sibling(&self, name: String) -> Result<Arc<TreeHandle>, FfiError> {
        Ok(Self::wrap(self.lock().sibling(&name)?))
    }

    pub fn mkdirs(&self) -> Result<(), FfiError> {
        Ok(self.lock().mkdirs()?)
    }

    pub fn delete(&self) -> Result<bool, FfiError> {
        Ok(self.current().delete()?)
    }

    pub fn empty_directory(&self, preserve_tree: bool) -> Result<(), FfiError> {
        Ok(self.current().empty_directory(preserve_tree)?)
    }

    pub fn copy_to(&self, destination: Arc<TreeHandle>) -> Result<(), FfiError> {
        let source = self.current();
        Ok(source.copy_to(&mut destination.lock())?)
    }

    pub fn move_to(&self, destination: Arc<TreeHandle>) -> Result<(), FfiError> {
        let source = self.current();
        Ok(source.move_to(&mut destination.lock())?)
    }
}

// ============ Grant Requests ============

/// Parameters for launching `ACTION_OPEN_DOCUMENT_TREE`.
#[derive(Debug, PartialEq, uniffi::Record)]
pub struct TreeRequestDto {
    pub request_code: i32,
    /// Flags for the intent
    pub flags: i32,
    /// Whether to call `takePersistableUriPermission` with `access_flags` on success
    pub persistent: bool,
    pub access_flags: i32,
}

impl From<TreeRequest> for TreeRequestDto {
    fn from(request: TreeRequest) -> Self {
        Self {
            request_code: request.request_code,
            flags: request.flags,
            persistent: request.is_persistent(),
            access_flags: request.access_flags(),
        }
    }
}

/// Request codes handed out for tree requests that have not been answered yet.
#[derive(uniffi::Object)]
pub struct GrantCodes {
    base: i32,
    outstanding: Mutex<BTreeSet<i32>>,
}

#[uniffi::export]
impl GrantCodes {
    #[uniffi::constructor]
    pub fn new(base: i32) -> Self {
        Self {
            base,
            outstanding: Mutex::new(BTreeSet::new()),
        }
    }

    /// Reserve the lowest free code at or above the base.
    pub fn reserve(&self, make_persistent: bool) -> TreeRequestDto {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        let code = first_free_request_code(outstanding.iter().copied(), self.base);
        outstanding.insert(code);
        TreeRequest::new(code, make_persistent).into()
    }

    /// Settle an activity result. Returns false if `request_code` was not reserved here.
    pub fn release(&self, request_code: i32) -> bool {
        self.outstanding
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_code)
    }
}

/// Whether an activity result code means the user picked a directory.
#[uniffi::export]
pub fn is_grant_result_ok(result_code: i32) -> bool {
    result_code == RESULT_OK
}

/// Route `log` output to logcat (or stderr off Android). Safe to call repeatedly.
#[uniffi::export]
pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("ScopedDocs"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .try_init();
    }

    log::debug!("scoped-docs logging ready");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scoped_docs_engine::provider::HostProvider;
    use tempfile::TempDir;

    fn open_temp_tree() -> (TempDir, TreeHandle) {
        let dir = tempfile::tempdir().unwrap();
        let uri = HostProvider::uri_for(&dir.path().canonicalize().unwrap());
        let root = TreeHandle::open(uri).unwrap();
        (dir, root)
    }

    #[test]
    fn test_write_through_pending_child() {
        let (dir, root) = open_temp_tree();
        let slot = root.child("slot1.dat".to_string()).unwrap();
        assert!(slot.is_pending());

        slot.write_string("level=3".to_string(), false).unwrap();

        assert!(!slot.is_pending());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("slot1.dat")).unwrap(),
            "level=3"
        );
        assert_eq!(slot.read_string().unwrap(), "level=3");
    }

    #[test]
    fn test_list_and_resolve() {
        let (dir, root) = open_temp_tree();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();

        let names: Vec<String> = root
            .list_with_suffix(".md".to_string())
            .unwrap()
            .iter()
            .map(|child| child.name().unwrap())
            .collect();
        assert_eq!(names, vec!["a.md"]);

        let b = root.child("b.txt".to_string()).unwrap();
        let reopened = TreeHandle::resolve(root.path(), b.path()).unwrap();
        assert_eq!(reopened.read_bytes().unwrap(), b"b");
    }

    #[test]
    fn test_copy_to_same_handle_does_not_deadlock() {
        let (dir, root) = open_temp_tree();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let a = root.child("a.txt".to_string()).unwrap();

        let err = a.copy_to(Arc::clone(&a)).unwrap_err();

        assert!(matches!(err, FfiError::InvalidOperation { .. }));
    }

    #[test]
    fn test_errors_map_across() {
        let (_dir, root) = open_temp_tree();
        let missing = root.child("missing.txt".to_string()).unwrap();

        assert!(matches!(missing.read_bytes(), Err(FfiError::NotFound { .. })));
        assert!(matches!(
            TreeHandle::open("content://not-a-file-tree".to_string()),
            Err(FfiError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_grant_codes() {
        let codes = GrantCodes::new(2801);

        let first = codes.reserve(true);
        let second = codes.reserve(false);

        assert_eq!(
            first,
            TreeRequestDto {
                request_code: 2801,
                flags: 0x43,
                persistent: true,
                access_flags: 0x3,
            }
        );
        assert_eq!(second.request_code, 2802);
        assert!(codes.release(2801));
        assert!(!codes.release(2801));
        assert_eq!(codes.reserve(false).request_code, 2801);
    }

    #[test]
    fn test_grant_result_codes() {
        assert!(is_grant_result_ok(-1));
        assert!(!is_grant_result_ok(0));
    }
}
