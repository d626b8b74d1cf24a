//! Requesting access to a document tree.
//!
//! The platform answers a tree request asynchronously, through the activity
//! result callback of whoever launched it. [`GrantRequests`] remembers which
//! request codes it handed out and turns the matching result into a root
//! handle.

use crate::error::{Result, StorageError};
use crate::handle::VirtualFileHandle;
use crate::provider::SharedProvider;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

#[cfg(target_os = "android")]
pub use crate::provider::android::AndroidActivityLauncher;

pub const DEFAULT_REQUEST_CODE_BASE: i32 = 2801;

/// `Activity.RESULT_OK`
pub const RESULT_OK: i32 = -1;

pub const FLAG_GRANT_READ_URI_PERMISSION: i32 = 0x0000_0001;
pub const FLAG_GRANT_WRITE_URI_PERMISSION: i32 = 0x0000_0002;
pub const FLAG_GRANT_PERSISTABLE_URI_PERMISSION: i32 = 0x0000_0040;

/// Parameters of one `ACTION_OPEN_DOCUMENT_TREE` launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRequest {
    pub request_code: i32,
    pub flags: i32,
}

impl TreeRequest {
    pub fn new(request_code: i32, make_persistent: bool) -> Self {
        let mut flags = FLAG_GRANT_READ_URI_PERMISSION | FLAG_GRANT_WRITE_URI_PERMISSION;
        if make_persistent {
            flags |= FLAG_GRANT_PERSISTABLE_URI_PERMISSION;
        }
        Self {
            request_code,
            flags,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.flags & FLAG_GRANT_PERSISTABLE_URI_PERMISSION != 0
    }

    /// Access flags to keep across restarts
    pub fn access_flags(&self) -> i32 {
        self.flags & (FLAG_GRANT_READ_URI_PERMISSION | FLAG_GRANT_WRITE_URI_PERMISSION)
    }
}

/// Whatever can start the system directory picker on our behalf
pub trait ActivityLauncher: Send + Sync {
    fn launch_tree_picker(&self, request: &TreeRequest) -> io::Result<()>;
    fn take_persistable_permission(&self, uri: &str, flags: i32) -> io::Result<()>;
}

/// Receives the root of the granted tree, or `None` if nothing was granted
pub type GrantCallback = Box<dyn FnOnce(Option<VirtualFileHandle>) + Send>;

struct PendingGrant {
    request: TreeRequest,
    callback: GrantCallback,
}

/// Outstanding tree requests, keyed by request code
pub struct GrantRequests<L> {
    launcher: L,
    provider: SharedProvider,
    request_code_base: i32,
    pending: BTreeMap<i32, PendingGrant>,
}

impl<L: ActivityLauncher> GrantRequests<L> {
    pub fn new(launcher: L, provider: SharedProvider) -> Self {
        Self {
            launcher,
            provider,
            request_code_base: DEFAULT_REQUEST_CODE_BASE,
            pending: BTreeMap::new(),
        }
    }

    /// Start allocating request codes at `base`, clear of codes the app uses elsewhere
    pub fn with_request_code_base(mut self, base: i32) -> Self {
        self.request_code_base = base;
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn next_request_code(&self) -> i32 {
        first_free_request_code(self.pending.keys().copied(), self.request_code_base)
    }

    /// Launch the directory picker; `callback` runs once the result comes back.
    ///
    /// Returns the request code used. If the picker cannot be launched the
    /// callback is dropped without being called.
    pub fn request_document_tree(
        &mut self,
        make_persistent: bool,
        callback: impl FnOnce(Option<VirtualFileHandle>) + Send + 'static,
    ) -> Result<i32> {
        let request = TreeRequest::new(self.next_request_code(), make_persistent);
        self.launcher
            .launch_tree_picker(&request)
            .map_err(|source| StorageError::io("Could not launch the document tree picker", source))?;
        log::debug!(
            "Requested document tree with code {} (flags {:#x})",
            request.request_code,
            request.flags
        );

        self.pending.insert(
            request.request_code,
            PendingGrant {
                request,
                callback: Box::new(callback),
            },
        );
        Ok(request.request_code)
    }

    /// Feed an activity result through.
    ///
    /// Returns `false` for request codes this instance did not hand out, so the
    /// caller can pass those on to other handlers.
    pub fn on_activity_result(
        &mut self,
        request_code: i32,
        result_code: i32,
        uri: Option<&str>,
    ) -> bool {
        let Some(grant) = self.pending.remove(&request_code) else {
            return false;
        };

        let root = match uri {
            Some(uri) if result_code == RESULT_OK => self.grant_root(&grant.request, uri),
            _ => {
                log::debug!("Tree request {request_code} ended without a grant ({result_code})");
                None
            }
        };
        (grant.callback)(root);
        true
    }

    fn grant_root(&self, request: &TreeRequest, uri: &str) -> Option<VirtualFileHandle> {
        if request.is_persistent()
            && let Err(e) = self
                .launcher
                .take_persistable_permission(uri, request.access_flags())
        {
            log::warn!("Could not persist access to {uri}: {e}");
        }

        match VirtualFileHandle::resolve(Arc::clone(&self.provider), uri) {
            Ok(root) => Some(root),
            Err(e) => {
                log::warn!("Granted tree {uri} could not be opened: {e}");
                None
            }
        }
    }
}

/// Lowest code at or above `base` that is not in `taken`
pub fn first_free_request_code(taken: impl IntoIterator<Item = i32>, base: i32) -> i32 {
    let mut taken: Vec<i32> = taken.into_iter().filter(|code| *code >= base).collect();
    taken.sort_unstable();
    taken.dedup();

    let mut candidate = base;
    for code in taken {
        if code != candidate {
            break;
        }
        candidate = candidate.saturating_add(1);
    }
    candidate
}
