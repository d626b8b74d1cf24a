pub mod error;
pub mod grant;
pub mod handle;
pub mod provider;

// Re-export key types for easier usage
pub use error::{Result, StorageError};
pub use grant::{ActivityLauncher, GrantCallback, GrantRequests, TreeRequest};
pub use handle::{HandleState, PendingCreation, VirtualFileHandle, resolve};
pub use provider::{DocumentProvider, DocumentRef, SharedProvider, WriteMode};
