use crate::provider::{DocumentRef, child_uri};

/// Identity of a document that has been navigated to but not created yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreation {
    name: String,
    virtual_path: String,
    intended_parent: DocumentRef,
}

impl PendingCreation {
    /// Record for `name` below `parent`, with the path the document will have once created
    pub fn new(parent: &DocumentRef, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            virtual_path: child_uri(parent.as_str(), &name),
            name,
            intended_parent: parent.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn virtual_path(&self) -> &str {
        &self.virtual_path
    }

    pub fn intended_parent(&self) -> &DocumentRef {
        &self.intended_parent
    }
}
