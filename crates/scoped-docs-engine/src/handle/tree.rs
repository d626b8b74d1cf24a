//! Whole-tree operations: delete, empty, copy and move

use super::{HandleState, VirtualFileHandle};
use crate::error::{Result, StorageError};
use std::io::{self, Write};

impl VirtualFileHandle {
    /// Delete the document, and for a directory everything below it.
    ///
    /// Returns `false` when there was nothing to delete.
    pub fn delete(&self) -> Result<bool> {
        let HandleState::Bound(document) = &self.state else {
            return Ok(false);
        };
        if !self.provider.exists(document) {
            return Ok(false);
        }

        self.provider
            .delete(document)
            .map_err(|source| StorageError::io(format!("Could not delete {document}"), source))?;
        log::debug!("Deleted {document}");
        Ok(true)
    }

    /// Same as [`delete`](Self::delete); providers remove directory contents themselves
    pub fn delete_directory(&self) -> Result<bool> {
        self.delete()
    }

    /// Remove the contents of this directory.
    ///
    /// With `preserve_tree` the subdirectories stay in place and only files are
    /// removed, recursively.
    pub fn empty_directory(&self, preserve_tree: bool) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        if !self.is_directory() {
            return Err(StorageError::InvalidOperation(format!(
                "Tried to empty a file as a directory: {}",
                self.path()
            )));
        }

        for child in self.list()? {
            if preserve_tree && child.is_directory() {
                child.empty_directory(true)?;
            } else {
                child.delete()?;
            }
        }
        Ok(())
    }

    /// Copy this file or directory to `destination`.
    ///
    /// A file overwrites a file (creating it if needed). A directory's
    /// contents are merged into the destination directory, which is created
    /// when missing.
    pub fn copy_to(&self, destination: &mut VirtualFileHandle) -> Result<()> {
        if !self.exists() {
            return Err(StorageError::NotFound(format!(
                "Cannot copy from a document that doesn't exist: {}",
                self.path()
            )));
        }
        if destination.path() == self.path() || self.contains(destination) {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot copy {} into itself",
                self.path()
            )));
        }

        if !self.is_directory() {
            return self.copy_file_to(destination);
        }
        if destination.exists() && !destination.is_directory() {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot copy a directory onto a file: {}",
                destination.path()
            )));
        }
        destination.mkdirs()?;
        self.copy_children_to(destination)
    }

    /// Copy, then delete the source
    pub fn move_to(&self, destination: &mut VirtualFileHandle) -> Result<()> {
        self.copy_to(destination)?;
        self.delete()?;
        Ok(())
    }

    /// Whether `other` lies below this handle, judged by path-derived identifiers
    fn contains(&self, other: &VirtualFileHandle) -> bool {
        other
            .path()
            .strip_prefix(self.path())
            .is_some_and(|rest| rest.starts_with("%2F"))
    }

    fn copy_file_to(&self, destination: &mut VirtualFileHandle) -> Result<()> {
        if destination.is_directory() {
            return Err(StorageError::InvalidOperation(format!(
                "Cannot copy a file onto a directory: {}",
                destination.path()
            )));
        }

        let mut input = self.read()?;
        let mut output = destination.write(false)?;
        io::copy(&mut input, &mut output)
            .and_then(|_| output.flush())
            .map_err(|source| {
                StorageError::io(
                    format!("Could not copy {} to {}", self.path(), destination.path()),
                    source,
                )
            })?;
        Ok(())
    }

    fn copy_children_to(&self, destination: &VirtualFileHandle) -> Result<()> {
        for child in self.list()? {
            let name = child.name()?;
            let mut target = destination.child(&name)?;

            if child.is_directory() {
                if target.exists() && !target.is_directory() {
                    return Err(StorageError::InvalidOperation(format!(
                        "Cannot copy directory {name} over the file {}",
                        target.path()
                    )));
                }
                target.mkdirs()?;
                child.copy_children_to(&target)?;
            } else {
                child.copy_file_to(&mut target)?;
            }
        }
        Ok(())
    }
}
