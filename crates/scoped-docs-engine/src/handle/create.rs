//! Creating files with arbitrary names.
//!
//! Document providers derive a file's type from the declared content type and
//! may rewrite the requested name to match it (`report.csv` requested as
//! `text/plain` comes back as `report.csv.txt`). Creating a neutral temporary
//! file and renaming it afterwards is the one sequence that reliably yields
//! the exact name asked for.

use crate::error::{Result, StorageError};
use crate::provider::{DocumentProvider, DocumentRef, NEUTRAL_MIME_TYPE};
use uuid::Uuid;

pub(crate) const TEMP_NAME_LENGTH: usize = 6;
const TEMP_EXTENSION: &str = "txt";

/// Lowercase ASCII letters drawn from random UUIDs
pub(crate) fn random_letters(length: usize) -> String {
    let mut letters = String::with_capacity(length);
    while letters.len() < length {
        let mut bits = Uuid::new_v4().as_u128();
        // 26^20 stays well inside the 122 random bits of a v4 UUID
        for _ in 0..(length - letters.len()).min(20) {
            letters.push(char::from(b'a' + (bits % 26) as u8));
            bits /= 26;
        }
    }
    letters
}

/// Create an empty document named exactly `name` below `parent`
pub fn create_document(
    provider: &dyn DocumentProvider,
    parent: &DocumentRef,
    name: &str,
) -> Result<DocumentRef> {
    let temp_name = loop {
        let candidate = format!("{}.{TEMP_EXTENSION}", random_letters(TEMP_NAME_LENGTH));
        match provider.find_child(parent, &candidate) {
            Ok(None) => break candidate,
            Ok(Some(_)) => continue,
            Err(source) => {
                return Err(StorageError::io(
                    format!("Could not list {parent} while picking a temporary name"),
                    source,
                ));
            }
        }
    };

    let created = provider
        .create_file(parent, NEUTRAL_MIME_TYPE, &temp_name)
        .map_err(|source| {
            StorageError::io(format!("Could not create {temp_name} in {parent}"), source)
        })?;
    log::debug!("Created temporary document {created}");

    match provider.rename(&created, name) {
        Ok(renamed) => Ok(renamed),
        Err(source) => {
            if let Err(e) = provider.delete(&created) {
                log::warn!("Could not remove temporary document {created}: {e}");
            }
            Err(StorageError::io(
                format!("Could not rename {created} to {name}"),
                source,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Fault, MemoryProvider};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_random_letters() {
        let letters = random_letters(45);
        assert_eq!(letters.len(), 45);
        assert!(letters.chars().all(|c| c.is_ascii_lowercase()));
        assert_eq!(random_letters(0), "");
    }

    #[test]
    fn test_creates_exact_name() {
        let provider = MemoryProvider::new("Game");
        let root = provider.root();

        let doc = create_document(&provider, &root, "report.csv").unwrap();

        assert_eq!(provider.display_name(&doc).as_deref(), Some("report.csv"));
        assert_eq!(provider.child_names(""), vec!["report.csv".to_string()]);
    }

    #[test]
    fn test_rename_failure_cleans_up() {
        let provider = MemoryProvider::new("Game");
        let root = provider.root();
        provider.inject_fault(Fault::Rename);

        let err = create_document(&provider, &root, "report.csv").unwrap_err();

        assert!(matches!(err, StorageError::IoFailure { .. }));
        assert!(provider.child_names("").is_empty());
    }

    #[test]
    fn test_cleanup_failure_reports_rename_error() {
        let provider = MemoryProvider::new("Game");
        let root = provider.root();
        provider.inject_fault(Fault::Rename);
        provider.inject_fault(Fault::Delete);

        let err = create_document(&provider, &root, "report.csv").unwrap_err();

        assert!(err.to_string().contains("rename"));
        // The orphan stays behind, but the caller sees the original failure
        assert_eq!(provider.child_names("").len(), 1);
    }

    #[test]
    fn test_create_failure() {
        let provider = MemoryProvider::new("Game");
        provider.inject_fault(Fault::CreateFile);

        let err = create_document(&provider, &provider.root(), "a.bin").unwrap_err();
        assert!(matches!(err, StorageError::IoFailure { .. }));
    }
}
