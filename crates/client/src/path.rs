//! Remote path validation.
//!
//! Remote paths name entries tracked by the storage service. They are always
//! relative to the service root; a leading `/` is accepted and stripped so that
//! `/file` and `file` refer to the same entry.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a remote path and returns its normalized form.
///
/// Rejects paths that escape the service root (`..` traversal), paths that
/// normalize to nothing, and paths containing null bytes.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use converge_client::validate_path;
/// assert_eq!(validate_path("/uploads/file.bin").unwrap(), Path::new("uploads/file.bin"));
/// assert!(validate_path("../escape").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix; they never
                // name a valid remote entry.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}
