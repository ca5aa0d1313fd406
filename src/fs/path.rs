use alloc::vec::Vec;

use super::FsError;
use crate::constants::luxfs::{MAX_PATH_DEPTH, NAME_MAX};

/// Split a path into its meaningful components.
///
/// Empty segments and `.` are dropped; `..` is kept for the resolver.
pub fn components(path: &str) -> Result<Vec<&str>, FsError> {
    let mut out = Vec::new();
    for token in path.split('/') {
        if token.is_empty() || token == "." {
            continue;
        }
        if token.len() >= NAME_MAX {
            return Err(FsError::InvalidPath);
        }
        if out.len() == MAX_PATH_DEPTH {
            return Err(FsError::InvalidPath);
        }
        out.push(token);
    }
    Ok(out)
}

/// Last non-empty segment, or `/` for the root.
pub fn basename(path: &str) -> &str {
    path.split('/')
        .rev()
        .find(|segment| !segment.is_empty())
        .unwrap_or("/")
}

/// Leaf name for a new entry: must be a real name, not `.` or `..`.
pub fn leaf_name(path: &str) -> Result<&str, FsError> {
    match basename(path) {
        "/" | "." | ".." => Err(FsError::InvalidPath),
        leaf if leaf.len() >= NAME_MAX => Err(FsError::InvalidPath),
        leaf => Ok(leaf),
    }
}
