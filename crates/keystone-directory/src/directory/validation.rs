//! Path validation for directory operations.
//!
//! Empty components are valid names. Only resource bounds are enforced.

use crate::constants::MAX_DIRECTORY_DEPTH;
use crate::constants::MAX_PATH_COMPONENT_LENGTH;
use crate::directory::DirectoryError;

/// Validate a caller-supplied path and take ownership of it.
pub fn validate_path(path: &[&str]) -> Result<Vec<String>, DirectoryError> {
    if path.len() > MAX_DIRECTORY_DEPTH {
        return Err(DirectoryError::PathTooDeep {
            depth: path.len(),
            max: MAX_DIRECTORY_DEPTH,
        });
    }

    for component in path {
        if component.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(DirectoryError::InvalidPath {
                component: truncate(component),
                reason: format!("component exceeds {MAX_PATH_COMPONENT_LENGTH} bytes"),
            });
        }
    }

    Ok(path.iter().map(|c| (*c).to_string()).collect())
}

/// Check the depth of a path assembled from a handle and a relative path.
pub(crate) fn check_depth(path: &[String]) -> Result<(), DirectoryError> {
    if path.len() > MAX_DIRECTORY_DEPTH {
        return Err(DirectoryError::PathTooDeep {
            depth: path.len(),
            max: MAX_DIRECTORY_DEPTH,
        });
    }
    Ok(())
}

fn truncate(component: &str) -> String {
    component.chars().take(32).collect()
}
