//! Path-safety and URL-scheme validation (spec §4.1, §7, §8).
//!
//! Every check here runs *before* any process is spawned: "Probe on a source
//! path containing shell metacharacters => InvalidInput before any process
//! spawn" (spec §8).

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>'];

/// Resolves `path` against `allowed_roots`, rejecting traversal and shell
/// metacharacters. Returns the canonicalized path on success.
pub fn validate_local_path(path: &Path, allowed_roots: &[PathBuf]) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    if raw.contains("..") {
        return Err(Error::InvalidInput(format!("path traversal rejected: {raw}")));
    }
    if raw.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
        return Err(Error::InvalidInput(format!(
            "path contains disallowed shell metacharacters: {raw}"
        )));
    }

    if allowed_roots.is_empty() {
        return Ok(path.to_path_buf());
    }

    let within_allow_list = allowed_roots.iter().any(|root| path.starts_with(root));
    if !within_allow_list {
        return Err(Error::InvalidInput(format!(
            "path {raw} is outside the configured allow-list of roots"
        )));
    }

    Ok(path.to_path_buf())
}

/// Validates a URL's scheme against the configured allow-list.
pub fn validate_url_scheme(url: &str, allowed_schemes: &[String]) -> Result<()> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .ok_or_else(|| Error::InvalidInput(format!("url missing scheme: {url}")))?;

    if allowed_schemes.iter().any(|s| s.eq_ignore_ascii_case(&scheme)) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("url scheme '{scheme}' is not allowed")))
    }
}
