use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};

/// Default base directory for endpoint paths.
#[cfg(unix)]
pub const DEFAULT_BASE_PATH: &str = "/tmp/";
#[cfg(windows)]
pub const DEFAULT_BASE_PATH: &str = r"\\.\pipe\";

/// Characters rejected in endpoint names beyond path separators:
/// whitespace and shell metacharacters. The name ends up in a filesystem
/// path and in log lines, so it has to be safe to paste into a shell.
const REJECTED: &[char] = &[
    '*', '?', '[', ']', '{', '}', '(', ')', '<', '>', '|', '&', ';', '$', '`', '\'', '"', '!', '~',
    '#',
];

/// Validate an endpoint name.
///
/// A name must be non-empty, must not contain path separators, and must
/// not contain whitespace or shell metacharacters.
pub fn validate_endpoint_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TransportError::InvalidName {
            name: name.to_string(),
            reason: "name must not be empty",
        });
    }
    if name.contains('/') || name.contains('\\') {
        return Err(TransportError::InvalidName {
            name: name.to_string(),
            reason: "name must not contain path separators",
        });
    }
    if name.chars().any(char::is_whitespace) {
        return Err(TransportError::InvalidName {
            name: name.to_string(),
            reason: "name must not contain whitespace",
        });
    }
    if name.chars().any(|c| REJECTED.contains(&c) || c.is_control()) {
        return Err(TransportError::InvalidName {
            name: name.to_string(),
            reason: "name must not contain shell metacharacters",
        });
    }
    Ok(())
}

/// Build the endpoint path for a validated name.
///
/// POSIX: `<base>/<name>.sock`. Windows: `<base>\<name>`.
pub fn endpoint_path(base: &Path, name: &str) -> PathBuf {
    #[cfg(unix)]
    {
        base.join(format!("{name}.sock"))
    }
    #[cfg(windows)]
    {
        base.join(name)
    }
}
