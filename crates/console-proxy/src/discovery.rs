//! Locating the serial console socket of the VM sharing this Pod.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;

use crate::error::ProxyError;

/// Serial console socket created by virt-launcher in the per-VM directory.
pub const SOCKET_NAME: &str = "virt-serial0";

/// Resolve `<dir>/<only subdirectory>/virt-serial0`.
///
/// The socket itself is not required to exist yet; the relay dials it per
/// connection.
///
/// # Errors
///
/// - [`ProxyError::SocketDirUnreadable`] if `dir` cannot be listed
/// - [`ProxyError::AmbiguousSocketDir`] unless `dir` has exactly one
///   subdirectory
pub fn discover_socket_path(dir: &Path) -> Result<PathBuf, Report<ProxyError>> {
    let unreadable = || ProxyError::SocketDirUnreadable {
        path: dir.display().to_string(),
    };

    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir).change_context_lazy(unreadable)? {
        let entry = entry.change_context_lazy(unreadable)?;
        if entry.file_type().change_context_lazy(unreadable)?.is_dir() {
            subdirs.push(entry.file_name());
        }
    }

    match subdirs.as_slice() {
        [only] => Ok(dir.join(only).join(SOCKET_NAME)),
        _ => Err(Report::new(ProxyError::AmbiguousSocketDir {
            path: dir.display().to_string(),
            count: subdirs.len(),
        })
        .attach_printable(format!("subdirectories: {subdirs:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use similar_asserts::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn single_subdirectory_resolves_socket() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("vm-uid")).unwrap();
        fs::write(dir.path().join("vm-uid").join(SOCKET_NAME), b"").unwrap();

        let path = discover_socket_path(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("vm-uid").join("virt-serial0"));
    }

    #[test]
    fn plain_files_are_ignored() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("vm-uid")).unwrap();
        fs::write(dir.path().join("stray.sock"), b"").unwrap();

        let path = discover_socket_path(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("vm-uid").join(SOCKET_NAME));
    }

    #[test]
    fn no_subdirectory_fails() {
        let dir = tempdir().unwrap();

        let err = discover_socket_path(dir.path()).unwrap_err();

        assert!(matches!(
            err.current_context(),
            ProxyError::AmbiguousSocketDir { count: 0, .. }
        ));
    }

    #[test]
    fn two_subdirectories_fail() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();

        let err = discover_socket_path(dir.path()).unwrap_err();

        assert!(matches!(
            err.current_context(),
            ProxyError::AmbiguousSocketDir { count: 2, .. }
        ));
    }

    #[test]
    fn missing_directory_is_unreadable() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");

        let err = discover_socket_path(&missing).unwrap_err();

        assert!(matches!(
            err.current_context(),
            ProxyError::SocketDirUnreadable { .. }
        ));
    }
}
