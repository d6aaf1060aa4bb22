use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::security::SecurityError;

/// Errors raised while preparing or running a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to resolve {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by the deletion engine
#[derive(Debug, Error)]
pub enum CleanError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("failed to resolve working directory {}: {source}", path.display())]
    ResolveWorkingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("working directory is not a directory: {}", .0.display())]
    WorkingDirNotADirectory(PathBuf),

    #[error("directory does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open directory {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "failed to remove {} ({} entries could not be removed): {source}",
        path.display(),
        failures.len()
    )]
    Incomplete {
        path: PathBuf,
        failures: Vec<EntryFailure>,
        #[source]
        source: io::Error,
    },
}

impl CleanError {
    /// Per-entry failures accumulated before the target itself failed
    pub fn entry_failures(&self) -> &[EntryFailure] {
        match self {
            CleanError::Incomplete { failures, .. } => failures,
            _ => &[],
        }
    }

    /// Whether this error is a security rejection rather than an I/O problem
    pub fn is_security_violation(&self) -> bool {
        matches!(self, CleanError::Security(_))
    }
}

/// A single entry inside a target that was left on disk
#[derive(Debug, Error)]
pub enum EntryFailure {
    #[error(transparent)]
    Rejected(#[from] SecurityError),

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl EntryFailure {
    pub(crate) fn io(path: &Path, action: &'static str, source: io::Error) -> Self {
        EntryFailure::Io {
            path: path.to_path_buf(),
            action,
            source,
        }
    }

    /// Path of the entry that failed
    pub fn path(&self) -> &Path {
        match self {
            EntryFailure::Rejected(err) => &err.path,
            EntryFailure::Io { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityReason;

    #[test]
    fn test_entry_failure_path() {
        let rejected = EntryFailure::from(SecurityError::new(
            PathBuf::from("/w/node_modules/link"),
            SecurityReason::OutsideWorkingDir,
        ));
        assert_eq!(rejected.path(), Path::new("/w/node_modules/link"));

        let io_failure = EntryFailure::io(
            Path::new("/w/dist/a.js"),
            "remove file",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(io_failure.path(), Path::new("/w/dist/a.js"));
        assert!(io_failure.to_string().starts_with("failed to remove file /w/dist/a.js"));
    }

    #[test]
    fn test_clean_error_helpers() {
        let err = CleanError::Incomplete {
            path: PathBuf::from("/w/dist"),
            failures: vec![EntryFailure::io(
                Path::new("/w/dist/x"),
                "remove file",
                io::Error::from(io::ErrorKind::PermissionDenied),
            )],
            source: io::Error::from(io::ErrorKind::DirectoryNotEmpty),
        };
        assert_eq!(err.entry_failures().len(), 1);
        assert!(!err.is_security_violation());
        assert!(err.to_string().contains("1 entries could not be removed"));

        let err = CleanError::from(SecurityError::new(
            PathBuf::from("/etc"),
            SecurityReason::OutsideWorkingDir,
        ));
        assert!(err.is_security_violation());
        assert!(err.entry_failures().is_empty());
        assert_eq!(
            err.to_string(),
            "security violation for path /etc: path is outside working directory"
        );
    }
}
