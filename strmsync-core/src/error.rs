use std::path::PathBuf;

/// Failure reported by a remote store backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Transport, authentication or server side failure. Transient.
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("remote path not found: {0}")]
    NotFound(String),
    #[error("remote quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("remote conflict: {0}")]
    Conflict(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
