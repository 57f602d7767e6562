use crate::error::RemoteError;
use crate::utils::split_remote;
use async_trait::async_trait;
use std::path::Path;
use std::time::SystemTime;

/// One listed remote path. Only lives for the duration of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Absolute remote path
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

/// Operations the engine needs from the remote file store. Implementations
/// are shared between tasks and must be safe to call concurrently.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Children of a remote directory. `NotFound` when the directory is absent.
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;
    /// Upload a local file, creating missing parent directories.
    async fn upload(&self, path: &str, local: &Path) -> Result<(), RemoteError>;
    /// Delete a file or a whole directory.
    async fn delete(&self, path: &str) -> Result<(), RemoteError>;
    async fn rename(&self, from: &str, to: &str) -> Result<(), RemoteError>;
    async fn mkdir(&self, path: &str) -> Result<(), RemoteError>;
    async fn resolve_direct_link(&self, path: &str) -> Result<String, RemoteError>;

    async fn ping(&self) -> Result<(), RemoteError> {
        self.list("/").await.map(|_| ())
    }

    /// Look up a single path through a listing of its parent.
    async fn stat(&self, path: &str) -> Result<Option<RemoteEntry>, RemoteError> {
        let (parent, name) = split_remote(path);
        match self.list(parent).await {
            Ok(entries) => Ok(entries.into_iter().find(|e| e.name == name)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
