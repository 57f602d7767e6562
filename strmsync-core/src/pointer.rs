//! Pointer (`.strm`) file generation.

use crate::config::SyncTask;
use crate::error::{Result, SyncError};
use crate::remote::RemoteStore;
use crate::utils::join_remote;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};

/// Characters escaped inside one URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'|')
    .add(b'\\');

/// Percent-encode a `/`-separated path, keeping the separators.
pub fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|seg| utf8_percent_encode(seg, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Pointer content for base-URL mode: `base_url` followed by the escaped
/// logical path.
pub fn base_url_pointer(base_url: &str, logical_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = if logical_path.starts_with('/') {
        logical_path.to_string()
    } else {
        format!("/{logical_path}")
    };
    format!("{base}{}", escape_path(&path))
}

#[derive(Debug, Clone)]
pub struct PointerGenerator {
    target_root: PathBuf,
    media_prefix: String,
    extension: String,
    use_direct_link: bool,
    base_url: String,
}

impl PointerGenerator {
    pub fn new(task: &SyncTask) -> Self {
        Self {
            target_root: task.target_root.clone(),
            media_prefix: task.media_prefix.clone(),
            extension: crate::classify::normalize_extension(&task.options.pointer_extension),
            use_direct_link: task.options.use_direct_link,
            base_url: task.options.base_url.clone(),
        }
    }

    /// Local pointer path: the source-relative path under the target root
    /// with its extension swapped.
    pub fn pointer_path(&self, rel_path: &str) -> PathBuf {
        self.target_root
            .join(rel_path)
            .with_extension(&self.extension)
    }

    /// Path the media is published under, namespaced by the media prefix.
    pub fn logical_path(&self, rel_path: &str) -> String {
        join_remote(&self.media_prefix, rel_path)
    }

    /// Produce the single-line pointer content for a media file.
    /// `remote_path` is where the media was uploaded; it is only consulted
    /// for direct links.
    pub async fn make_pointer(
        &self,
        rel_path: &str,
        remote_path: &str,
        remote: &dyn RemoteStore,
    ) -> Result<String> {
        let content = if self.use_direct_link {
            remote.resolve_direct_link(remote_path).await?
        } else {
            base_url_pointer(&self.base_url, &self.logical_path(rel_path))
        };
        Ok(content.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Write the pointer unless the file already holds exactly `content`.
    /// Returns whether a write happened.
    pub async fn write_pointer(&self, rel_path: &str, content: &str) -> Result<bool> {
        let path = self.pointer_path(rel_path);
        if let Ok(existing) = tokio::fs::read_to_string(&path).await {
            if existing == content {
                return Ok(false);
            }
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        Ok(true)
    }

    /// Remove the pointer for a media file. A missing pointer is fine.
    pub async fn remove_pointer(&self, rel_path: &str) -> Result<bool> {
        remove_file_if_exists(&self.pointer_path(rel_path)).await
    }

    pub async fn pointer_exists(&self, rel_path: &str) -> bool {
        tokio::fs::metadata(self.pointer_path(rel_path)).await.is_ok()
    }
}

pub(crate) async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::io(path, e)),
    }
}
