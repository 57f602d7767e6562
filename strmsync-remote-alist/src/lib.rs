//! AList backend for the strmsync remote store.

mod api;
mod client;

use crate::api::ApiFailure;
use anyhow::{bail, Context};
use async_trait::async_trait;
use client::AlistClient;
use std::path::Path;
use strmsync_core::{
    escape_path, join_remote, split_remote, RemoteCfg, RemoteEntry, RemoteError, RemoteStore,
};
use tracing::{debug, warn};

pub struct AlistRemote {
    client: AlistClient,
}

impl AlistRemote {
    pub async fn connect(endpoint: &str, username: &str, password: &str) -> anyhow::Result<Self> {
        let client = AlistClient::login(endpoint, username, password).await?;
        Ok(Self { client })
    }

    /// Connect using the `remote` section of the configuration. The password
    /// comes from `password`, or else from the trimmed `password_file`.
    pub async fn from_config(cfg: &RemoteCfg) -> anyhow::Result<Self> {
        match cfg {
            RemoteCfg::Alist {
                endpoint,
                username,
                password,
                password_file,
            } => {
                let password = match (password, password_file) {
                    (Some(p), _) => p.clone(),
                    (None, Some(file)) => tokio::fs::read_to_string(file)
                        .await
                        .with_context(|| format!("reading password file {}", file.display()))?
                        .trim()
                        .to_string(),
                    (None, None) => bail!("alist needs either password or password_file"),
                };
                Self::connect(endpoint, username, &password).await
            }
        }
    }
}

/// Map an AList answer code and message onto the engine's error kinds.
fn classify_failure(code: i64, message: &str, path: &str) -> RemoteError {
    let msg = message.to_lowercase();
    let detail = format!("{path}: {message}");
    if code == 401 || code == 403 {
        RemoteError::Unavailable(format!("{detail} (authentication)"))
    } else if msg.contains("not found") || msg.contains("no such") || msg.contains("not exist") {
        RemoteError::NotFound(detail)
    } else if msg.contains("exist") {
        RemoteError::Conflict(detail)
    } else if msg.contains("quota") || msg.contains("space") || msg.contains("storage full") {
        RemoteError::QuotaExceeded(detail)
    } else {
        RemoteError::Unavailable(detail)
    }
}

fn map_error(err: anyhow::Error, path: &str) -> RemoteError {
    if let Some(failure) = err.downcast_ref::<ApiFailure>() {
        return classify_failure(failure.code, &failure.message, path);
    }
    if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        if let Some(status) = http.status() {
            if status == reqwest::StatusCode::PAYLOAD_TOO_LARGE
                || status == reqwest::StatusCode::INSUFFICIENT_STORAGE
            {
                return RemoteError::QuotaExceeded(format!("{path}: {status}"));
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return RemoteError::NotFound(format!("{path}: {status}"));
            }
        }
    }
    RemoteError::Unavailable(format!("{path}: {err:#}"))
}

/// How a remote move is expressed with AList's rename (same directory) and
/// move (same name) primitives.
#[derive(Debug, PartialEq, Eq)]
enum RenamePlan<'a> {
    Rename {
        path: &'a str,
        name: &'a str,
    },
    Move {
        src_dir: &'a str,
        dst_dir: &'a str,
        name: &'a str,
    },
    MoveThenRename {
        src_dir: &'a str,
        dst_dir: &'a str,
        old_name: &'a str,
        new_name: &'a str,
    },
}

fn plan_rename<'a>(from: &'a str, to: &'a str) -> RenamePlan<'a> {
    let (src_dir, old_name) = split_remote(from);
    let (dst_dir, new_name) = split_remote(to);
    if src_dir == dst_dir {
        RenamePlan::Rename {
            path: from,
            name: new_name,
        }
    } else if old_name == new_name {
        RenamePlan::Move {
            src_dir,
            dst_dir,
            name: old_name,
        }
    } else {
        RenamePlan::MoveThenRename {
            src_dir,
            dst_dir,
            old_name,
            new_name,
        }
    }
}

fn direct_link(endpoint: &str, path: &str, raw_url: &str, sign: &str) -> String {
    if !raw_url.is_empty() {
        return raw_url.to_string();
    }
    let base = format!("{endpoint}/d{}", escape_path(path));
    if sign.is_empty() {
        base
    } else {
        format!("{base}?sign={sign}")
    }
}

#[async_trait]
impl RemoteStore for AlistRemote {
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let objs = self.client.list(path).await.map_err(|e| map_error(e, path))?;
        debug!(remote = %path, entries = objs.len(), "listed");
        Ok(objs
            .into_iter()
            .map(|o| RemoteEntry {
                path: join_remote(path, &o.name),
                modified: o.modified_time(),
                size: o.size.max(0) as u64,
                is_dir: o.is_dir,
                name: o.name,
            })
            .collect())
    }

    async fn upload(&self, path: &str, local: &Path) -> Result<(), RemoteError> {
        self.client
            .put(path, local)
            .await
            .map_err(|e| map_error(e, path))
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let (dir, name) = split_remote(path);
        self.client
            .remove(dir, name)
            .await
            .map_err(|e| map_error(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        let result = match plan_rename(from, to) {
            RenamePlan::Rename { path, name } => self.client.rename(path, name).await,
            RenamePlan::Move {
                src_dir,
                dst_dir,
                name,
            } => {
                self.client.mkdir(dst_dir).await.map_err(|e| map_error(e, dst_dir))?;
                self.client.move_to(src_dir, dst_dir, name).await
            }
            RenamePlan::MoveThenRename {
                src_dir,
                dst_dir,
                old_name,
                new_name,
            } => {
                self.client.mkdir(dst_dir).await.map_err(|e| map_error(e, dst_dir))?;
                self.client.move_to(src_dir, dst_dir, old_name).await.map_err(|e| map_error(e, from))?;
                let moved = join_remote(dst_dir, old_name);
                let renamed = self.client.rename(&moved, new_name).await;
                if renamed.is_err() {
                    warn!(remote = %moved, "moved but rename failed; entry left under its old name");
                }
                renamed
            }
        };
        result.map_err(|e| map_error(e, from))
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        self.client.mkdir(path).await.map_err(|e| map_error(e, path))
    }

    async fn resolve_direct_link(&self, path: &str) -> Result<String, RemoteError> {
        let data = self.client.get(path).await.map_err(|e| map_error(e, path))?;
        Ok(direct_link(self.client.endpoint(), path, &data.raw_url, &data.sign))
    }
}
