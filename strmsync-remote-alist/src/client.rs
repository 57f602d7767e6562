use crate::api::{
    ApiFailure, Envelope, GetData, GetReq, ListData, ListReq, LoginData, LoginReq, MoveReq, Obj,
    PathReq, RemoveReq, RenameReq,
};
use anyhow::{anyhow, Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

const PAGE_SIZE: u32 = 500;
const UNAUTHORIZED: i64 = 401;

/// Characters kept verbatim in the `File-Path` header.
const FILE_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn encode_file_path(path: &str) -> String {
    utf8_percent_encode(path, FILE_PATH).to_string()
}

/// Thin token-authenticated client for the AList HTTP API.
pub struct AlistClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: String,
    token: RwLock<String>,
}

impl AlistClient {
    pub async fn login(endpoint: &str, username: &str, password: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("building http client")?;
        let client = Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            token: RwLock::new(String::new()),
        };
        client.relogin().await?;
        info!(endpoint = %client.endpoint, user = %client.username, "logged in to alist");
        Ok(client)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn relogin(&self) -> Result<String> {
        let url = format!("{}/api/auth/login", self.endpoint);
        let env: Envelope<LoginData> = self
            .http
            .post(&url)
            .json(&LoginReq {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()?
            .json()
            .await?;
        let data = env
            .into_result()?
            .ok_or_else(|| anyhow!("login response without token"))?;
        *self.token.write().await = data.token.clone();
        Ok(data.token)
    }

    async fn post_once<B, T>(&self, api: &str, body: &B, token: &str) -> Result<Envelope<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{api}", self.endpoint);
        let env = self
            .http
            .post(&url)
            .header(AUTHORIZATION, token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("decoding {api} response"))?;
        Ok(env)
    }

    /// POST a JSON body, logging in again once when the token has expired.
    async fn post<B, T>(&self, api: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.token.read().await.clone();
        let mut env: Envelope<T> = self.post_once(api, body, &token).await?;
        if env.code == UNAUTHORIZED {
            debug!(api, "token rejected, logging in again");
            let token = self.relogin().await?;
            env = self.post_once(api, body, &token).await?;
        }
        Ok(env.into_result()?)
    }

    pub async fn list(&self, path: &str) -> Result<Vec<Obj>> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let req = ListReq {
                path,
                password: "",
                page,
                per_page: PAGE_SIZE,
                refresh: false,
            };
            let data: Option<ListData> = self.post("/api/fs/list", &req).await?;
            let Some(data) = data else { break };
            let content = data.content.unwrap_or_default();
            let fetched = content.len();
            out.extend(content);
            if fetched == 0 || out.len() as u64 >= data.total {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    /// Stream a local file to `path`. AList creates missing parents.
    pub async fn put(&self, path: &str, local: &Path) -> Result<()> {
        let token = self.token.read().await.clone();
        let mut env = self.put_once(path, local, &token).await?;
        if env.code == UNAUTHORIZED {
            let token = self.relogin().await?;
            env = self.put_once(path, local, &token).await?;
        }
        env.into_result()?;
        Ok(())
    }

    async fn put_once(&self, path: &str, local: &Path, token: &str) -> Result<Envelope<IgnoredAny>> {
        let file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("opening {}", local.display()))?;
        let len = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let url = format!("{}/api/fs/put", self.endpoint);
        let env = self
            .http
            .put(&url)
            .header(AUTHORIZATION, token)
            .header("File-Path", encode_file_path(path))
            .header("As-Task", "false")
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await
            .with_context(|| format!("PUT {url}"))?
            .error_for_status()?
            .json()
            .await?;
        Ok(env)
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        self.post::<_, IgnoredAny>("/api/fs/mkdir", &PathReq { path })
            .await
            .map(|_| ())
    }

    pub async fn remove(&self, dir: &str, name: &str) -> Result<()> {
        let req = RemoveReq {
            dir,
            names: vec![name],
        };
        self.post::<_, IgnoredAny>("/api/fs/remove", &req)
            .await
            .map(|_| ())
    }

    pub async fn rename(&self, path: &str, name: &str) -> Result<()> {
        self.post::<_, IgnoredAny>("/api/fs/rename", &RenameReq { path, name })
            .await
            .map(|_| ())
    }

    pub async fn move_to(&self, src_dir: &str, dst_dir: &str, name: &str) -> Result<()> {
        let req = MoveReq {
            src_dir,
            dst_dir,
            names: vec![name],
        };
        self.post::<_, IgnoredAny>("/api/fs/move", &req)
            .await
            .map(|_| ())
    }

    pub async fn get(&self, path: &str) -> Result<GetData> {
        let data: Option<GetData> = self.post("/api/fs/get", &GetReq { path, password: "" }).await?;
        data.ok_or_else(|| anyhow::Error::new(ApiFailure {
            code: 404,
            message: format!("object not found: {path}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_header_is_ascii() {
        assert_eq!(encode_file_path("/media/a b.mkv"), "/media/a%20b.mkv");
        assert_eq!(encode_file_path("/电影/x.mp4"), "/%E7%94%B5%E5%BD%B1/x.mp4");
        assert!(encode_file_path("/a#b?c&d").is_ascii());
        assert_eq!(encode_file_path("/a#b"), "/a%23b");
    }
}
