//! Request and response bodies of the AList v3 HTTP API.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Every response is wrapped like this, usually with HTTP 200 even on failure.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<Option<T>, ApiFailure> {
        if self.code == 200 {
            Ok(self.data)
        } else {
            Err(ApiFailure {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// A request AList answered with a non-200 code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("alist error {code}: {message}")]
pub struct ApiFailure {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginReq<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ListReq<'a> {
    pub path: &'a str,
    pub password: &'a str,
    pub page: u32,
    pub per_page: u32,
    pub refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListData {
    /// `null` for an empty directory
    #[serde(default)]
    pub content: Option<Vec<Obj>>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Obj {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub modified: String,
}

impl Obj {
    /// Modification time, `None` when AList reports a zero date.
    pub fn modified_time(&self) -> Option<SystemTime> {
        let dt = DateTime::parse_from_rfc3339(&self.modified).ok()?;
        (dt.timestamp() > 0).then(|| SystemTime::from(dt))
    }
}

#[derive(Debug, Serialize)]
pub struct PathReq<'a> {
    pub path: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GetReq<'a> {
    pub path: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct GetData {
    #[serde(default)]
    pub raw_url: String,
    #[serde(default)]
    pub sign: String,
}

#[derive(Debug, Serialize)]
pub struct RemoveReq<'a> {
    pub dir: &'a str,
    pub names: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct RenameReq<'a> {
    pub path: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct MoveReq<'a> {
    pub src_dir: &'a str,
    pub dst_dir: &'a str,
    pub names: Vec<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_listing() {
        let body = r#"{"code":200,"message":"success","data":{"content":[
            {"name":"a.mkv","size":1024,"is_dir":false,"modified":"2024-03-01T10:00:00+08:00"},
            {"name":"Season 1","size":0,"is_dir":true,"modified":"0001-01-01T00:00:00Z"}
        ],"total":2}}"#;
        let env: Envelope<ListData> = serde_json::from_str(body).unwrap();
        let data = env.into_result().unwrap().unwrap();
        let content = data.content.unwrap();
        assert_eq!(data.total, 2);
        assert_eq!(content[0].size, 1024);
        assert!(content[0].modified_time().is_some());
        assert!(content[1].is_dir);
        assert!(content[1].modified_time().is_none());
    }

    #[test]
    fn empty_directory_has_null_content() {
        let body = r#"{"code":200,"message":"success","data":{"content":null,"total":0}}"#;
        let env: Envelope<ListData> = serde_json::from_str(body).unwrap();
        assert!(env.into_result().unwrap().unwrap().content.is_none());
    }

    #[test]
    fn non_200_code_is_a_failure() {
        let body = r#"{"code":500,"message":"object not found","data":null}"#;
        let env: Envelope<ListData> = serde_json::from_str(body).unwrap();
        let err = env.into_result().unwrap_err();
        assert_eq!(err.code, 500);
        assert_eq!(err.message, "object not found");
        assert_eq!(err.to_string(), "alist error 500: object not found");
    }
}
