use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Glob pattern (wrapper type for clarity), compiled by `PathFilter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteCfg {
    /// AList server reached over its HTTP API
    Alist {
        endpoint: String,
        username: String,
        #[serde(default)]
        password: Option<String>,
        /// File holding the password, read when `password` is absent
        #[serde(default)]
        password_file: Option<PathBuf>,
    },
}

/// Sync behaviour shared by every task unless overridden per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub overwrite_existing: bool,
    /// Delete remote orphans. `sync_delete` is accepted as the same switch.
    #[serde(alias = "sync_delete")]
    pub enable_cleanup: bool,
    pub full_sync_on_startup: bool,
    pub use_direct_link: bool,
    pub base_url: String,
    /// Seconds a path must stay quiet before its change is acted on
    pub debounce_delay: f64,
    /// Seconds a file's size must hold still before it is uploaded
    pub file_stable_time: f64,
    pub media_file_types: Vec<String>,
    pub ignore_file_types: Vec<String>,
    pub exclude: Vec<Pattern>,
    pub pointer_extension: String,
    /// Concurrent remote operations per task
    pub max_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            enable_cleanup: false,
            full_sync_on_startup: true,
            use_direct_link: false,
            base_url: String::new(),
            debounce_delay: 120.0,
            file_stable_time: 5.0,
            media_file_types: [
                "mp4", "mkv", "ts", "iso", "rmvb", "avi", "mov", "mpeg", "mpg", "wmv", "3gp",
                "asf", "m4v", "flv", "m2ts", "tp", "f4v",
            ]
            .iter()
            .map(|e| format!("*.{e}"))
            .collect(),
            ignore_file_types: vec![".mp".to_string()],
            exclude: Vec::new(),
            pointer_extension: "strm".to_string(),
            max_concurrency: 4,
        }
    }
}

impl SyncOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_delay.max(0.0))
    }

    pub fn stable_time(&self) -> Duration {
        Duration::from_secs_f64(self.file_stable_time.max(0.0))
    }

    fn apply(&self, o: &SyncOptionsOverride) -> SyncOptions {
        let mut out = self.clone();
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(v) = &o.$field { out.$field = v.clone(); })*
            };
        }
        merge!(
            overwrite_existing,
            enable_cleanup,
            full_sync_on_startup,
            use_direct_link,
            base_url,
            debounce_delay,
            file_stable_time,
            media_file_types,
            ignore_file_types,
            exclude,
            pointer_extension,
            max_concurrency
        );
        out
    }
}

/// Per-task overrides; every field left out inherits the global value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptionsOverride {
    pub overwrite_existing: Option<bool>,
    #[serde(alias = "sync_delete")]
    pub enable_cleanup: Option<bool>,
    pub full_sync_on_startup: Option<bool>,
    pub use_direct_link: Option<bool>,
    pub base_url: Option<String>,
    pub debounce_delay: Option<f64>,
    pub file_stable_time: Option<f64>,
    pub media_file_types: Option<Vec<String>>,
    pub ignore_file_types: Option<Vec<String>>,
    pub exclude: Option<Vec<Pattern>>,
    pub pointer_extension: Option<String>,
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPairCfg {
    #[serde(default)]
    pub name: Option<String>,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub media_prefix: String,
    /// Remote base directory; defaults to `media_prefix`
    #[serde(default)]
    pub remote_dir: Option<String>,
    #[serde(default)]
    pub overrides: SyncOptionsOverride,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub sync_directories: Vec<SyncPairCfg>,
    #[serde(flatten)]
    pub options: SyncOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub remote: RemoteCfg,
    pub sync: SyncSettings,
}

/// One monitored (source, target, remote) triple with its effective options.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct SyncTask {
    pub id: Uuid,
    pub name: String,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub remote_root: String,
    pub media_prefix: String,
    pub options: SyncOptions,
}

impl SyncTask {
    /// Build and validate a task. The source root is canonicalised.
    pub fn new(
        name: impl Into<String>,
        source_root: impl AsRef<Path>,
        target_root: impl AsRef<Path>,
        remote_root: impl Into<String>,
        media_prefix: impl Into<String>,
        options: SyncOptions,
    ) -> Result<Self> {
        let name = name.into();
        let source = source_root.as_ref();
        let meta = std::fs::metadata(source).map_err(|e| {
            SyncError::ConfigInvalid(format!(
                "task {name}: source_dir {} is not accessible: {e}",
                source.display()
            ))
        })?;
        if !meta.is_dir() {
            return Err(SyncError::ConfigInvalid(format!(
                "task {name}: source_dir {} is not a directory",
                source.display()
            )));
        }
        let source_root = std::fs::canonicalize(source).map_err(|e| SyncError::io(source, e))?;
        let target_root = absolute_lossy(target_root.as_ref());
        if resolve_existing(&target_root).starts_with(&source_root) {
            return Err(SyncError::ConfigInvalid(format!(
                "task {name}: target_dir {} lies inside source_dir {}",
                target_root.display(),
                source_root.display()
            )));
        }
        validate_options(&name, &options)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            source_root,
            target_root,
            remote_root: normalize_remote(&remote_root.into()),
            media_prefix: normalize_remote(&media_prefix.into()),
            options,
        })
    }
}

fn validate_options(name: &str, o: &SyncOptions) -> Result<()> {
    if !o.debounce_delay.is_finite() || o.debounce_delay < 0.0 {
        return Err(SyncError::ConfigInvalid(format!(
            "task {name}: debounce_delay must be a non-negative number of seconds"
        )));
    }
    if !o.file_stable_time.is_finite() || o.file_stable_time < 0.0 {
        return Err(SyncError::ConfigInvalid(format!(
            "task {name}: file_stable_time must be a non-negative number of seconds"
        )));
    }
    if o.max_concurrency == 0 {
        return Err(SyncError::ConfigInvalid(format!(
            "task {name}: max_concurrency must be at least 1"
        )));
    }
    let pointer = crate::classify::normalize_extension(&o.pointer_extension);
    if pointer.is_empty() {
        return Err(SyncError::ConfigInvalid(format!(
            "task {name}: pointer_extension is empty"
        )));
    }
    if o
        .ignore_file_types
        .iter()
        .any(|e| crate::classify::normalize_extension(e) == pointer)
    {
        return Err(SyncError::ConfigInvalid(format!(
            "task {name}: pointer extension .{pointer} is in ignore_file_types"
        )));
    }
    // Compile once here so a bad glob fails at startup.
    crate::filter::PathFilter::new(&o.exclude)?;
    Ok(())
}

fn absolute_lossy(p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p))
            .unwrap_or_else(|_| p.to_path_buf())
    }
}

/// Resolve symlinks through the deepest ancestor that exists, keeping the
/// not-yet-created tail as written.
fn resolve_existing(p: &Path) -> PathBuf {
    for ancestor in p.ancestors() {
        if let Ok(real) = std::fs::canonicalize(ancestor) {
            return match p.strip_prefix(ancestor) {
                Ok(tail) => real.join(tail),
                Err(_) => real,
            };
        }
    }
    p.to_path_buf()
}

fn normalize_remote(p: &str) -> String {
    let trimmed = p.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

impl AppConfig {
    /// Resolve every sync pair into a validated task.
    pub fn tasks(&self) -> Result<Vec<SyncTask>> {
        if self.sync.sync_directories.is_empty() {
            return Err(SyncError::ConfigInvalid(
                "sync.sync_directories is empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        self.sync
            .sync_directories
            .iter()
            .enumerate()
            .map(|(idx, pair)| {
                let name = pair
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("task-{}", idx + 1));
                if !seen.insert(name.clone()) {
                    return Err(SyncError::ConfigInvalid(format!(
                        "duplicate task name {name}"
                    )));
                }
                let remote = pair
                    .remote_dir
                    .clone()
                    .unwrap_or_else(|| pair.media_prefix.clone());
                SyncTask::new(
                    name,
                    &pair.source_dir,
                    &pair.target_dir,
                    remote,
                    pair.media_prefix.clone(),
                    self.sync.options.apply(&pair.overrides),
                )
            })
            .collect()
    }
}

/// Load a YAML or JSON config, picked by extension (YAML by default).
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    match ext {
        "json" => serde_json::from_str(&text)
            .map_err(|e| SyncError::ConfigInvalid(format!("{}: {e}", path.display()))),
        _ => serde_yaml::from_str(&text)
            .map_err(|e| SyncError::ConfigInvalid(format!("{}: {e}", path.display()))),
    }
}
