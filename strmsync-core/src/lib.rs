//! Core library for strmsync: debounced directory watching, reconciliation
//! against a remote file store and pointer file generation.

mod classify;
mod config;
mod debounce;
mod error;
mod event;
mod filter;
mod manager;
mod pointer;
mod reconcile;
mod remote;
mod task;
mod utils;

pub use classify::{normalize_extension, Classifier, FileClass};
pub use config::{
    load_config, AppConfig, Pattern, RemoteCfg, SyncOptions, SyncOptionsOverride, SyncPairCfg,
    SyncSettings, SyncTask,
};
pub use debounce::{Debouncer, IntentKind, PendingIntent};
pub use error::{RemoteError, Result, SyncError};
pub use event::{from_notify, ChangeEvent, ChangeKind};
pub use filter::PathFilter;
pub use manager::SyncManager;
pub use pointer::{base_url_pointer, escape_path, PointerGenerator};
pub use reconcile::{Outcome, Reconciler, StatsSnapshot, SweepReport, TaskStats};
pub use remote::{RemoteEntry, RemoteStore};
pub use task::{spawn_task, SyncTaskHandle, TaskCommand, TaskState};
pub use utils::{join_remote, split_remote};
