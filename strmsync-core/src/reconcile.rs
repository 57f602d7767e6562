//! Turns settled intents and full-tree comparisons into remote operations.
//!
//! Failures are contained per path: they are logged, counted and never
//! retried here. The next change of the same file or the next full sweep
//! repairs them.

use crate::classify::{Classifier, FileClass};
use crate::config::SyncTask;
use crate::debounce::{Debouncer, IntentKind, PendingIntent};
use crate::error::{Result, SyncError};
use crate::event::ChangeEvent;
use crate::filter::PathFilter;
use crate::pointer::{remove_file_if_exists, PointerGenerator};
use crate::remote::{RemoteEntry, RemoteStore};
use crate::utils::{is_within, join_remote, relative_posix};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

fn matches_kind(entry: &RemoteEntry, size: Option<u64>) -> bool {
    match size {
        Some(size) => !entry.is_dir && entry.size == size,
        None => entry.is_dir,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Uploaded,
    Renamed,
    Deleted,
    DirCreated,
    /// Copied into the target root only
    Mirrored,
    /// Already in sync, or nothing allowed to change
    Skipped,
    Ignored,
    /// Still being written; queued again
    Unsettled,
    Failed,
}

/// Per-task counters, shared with the task handle.
#[derive(Debug, Default)]
pub struct TaskStats {
    uploaded: AtomicU64,
    renamed: AtomicU64,
    deleted: AtomicU64,
    dirs_created: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    pointers_written: AtomicU64,
    mirrored: AtomicU64,
    deferred: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub uploaded: u64,
    pub renamed: u64,
    pub deleted: u64,
    pub dirs_created: u64,
    pub skipped: u64,
    pub failed: u64,
    pub pointers_written: u64,
    pub mirrored: u64,
    pub deferred: u64,
}

impl TaskStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            uploaded: get(&self.uploaded),
            renamed: get(&self.renamed),
            deleted: get(&self.deleted),
            dirs_created: get(&self.dirs_created),
            skipped: get(&self.skipped),
            failed: get(&self.failed),
            pointers_written: get(&self.pointers_written),
            mirrored: get(&self.mirrored),
            deferred: get(&self.deferred),
        }
    }

    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Uploaded => &self.uploaded,
            Outcome::Renamed => &self.renamed,
            Outcome::Deleted => &self.deleted,
            Outcome::DirCreated => &self.dirs_created,
            Outcome::Skipped => &self.skipped,
            Outcome::Failed => &self.failed,
            Outcome::Unsettled => &self.deferred,
            Outcome::Mirrored | Outcome::Ignored => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Summary of one full sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub local_entries: usize,
    pub remote_entries: usize,
    pub uploaded: usize,
    pub deleted: usize,
    pub dirs_created: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Subtrees whose listing failed; no cleanup happened below them
    pub unknown_subtrees: Vec<String>,
}

#[derive(Debug, Clone)]
struct LocalEntry {
    path: PathBuf,
    rel: String,
    is_dir: bool,
    size: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct LocalTree {
    entries: Vec<LocalEntry>,
    unreadable: Vec<String>,
}

#[derive(Debug, Default)]
struct RemoteTree {
    entries: HashMap<String, RemoteEntry>,
    /// Relative directories whose listing failed. `""` is the whole tree.
    unknown: Vec<String>,
}

impl RemoteTree {
    fn is_unknown(&self, rel: &str) -> bool {
        self.unknown.iter().any(|u| u.is_empty() || is_within(rel, u))
    }
}

/// What the sweep knows about a path's remote counterpart.
#[derive(Debug, Clone)]
enum Lookup {
    Known(Option<RemoteEntry>),
    Unknown,
}

pub struct Reconciler {
    task: Arc<SyncTask>,
    classifier: Classifier,
    pointers: PointerGenerator,
    remote: Arc<dyn RemoteStore>,
    stats: Arc<TaskStats>,
    requeue: Option<Arc<Debouncer>>,
}

impl Reconciler {
    pub fn new(
        task: Arc<SyncTask>,
        remote: Arc<dyn RemoteStore>,
        stats: Arc<TaskStats>,
    ) -> Result<Self> {
        let filter = PathFilter::new(&task.options.exclude)?;
        let classifier = Classifier::new(
            &task.options.media_file_types,
            &task.options.ignore_file_types,
            &task.options.pointer_extension,
            filter,
        );
        let pointers = PointerGenerator::new(&task);
        Ok(Self {
            task,
            classifier,
            pointers,
            remote,
            stats,
            requeue: None,
        })
    }

    /// Files found still growing are observed again on `debouncer`.
    pub fn with_requeue(mut self, debouncer: Arc<Debouncer>) -> Self {
        self.requeue = Some(debouncer);
        self
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn remote_path(&self, rel: &str) -> String {
        join_remote(&self.task.remote_root, rel)
    }

    fn mirror_path(&self, rel: &str) -> PathBuf {
        self.task.target_root.join(rel)
    }

    fn settle(&self, rel: &str, result: Result<Outcome>) -> Outcome {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(path = %rel, error = %e, "sync failed; left for the next change or full sweep");
                Outcome::Failed
            }
        };
        if outcome == Outcome::Unsettled {
            debug!(path = %rel, "size still changing, queued again");
            if let Some(debouncer) = &self.requeue {
                debouncer.observe(ChangeEvent::modified(self.task.source_root.join(rel)));
            }
        }
        self.stats.record(outcome);
        outcome
    }

    /// Apply one settled intent. Never fails: errors are logged and counted.
    pub async fn apply(&self, intent: PendingIntent) -> Outcome {
        let Some(rel) = relative_posix(&self.task.source_root, &intent.path) else {
            debug!(path = %intent.path.display(), "outside source root, ignored");
            return Outcome::Ignored;
        };
        let result = if intent.kind.is_delete() {
            self.remove_absent(&rel).await
        } else {
            self.sync_present(&intent.path, &rel, intent.kind, intent.renamed_from.as_deref())
                .await
        };
        self.settle(&rel, result)
    }

    /// Apply a drained batch. Each path appears once per batch, so paths run
    /// concurrently within a phase. Directories go first, since their walk
    /// covers children that have no intent of their own; deletions go last so
    /// a rename can still see its source entry.
    pub async fn apply_batch(&self, intents: Vec<PendingIntent>) -> Vec<Outcome> {
        let limit = self.task.options.max_concurrency.max(1);
        let (deletes, others): (Vec<_>, Vec<_>) =
            intents.into_iter().partition(|i| i.kind.is_delete());
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for intent in others {
            match tokio::fs::metadata(&intent.path).await {
                Ok(meta) if meta.is_dir() => dirs.push(intent),
                _ => files.push(intent),
            }
        }
        // A created directory's walk covers everything below it.
        let roots: Vec<PathBuf> = dirs
            .iter()
            .filter(|i| i.kind != IntentKind::Modified)
            .map(|i| i.path.clone())
            .collect();
        let covered = |i: &PendingIntent| roots.iter().any(|r| *r != i.path && i.path.starts_with(r));
        dirs.retain(|i| !covered(i));
        files.retain(|i| !covered(i));

        let mut outcomes = Vec::new();
        for phase in [dirs, files, deletes] {
            let mut done: Vec<Outcome> = stream::iter(phase)
                .map(|intent| self.apply(intent))
                .buffer_unordered(limit)
                .collect()
                .await;
            outcomes.append(&mut done);
        }
        outcomes
    }

    async fn sync_present(
        &self,
        path: &Path,
        rel: &str,
        kind: IntentKind,
        renamed_from: Option<&Path>,
    ) -> Result<Outcome> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %rel, "gone before settling, treating as deleted");
                return self.remove_absent(rel).await;
            }
            Err(e) => return Err(SyncError::io(path, e)),
        };
        if meta.is_dir() {
            // Metadata changes on a known directory say nothing about its
            // children; only a directory new to the remote is walked.
            if kind == IntentKind::Modified {
                if self.classifier.is_excluded(rel) {
                    return Ok(Outcome::Ignored);
                }
                let outcome = self.ensure_dir(rel, None).await?;
                if outcome == Outcome::DirCreated {
                    self.sync_children(path).await?;
                }
                return Ok(outcome);
            }
            return self.sync_dir(path, rel, renamed_from).await;
        }
        let stable = self.stable_time();
        if !stable.is_zero() {
            tokio::time::sleep(stable).await;
            match self.current_size(path).await? {
                Some(size) if size == meta.len() => {}
                _ => return Ok(Outcome::Unsettled),
            }
        }
        self.sync_file(path, rel, meta.len(), renamed_from).await
    }

    fn stable_time(&self) -> std::time::Duration {
        self.task.options.stable_time()
    }

    async fn current_size(&self, path: &Path) -> Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(path, e)),
        }
    }

    async fn sync_file(
        &self,
        path: &Path,
        rel: &str,
        size: u64,
        renamed_from: Option<&Path>,
    ) -> Result<Outcome> {
        let force = self.task.options.overwrite_existing;
        match self.classifier.classify(path, rel) {
            FileClass::Ignored => {
                debug!(path = %rel, "ignored file type");
                Ok(Outcome::Ignored)
            }
            FileClass::PointerSkip => {
                self.mirror_file(path, rel, size, force).await?;
                Ok(Outcome::Mirrored)
            }
            FileClass::Plain => {
                let outcome = self.push(path, rel, size, renamed_from).await?;
                self.mirror_file(path, rel, size, force).await?;
                Ok(outcome)
            }
            FileClass::Media => {
                let outcome = self.push(path, rel, size, renamed_from).await?;
                // Regenerated every time: a resolved link may change while bytes do not.
                self.refresh_pointer(rel, true).await?;
                Ok(outcome)
            }
        }
    }

    /// A created directory gets its remote counterpart (renamed in place
    /// when it was moved), then its contents are synced: a moved or copied
    /// tree does not report its children individually.
    async fn sync_dir(&self, path: &Path, rel: &str, renamed_from: Option<&Path>) -> Result<Outcome> {
        if self.classifier.is_excluded(rel) {
            return Ok(Outcome::Ignored);
        }
        let remote_path = self.remote_path(rel);
        let renamed = match renamed_from {
            Some(old) => self.try_rename(old, &remote_path, None).await?,
            None => false,
        };
        let outcome = if renamed {
            let mirror = self.mirror_path(rel);
            tokio::fs::create_dir_all(&mirror)
                .await
                .map_err(|e| SyncError::io(&mirror, e))?;
            Outcome::Renamed
        } else {
            self.ensure_dir(rel, None).await?
        };
        self.sync_children(path).await?;
        Ok(outcome)
    }

    /// Sync everything below `path`, settling each entry on its own.
    async fn sync_children(&self, path: &Path) -> Result<()> {
        let root = path.to_path_buf();
        let source_root = self.task.source_root.clone();
        let walked = tokio::task::spawn_blocking(move || {
            let mut children = Vec::new();
            for item in WalkDir::new(&root).min_depth(1) {
                let entry = match item {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "walk error, entry skipped");
                        continue;
                    }
                };
                let Some(rel) = relative_posix(&source_root, entry.path()) else {
                    continue;
                };
                match entry.metadata() {
                    Ok(meta) => children.push((entry.into_path(), rel, meta.is_dir(), meta.len())),
                    Err(e) => warn!(path = %rel, error = %e, "unreadable, skipped"),
                }
            }
            children
        })
        .await;
        let children = match walked {
            Ok(children) => children,
            Err(e) => {
                error!(path = %path.display(), error = %e, "directory walk aborted");
                Vec::new()
            }
        };

        // One settling pause for the whole tree rather than one per file.
        let stable = self.stable_time();
        let mut grown: HashSet<PathBuf> = HashSet::new();
        if !stable.is_zero() && children.iter().any(|c| !c.2) {
            tokio::time::sleep(stable).await;
            for (child, _, is_dir, size) in &children {
                if !*is_dir && self.current_size(child).await? != Some(*size) {
                    grown.insert(child.clone());
                }
            }
        }

        let limit = self.task.options.max_concurrency.max(1);
        let grown = &grown;
        stream::iter(children)
            .for_each_concurrent(limit, |(child, child_rel, is_dir, size)| async move {
                let result = if grown.contains(&child) {
                    Ok(Outcome::Unsettled)
                } else if !is_dir {
                    self.sync_file(&child, &child_rel, size, None).await
                } else if self.classifier.is_excluded(&child_rel) {
                    Ok(Outcome::Ignored)
                } else {
                    self.ensure_dir(&child_rel, None).await
                };
                self.settle(&child_rel, result);
            })
            .await;
        Ok(())
    }

    /// Upload unless the remote copy already has the same size and
    /// overwriting is off. Tries a rename first for the second half of a move.
    async fn push(
        &self,
        path: &Path,
        rel: &str,
        size: u64,
        renamed_from: Option<&Path>,
    ) -> Result<Outcome> {
        let remote_path = self.remote_path(rel);
        if let Some(old) = renamed_from {
            if self.try_rename(old, &remote_path, Some(size)).await? {
                return Ok(Outcome::Renamed);
            }
        }
        if !self.task.options.overwrite_existing {
            if let Some(entry) = self.remote.stat(&remote_path).await? {
                if !entry.is_dir && entry.size == size {
                    debug!(path = %rel, "remote copy up to date");
                    return Ok(Outcome::Skipped);
                }
            }
        }
        self.remote.upload(&remote_path, path).await?;
        info!(path = %rel, remote = %remote_path, size, "uploaded");
        Ok(Outcome::Uploaded)
    }

    /// Rename the remote entry of a moved file (`size` set) or directory in
    /// place. Only when cleanup is on, the old local path is really gone, the
    /// old remote entry matches and the new one does not exist yet.
    async fn try_rename(&self, old: &Path, remote_path: &str, size: Option<u64>) -> Result<bool> {
        if !self.task.options.enable_cleanup {
            return Ok(false);
        }
        let Some(old_rel) = relative_posix(&self.task.source_root, old) else {
            return Ok(false);
        };
        if tokio::fs::symlink_metadata(old).await.is_ok() {
            return Ok(false);
        }
        let old_remote = self.remote_path(&old_rel);
        let (old_entry, new_entry) = tokio::join!(
            self.remote.stat(&old_remote),
            self.remote.stat(remote_path)
        );
        match (old_entry?, new_entry?) {
            (Some(entry), None) if matches_kind(&entry, size) => {}
            _ => return Ok(false),
        }
        match self.remote.rename(&old_remote, remote_path).await {
            Ok(()) => {
                info!(from = %old_remote, to = %remote_path, "renamed");
                Ok(true)
            }
            Err(e) => {
                warn!(from = %old_remote, to = %remote_path, error = %e, "rename failed, uploading instead");
                Ok(false)
            }
        }
    }

    async fn refresh_pointer(&self, rel: &str, force: bool) -> Result<()> {
        if !force && self.pointers.pointer_exists(rel).await {
            return Ok(());
        }
        let content = self
            .pointers
            .make_pointer(rel, &self.remote_path(rel), self.remote.as_ref())
            .await?;
        if self.pointers.write_pointer(rel, &content).await? {
            self.stats.pointers_written.fetch_add(1, Ordering::Relaxed);
            info!(path = %rel, pointer = %self.pointers.pointer_path(rel).display(), "pointer written");
        }
        Ok(())
    }

    /// Copy a file into the target root unless an equally sized copy exists.
    async fn mirror_file(&self, path: &Path, rel: &str, size: u64, force: bool) -> Result<bool> {
        let dst = self.mirror_path(rel);
        if !force {
            if let Ok(meta) = tokio::fs::metadata(&dst).await {
                if meta.len() == size {
                    return Ok(false);
                }
            }
        }
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::io(parent, e))?;
        }
        tokio::fs::copy(path, &dst)
            .await
            .map_err(|e| SyncError::io(&dst, e))?;
        self.stats.mirrored.fetch_add(1, Ordering::Relaxed);
        debug!(path = %rel, "mirrored into target root");
        Ok(true)
    }

    async fn ensure_dir(&self, rel: &str, known: Option<Option<RemoteEntry>>) -> Result<Outcome> {
        let mirror = self.mirror_path(rel);
        tokio::fs::create_dir_all(&mirror)
            .await
            .map_err(|e| SyncError::io(&mirror, e))?;
        let remote_path = self.remote_path(rel);
        let existing = match known {
            Some(entry) => entry,
            None => self.remote.stat(&remote_path).await?,
        };
        if existing.map(|e| e.is_dir).unwrap_or(false) {
            return Ok(Outcome::Skipped);
        }
        self.remote.mkdir(&remote_path).await?;
        info!(remote = %remote_path, "directory created");
        Ok(Outcome::DirCreated)
    }

    /// Deleted policy: drop the pointer of media, then, with cleanup on,
    /// the remote entry and the mirrored copy.
    async fn remove_absent(&self, rel: &str) -> Result<Outcome> {
        let path = self.task.source_root.join(rel);
        let class = self.classifier.classify(&path, rel);
        if class == FileClass::Ignored {
            return Ok(Outcome::Ignored);
        }
        if class == FileClass::Media {
            if self.pointer_shared(&path).await {
                debug!(path = %rel, "pointer kept, a sibling media file shares it");
            } else if self.pointers.remove_pointer(rel).await? {
                info!(path = %rel, "pointer removed");
            }
        }
        if !self.task.options.enable_cleanup {
            debug!(path = %rel, "cleanup disabled, remote copy kept");
            return Ok(Outcome::Skipped);
        }
        let remote_path = self.remote_path(rel);
        let outcome = match self.remote.delete(&remote_path).await {
            Ok(()) => {
                info!(remote = %remote_path, "deleted");
                Outcome::Deleted
            }
            Err(e) if e.is_not_found() => {
                debug!(remote = %remote_path, "already absent remotely");
                Outcome::Skipped
            }
            Err(e) => return Err(e.into()),
        };
        self.remove_mirror(rel).await?;
        Ok(outcome)
    }

    /// `a.mkv` and `a.mp4` in one directory map to the same `a.strm`.
    async fn pointer_shared(&self, path: &Path) -> bool {
        let (Some(dir), Some(stem)) = (path.parent(), path.file_stem()) else {
            return false;
        };
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return false;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let sibling = entry.path();
            if sibling == path || sibling.file_stem() != Some(stem) {
                continue;
            }
            if let Some(rel) = relative_posix(&self.task.source_root, &sibling) {
                if self.classifier.classify(&sibling, &rel) == FileClass::Media {
                    return true;
                }
            }
        }
        false
    }

    async fn remove_mirror(&self, rel: &str) -> Result<()> {
        let mirror = self.mirror_path(rel);
        match tokio::fs::symlink_metadata(&mirror).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&mirror)
                .await
                .map_err(|e| SyncError::io(&mirror, e)),
            Ok(_) => remove_file_if_exists(&mirror).await.map(|_| ()),
            Err(_) => Ok(()),
        }
    }

    /// Compare the whole source tree with the remote tree and repair drift.
    pub async fn full_sweep(&self) -> Result<SweepReport> {
        let (local, remote) = tokio::join!(self.walk_local(), self.list_remote_tree());
        let local = local?;
        let mut report = SweepReport {
            local_entries: local.entries.len(),
            remote_entries: remote.entries.len(),
            unknown_subtrees: remote.unknown.clone(),
            ..SweepReport::default()
        };
        report.unknown_subtrees.extend(local.unreadable.iter().cloned());

        // Directories holding any other local entry are created by uploads.
        let mut parents: HashSet<&str> = HashSet::new();
        for entry in &local.entries {
            let mut rel = entry.rel.as_str();
            while let Some((parent, _)) = rel.rsplit_once('/') {
                if !parents.insert(parent) {
                    break;
                }
                rel = parent;
            }
        }

        let lookup = |rel: &str| {
            if remote.is_unknown(rel) {
                Lookup::Unknown
            } else {
                Lookup::Known(remote.entries.get(rel).cloned())
            }
        };
        let present: Vec<(LocalEntry, Lookup)> = local
            .entries
            .iter()
            .filter(|e| !(e.is_dir && parents.contains(e.rel.as_str())))
            .map(|e| (e.clone(), lookup(&e.rel)))
            .collect();

        let orphans = if self.task.options.enable_cleanup {
            self.orphans(&local, &remote)
        } else {
            Vec::new()
        };

        let limit = self.task.options.max_concurrency.max(1);
        let mut outcomes: Vec<Outcome> = stream::iter(present)
            .map(|(entry, lookup)| async move {
                let rel = entry.rel.clone();
                let result = self.sweep_present(entry, lookup).await;
                self.settle(&rel, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        let mut removed: Vec<Outcome> = stream::iter(orphans)
            .map(|rel| async move {
                let result = self.remove_absent(&rel).await;
                self.settle(&rel, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        outcomes.append(&mut removed);

        for outcome in outcomes {
            match outcome {
                Outcome::Uploaded | Outcome::Renamed => report.uploaded += 1,
                Outcome::Deleted => report.deleted += 1,
                Outcome::DirCreated => report.dirs_created += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped | Outcome::Mirrored | Outcome::Ignored | Outcome::Unsettled => {
                    report.skipped += 1
                }
            }
        }
        info!(
            local = report.local_entries,
            remote = report.remote_entries,
            uploaded = report.uploaded,
            deleted = report.deleted,
            dirs = report.dirs_created,
            failed = report.failed,
            "full sweep finished"
        );
        Ok(report)
    }

    async fn sweep_present(&self, entry: LocalEntry, lookup: Lookup) -> Result<Outcome> {
        let rel = entry.rel.as_str();
        if entry.is_dir {
            if self.classifier.is_excluded(rel) {
                return Ok(Outcome::Ignored);
            }
            return match lookup {
                Lookup::Known(known) => self.ensure_dir(rel, Some(known)).await,
                Lookup::Unknown => self.ensure_dir(rel, None).await,
            };
        }
        let class = self.classifier.classify(&entry.path, rel);
        match class {
            FileClass::Ignored => return Ok(Outcome::Ignored),
            FileClass::PointerSkip => {
                let copied = self.mirror_file(&entry.path, rel, entry.size, false).await?;
                return Ok(if copied { Outcome::Mirrored } else { Outcome::Skipped });
            }
            FileClass::Plain | FileClass::Media => {}
        }
        let current = match lookup {
            Lookup::Known(known) => known,
            Lookup::Unknown => self.remote.stat(&self.remote_path(rel)).await?,
        };
        let stale = match &current {
            None => true,
            Some(remote) => self.is_stale(remote, &entry),
        };
        let outcome = if stale {
            let remote_path = self.remote_path(rel);
            self.remote.upload(&remote_path, &entry.path).await?;
            info!(path = %rel, remote = %remote_path, size = entry.size, "uploaded");
            Outcome::Uploaded
        } else {
            Outcome::Skipped
        };
        match class {
            FileClass::Media => self.refresh_pointer(rel, stale).await?,
            _ => {
                self.mirror_file(&entry.path, rel, entry.size, false).await?;
            }
        }
        Ok(outcome)
    }

    fn is_stale(&self, remote: &RemoteEntry, local: &LocalEntry) -> bool {
        if remote.is_dir || remote.size != local.size {
            return true;
        }
        if !self.task.options.overwrite_existing {
            return false;
        }
        match (local.modified, remote.modified) {
            (Some(l), Some(r)) => l > r,
            _ => false,
        }
    }

    /// Remote paths with no local counterpart, top-most only, skipping
    /// anything below a subtree that could not be listed or walked.
    fn orphans(&self, local: &LocalTree, remote: &RemoteTree) -> Vec<String> {
        let local_set: HashSet<&str> = local.entries.iter().map(|e| e.rel.as_str()).collect();
        let mut candidates: Vec<&String> = remote
            .entries
            .keys()
            .filter(|rel| !local_set.contains(rel.as_str()))
            .filter(|rel| !remote.is_unknown(rel))
            .filter(|rel| !local.unreadable.iter().any(|u| is_within(rel, u)))
            .collect();
        candidates.sort_by_key(|rel| rel.matches('/').count());
        let mut chosen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for rel in candidates {
            let covered = rel
                .match_indices('/')
                .any(|(idx, _)| chosen.contains(&rel[..idx]));
            if !covered {
                chosen.insert(rel.clone());
                out.push(rel.clone());
            }
        }
        out
    }

    async fn walk_local(&self) -> Result<LocalTree> {
        let root = self.task.source_root.clone();
        let handle = tokio::task::spawn_blocking(move || -> Result<LocalTree> {
            std::fs::metadata(&root).map_err(|e| SyncError::io(&root, e))?;
            let mut tree = LocalTree::default();
            for item in WalkDir::new(&root).min_depth(1) {
                match item {
                    Ok(entry) => {
                        let Some(rel) = relative_posix(&root, entry.path()) else {
                            continue;
                        };
                        let meta = match entry.metadata() {
                            Ok(meta) => meta,
                            Err(e) => {
                                warn!(path = %rel, error = %e, "unreadable, excluded from cleanup");
                                tree.unreadable.push(rel);
                                continue;
                            }
                        };
                        tree.entries.push(LocalEntry {
                            path: entry.into_path(),
                            rel,
                            is_dir: meta.is_dir(),
                            size: if meta.is_dir() { 0 } else { meta.len() },
                            modified: meta.modified().ok(),
                        });
                    }
                    Err(e) => {
                        let rel = e
                            .path()
                            .and_then(|p| relative_posix(&root, p))
                            .unwrap_or_default();
                        warn!(path = %rel, error = %e, "walk error, excluded from cleanup");
                        tree.unreadable.push(rel);
                    }
                }
            }
            Ok(tree)
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(SyncError::io(
                &self.task.source_root,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )),
        }
    }

    /// List the remote tree level by level. A failed listing marks its
    /// subtree unknown instead of empty.
    async fn list_remote_tree(&self) -> RemoteTree {
        let limit = self.task.options.max_concurrency.max(1);
        let root = self.task.remote_root.clone();
        let mut tree = RemoteTree::default();
        let mut level: Vec<(String, String)> = vec![(root.clone(), String::new())];
        while !level.is_empty() {
            let results: Vec<_> = stream::iter(level)
                .map(|(dir, rel)| async move {
                    let listed = self.remote.list(&dir).await;
                    (dir, rel, listed)
                })
                .buffer_unordered(limit)
                .collect()
                .await;
            let mut next = Vec::new();
            for (dir, rel, listed) in results {
                match listed {
                    Ok(entries) => {
                        for entry in entries {
                            let child_rel = if rel.is_empty() {
                                entry.name.clone()
                            } else {
                                format!("{rel}/{}", entry.name)
                            };
                            if entry.is_dir {
                                next.push((join_remote(&dir, &entry.name), child_rel.clone()));
                            }
                            tree.entries.insert(child_rel, entry);
                        }
                    }
                    Err(e) if e.is_not_found() && dir == root => {
                        debug!(remote = %dir, "remote root does not exist yet");
                    }
                    Err(e) => {
                        warn!(remote = %dir, error = %e, "listing failed, subtree treated as unknown");
                        tree.unknown.push(rel);
                    }
                }
            }
            level = next;
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncOptions;
    use crate::debounce::IntentKind;
    use crate::remote::memory::{Call, MemoryRemote};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;

    struct Fixture {
        _dir: TempDir,
        src: PathBuf,
        dst: PathBuf,
        remote: Arc<MemoryRemote>,
        reconciler: Reconciler,
        stats: Arc<TaskStats>,
    }

    fn fixture(options: SyncOptions) -> Fixture {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("strm");
        std::fs::create_dir_all(&src).unwrap();
        let task = SyncTask::new("test", &src, &dst, "/remote", "/media", options).unwrap();
        let src = task.source_root.clone();
        let remote = Arc::new(MemoryRemote::new());
        let stats = Arc::new(TaskStats::default());
        let reconciler =
            Reconciler::new(Arc::new(task), remote.clone(), Arc::clone(&stats)).unwrap();
        Fixture {
            _dir: dir,
            src,
            dst,
            remote,
            reconciler,
            stats,
        }
    }

    fn options() -> SyncOptions {
        SyncOptions {
            base_url: "http://x".into(),
            media_file_types: vec!["*.mkv".into(), "*.mp4".into()],
            file_stable_time: 0.0,
            ..SyncOptions::default()
        }
    }

    fn intent(path: PathBuf, kind: IntentKind) -> PendingIntent {
        let now = Instant::now();
        PendingIntent {
            path,
            kind,
            renamed_from: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn uploads(remote: &MemoryRemote) -> usize {
        remote
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Upload(_)))
            .count()
    }

    #[tokio::test]
    async fn plain_file_uploads_once_when_unchanged() {
        let f = fixture(options());
        let file = f.src.join("notes/info.nfo");
        write(&file, "hello");

        let first = f.reconciler.apply(intent(file.clone(), IntentKind::Created)).await;
        let second = f.reconciler.apply(intent(file.clone(), IntentKind::Modified)).await;

        assert_eq!(first, Outcome::Uploaded);
        assert_eq!(second, Outcome::Skipped);
        assert_eq!(uploads(&f.remote), 1);
        assert_eq!(f.remote.size_of("/remote/notes/info.nfo"), Some(5));
        assert_eq!(
            std::fs::read_to_string(f.dst.join("notes/info.nfo")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn overwrite_existing_always_uploads() {
        let f = fixture(SyncOptions {
            overwrite_existing: true,
            ..options()
        });
        let file = f.src.join("a.nfo");
        write(&file, "x");
        f.reconciler.apply(intent(file.clone(), IntentKind::Created)).await;
        f.reconciler.apply(intent(file, IntentKind::Modified)).await;
        assert_eq!(uploads(&f.remote), 2);
    }

    #[tokio::test]
    async fn media_uploads_and_writes_pointer() {
        let f = fixture(options());
        let file = f.src.join("Heat (1995)/Heat 1995.mkv");
        write(&file, "video");

        let outcome = f.reconciler.apply(intent(file, IntentKind::Created)).await;

        assert_eq!(outcome, Outcome::Uploaded);
        assert!(f.remote.exists("/remote/Heat (1995)/Heat 1995.mkv"));
        let pointer = f.dst.join("Heat (1995)/Heat 1995.strm");
        assert_eq!(
            std::fs::read_to_string(pointer).unwrap(),
            "http://x/media/Heat%20(1995)/Heat%201995.mkv"
        );
        // No plain mirror copy of media.
        assert!(!f.dst.join("Heat (1995)/Heat 1995.mkv").exists());
        assert_eq!(f.stats.snapshot().pointers_written, 1);
    }

    #[tokio::test]
    async fn direct_link_pointer_uses_resolved_url() {
        let f = fixture(SyncOptions {
            use_direct_link: true,
            ..options()
        });
        let file = f.src.join("a.mp4");
        write(&file, "v");
        f.reconciler.apply(intent(file, IntentKind::Created)).await;
        assert_eq!(
            std::fs::read_to_string(f.dst.join("a.strm")).unwrap(),
            "https://cdn.example/remote/a.mp4?sign=abc"
        );
        assert!(f.remote.calls().contains(&Call::Resolve("/remote/a.mp4".into())));
    }

    #[tokio::test]
    async fn ignored_files_cause_no_remote_calls() {
        let f = fixture(options());
        let file = f.src.join("movie.mp");
        write(&file, "partial");
        let outcome = f.reconciler.apply(intent(file.clone(), IntentKind::Created)).await;
        assert_eq!(outcome, Outcome::Ignored);
        let outcome = f.reconciler.apply(intent(file, IntentKind::Deleted)).await;
        assert_eq!(outcome, Outcome::Ignored);
        assert!(f.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_without_cleanup_only_removes_pointer() {
        let f = fixture(options());
        let file = f.src.join("movie.mkv");
        write(&file, "v");
        f.reconciler.apply(intent(file.clone(), IntentKind::Created)).await;
        assert!(f.dst.join("movie.strm").exists());
        f.remote.clear_calls();

        std::fs::remove_file(&file).unwrap();
        let outcome = f.reconciler.apply(intent(file, IntentKind::Deleted)).await;

        assert_eq!(outcome, Outcome::Skipped);
        assert!(f.remote.calls().iter().all(|c| !matches!(c, Call::Delete(_))));
        assert!(f.remote.exists("/remote/movie.mkv"));
        assert!(!f.dst.join("movie.strm").exists());
    }

    #[tokio::test]
    async fn delete_with_cleanup_removes_remote_and_mirror() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        let file = f.src.join("sub/a.srt");
        write(&file, "1");
        f.reconciler.apply(intent(file.clone(), IntentKind::Created)).await;
        std::fs::remove_file(&file).unwrap();

        let outcome = f.reconciler.apply(intent(file.clone(), IntentKind::Deleted)).await;
        assert_eq!(outcome, Outcome::Deleted);
        assert!(!f.remote.exists("/remote/sub/a.srt"));
        assert!(!f.dst.join("sub/a.srt").exists());

        // Deleting again is already satisfied.
        let again = f.reconciler.apply(intent(file, IntentKind::Deleted)).await;
        assert_eq!(again, Outcome::Skipped);
    }

    #[tokio::test]
    async fn vanished_file_is_treated_as_deleted() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        f.remote.put_file("/remote/gone.nfo", 3);
        let outcome = f
            .reconciler
            .apply(intent(f.src.join("gone.nfo"), IntentKind::Modified))
            .await;
        assert_eq!(outcome, Outcome::Deleted);
    }

    #[tokio::test]
    async fn move_becomes_rename_when_cleanup_is_on() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        let old = f.src.join("old.mkv");
        let new = f.src.join("new.mkv");
        write(&old, "video");
        f.reconciler.apply(intent(old.clone(), IntentKind::Created)).await;
        std::fs::rename(&old, &new).unwrap();
        f.remote.clear_calls();

        let mut create = intent(new, IntentKind::Created);
        create.renamed_from = Some(old.clone());
        let outcomes = f
            .reconciler
            .apply_batch(vec![intent(old, IntentKind::Deleted), create])
            .await;

        assert!(outcomes.contains(&Outcome::Renamed));
        assert_eq!(uploads(&f.remote), 0);
        assert!(f.remote.exists("/remote/new.mkv"));
        assert!(!f.remote.exists("/remote/old.mkv"));
        assert!(f.dst.join("new.strm").exists());
        assert!(!f.dst.join("old.strm").exists());
    }

    #[tokio::test]
    async fn move_without_cleanup_uploads_new_path() {
        let f = fixture(options());
        let old = f.src.join("old.nfo");
        let new = f.src.join("new.nfo");
        write(&new, "abc");
        f.remote.put_file("/remote/old.nfo", 3);

        let mut create = intent(new, IntentKind::Created);
        create.renamed_from = Some(old);
        let outcome = f.reconciler.apply(create).await;

        assert_eq!(outcome, Outcome::Uploaded);
        assert!(f.remote.exists("/remote/old.nfo"));
    }

    #[tokio::test]
    async fn upload_failure_does_not_stop_siblings() {
        let f = fixture(options());
        let bad = f.src.join("bad.nfo");
        let good = f.src.join("good.nfo");
        write(&bad, "1");
        write(&good, "2");
        f.remote.fail_upload("/remote/bad.nfo");

        let outcomes = f
            .reconciler
            .apply_batch(vec![
                intent(bad, IntentKind::Created),
                intent(good, IntentKind::Created),
            ])
            .await;

        assert!(outcomes.contains(&Outcome::Failed));
        assert!(outcomes.contains(&Outcome::Uploaded));
        assert!(f.remote.exists("/remote/good.nfo"));
        assert_eq!(f.stats.snapshot().failed, 1);
    }

    #[tokio::test]
    async fn created_directory_is_mirrored_remotely() {
        let f = fixture(options());
        let dir = f.src.join("Season 1");
        std::fs::create_dir_all(&dir).unwrap();
        let outcome = f.reconciler.apply(intent(dir.clone(), IntentKind::Created)).await;
        assert_eq!(outcome, Outcome::DirCreated);
        assert!(f.remote.exists("/remote/Season 1"));
        assert!(f.dst.join("Season 1").is_dir());
        let again = f.reconciler.apply(intent(dir, IntentKind::Created)).await;
        assert_eq!(again, Outcome::Skipped);
    }

    #[tokio::test]
    async fn directory_moved_in_syncs_its_contents() {
        let f = fixture(options());
        let dir = f.src.join("Heat");
        write(&dir.join("Heat.mkv"), "video");
        write(&dir.join("extras/Heat.nfo"), "nfo");

        let outcome = f.reconciler.apply(intent(dir, IntentKind::Created)).await;

        assert_eq!(outcome, Outcome::DirCreated);
        assert!(f.remote.exists("/remote/Heat/Heat.mkv"));
        assert!(f.remote.exists("/remote/Heat/extras/Heat.nfo"));
        assert!(f.dst.join("Heat/Heat.strm").exists());
        assert!(f.dst.join("Heat/extras/Heat.nfo").exists());
    }

    #[tokio::test]
    async fn moved_directory_is_renamed_remotely() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        let old = f.src.join("A");
        let new = f.src.join("B");
        write(&old.join("a.mkv"), "video");
        f.reconciler.apply(intent(old.clone(), IntentKind::Created)).await;
        assert!(f.dst.join("A/a.strm").exists());
        std::fs::rename(&old, &new).unwrap();
        f.remote.clear_calls();

        let mut create = intent(new, IntentKind::Created);
        create.renamed_from = Some(old.clone());
        let outcomes = f
            .reconciler
            .apply_batch(vec![create, intent(old, IntentKind::Deleted)])
            .await;

        assert!(outcomes.contains(&Outcome::Renamed));
        assert_eq!(uploads(&f.remote), 0);
        assert!(f.remote.exists("/remote/B/a.mkv"));
        assert!(!f.remote.exists("/remote/A"));
        assert!(f.dst.join("B/a.strm").exists());
        assert!(!f.dst.join("A").exists());
    }

    #[tokio::test]
    async fn directory_metadata_change_does_not_resync_children() {
        let f = fixture(SyncOptions {
            overwrite_existing: true,
            ..options()
        });
        for ep in 1..=5 {
            write(&f.src.join(format!("Show/S01/E0{ep}.mkv")), "video");
        }
        f.reconciler.full_sweep().await.unwrap();
        f.remote.clear_calls();

        let outcome = f
            .reconciler
            .apply(intent(f.src.join("Show"), IntentKind::Modified))
            .await;

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(uploads(&f.remote), 0);
        assert!(f.remote.mutations().is_empty());
        assert_eq!(f.remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn modified_directory_unknown_remotely_is_walked() {
        let f = fixture(options());
        write(&f.src.join("New/a.nfo"), "nfo");

        let outcome = f
            .reconciler
            .apply(intent(f.src.join("New"), IntentKind::Modified))
            .await;

        assert_eq!(outcome, Outcome::DirCreated);
        assert!(f.remote.exists("/remote/New/a.nfo"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn broken_entry_does_not_stop_directory_walk() {
        let f = fixture(options());
        write(&f.src.join("Dir/a.nfo"), "nfo");
        write(&f.src.join("Dir/Sub/b.nfo"), "nfo");
        std::os::unix::fs::symlink(f.src.join("missing"), f.src.join("Dir/broken.nfo")).unwrap();

        let outcome = f
            .reconciler
            .apply(intent(f.src.join("Dir"), IntentKind::Created))
            .await;

        assert_eq!(outcome, Outcome::DirCreated);
        assert!(f.remote.exists("/remote/Dir/a.nfo"));
        assert!(f.remote.exists("/remote/Dir/Sub/b.nfo"));
        assert!(!f.remote.exists("/remote/Dir/broken.nfo"));
    }

    #[tokio::test]
    async fn files_under_created_directory_sync_once_per_batch() {
        let f = fixture(SyncOptions {
            overwrite_existing: true,
            ..options()
        });
        let dir = f.src.join("Extras");
        write(&dir.join("a.nfo"), "nfo");

        f.reconciler
            .apply_batch(vec![
                intent(dir.clone(), IntentKind::Created),
                intent(dir.join("a.nfo"), IntentKind::Modified),
            ])
            .await;

        assert_eq!(uploads(&f.remote), 1);
        assert!(f.remote.exists("/remote/Extras/a.nfo"));
    }

    #[tokio::test]
    async fn shared_pointer_survives_sibling_delete() {
        let f = fixture(options());
        let mkv = f.src.join("a.mkv");
        let mp4 = f.src.join("a.mp4");
        write(&mkv, "mkv");
        write(&mp4, "mp4");
        f.reconciler.apply(intent(mkv.clone(), IntentKind::Created)).await;
        assert!(f.dst.join("a.strm").exists());

        std::fs::remove_file(&mp4).unwrap();
        f.reconciler.apply(intent(mp4, IntentKind::Deleted)).await;
        assert!(f.dst.join("a.strm").exists());

        std::fs::remove_file(&mkv).unwrap();
        f.reconciler.apply(intent(mkv, IntentKind::Deleted)).await;
        assert!(!f.dst.join("a.strm").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn growing_file_is_deferred_and_queued_again() {
        let f = fixture(SyncOptions {
            file_stable_time: 1.0,
            ..options()
        });
        let debouncer = Arc::new(Debouncer::new(Duration::from_secs(30)));
        let reconciler = f.reconciler.with_requeue(Arc::clone(&debouncer));
        let file = f.src.join("a.mkv");
        write(&file, "part");
        let writer = {
            let file = file.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                let mut out = std::fs::OpenOptions::new().append(true).open(&file).unwrap();
                std::io::Write::write_all(&mut out, b"-rest").unwrap();
            })
        };

        let first = reconciler.apply(intent(file.clone(), IntentKind::Created)).await;
        writer.await.unwrap();

        assert_eq!(first, Outcome::Unsettled);
        assert_eq!(uploads(&f.remote), 0);
        assert_eq!(debouncer.len(), 1);
        assert_eq!(f.stats.snapshot().deferred, 1);

        let second = reconciler.apply(intent(file, IntentKind::Modified)).await;
        assert_eq!(second, Outcome::Uploaded);
        assert_eq!(f.remote.size_of("/remote/a.mkv"), Some(9));
    }

    #[tokio::test]
    async fn full_sweep_reaches_a_fixed_point() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        write(&f.src.join("Movies/a.mkv"), "aaaa");
        write(&f.src.join("Movies/a.srt"), "sub");
        write(&f.src.join("Shows/S01/e1.mp4"), "e1");
        write(&f.src.join("skip.mp"), "tmp");
        std::fs::create_dir_all(f.src.join("Empty")).unwrap();

        let first = f.reconciler.full_sweep().await.unwrap();
        assert_eq!(first.uploaded, 3);
        assert_eq!(first.dirs_created, 1);
        assert_eq!(first.failed, 0);
        assert!(f.dst.join("Movies/a.strm").exists());
        assert!(f.dst.join("Shows/S01/e1.strm").exists());
        assert!(f.dst.join("Movies/a.srt").exists());
        assert!(!f.remote.exists("/remote/skip.mp"));

        f.remote.clear_calls();
        let second = f.reconciler.full_sweep().await.unwrap();
        assert!(f.remote.mutations().is_empty(), "{:?}", f.remote.mutations());
        assert_eq!(second.uploaded, 0);
        assert_eq!(second.deleted, 0);
    }

    #[tokio::test]
    async fn full_sweep_replaces_stale_remote_copy() {
        let f = fixture(options());
        write(&f.src.join("a.nfo"), "new content");
        f.remote.put_file("/remote/a.nfo", 2);
        let report = f.reconciler.full_sweep().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(f.remote.size_of("/remote/a.nfo"), Some(11));
    }

    #[tokio::test]
    async fn full_sweep_deletes_orphans_with_cleanup() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        write(&f.src.join("keep.mkv"), "k");
        f.remote.put_file("/remote/keep.mkv", 1);
        f.remote.put_file("/remote/orphan.mkv", 9);

        let report = f.reconciler.full_sweep().await.unwrap();

        assert_eq!(report.deleted, 1);
        let deletes: Vec<_> = f
            .remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .collect();
        assert_eq!(deletes, vec![Call::Delete("/remote/orphan.mkv".into())]);
        assert!(f.remote.exists("/remote/keep.mkv"));
    }

    #[tokio::test]
    async fn full_sweep_keeps_orphans_without_cleanup() {
        let f = fixture(options());
        f.remote.put_file("/remote/orphan.mkv", 9);
        let report = f.reconciler.full_sweep().await.unwrap();
        assert_eq!(report.deleted, 0);
        assert!(f.remote.exists("/remote/orphan.mkv"));
    }

    #[tokio::test]
    async fn orphan_directory_is_deleted_once() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        f.remote.put_file("/remote/Old/a.mkv", 1);
        f.remote.put_file("/remote/Old/b.mkv", 1);
        f.reconciler.full_sweep().await.unwrap();
        let deletes: Vec<_> = f
            .remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Delete(_)))
            .collect();
        assert_eq!(deletes, vec![Call::Delete("/remote/Old".into())]);
    }

    #[tokio::test]
    async fn failed_sub_listing_blocks_cleanup_below_it() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        f.remote.put_file("/remote/Shows/orphan.mkv", 1);
        f.remote.put_file("/remote/stray.nfo", 1);
        f.remote.fail_list("/remote/Shows");

        let report = f.reconciler.full_sweep().await.unwrap();

        assert_eq!(report.unknown_subtrees, vec!["Shows".to_string()]);
        assert!(f.remote.exists("/remote/Shows/orphan.mkv"));
        assert!(!f.remote.exists("/remote/stray.nfo"));
    }

    #[tokio::test]
    async fn failed_root_listing_deletes_nothing() {
        let f = fixture(SyncOptions {
            enable_cleanup: true,
            ..options()
        });
        write(&f.src.join("a.nfo"), "1");
        f.remote.put_file("/remote/orphan.nfo", 1);
        f.remote.fail_list("/remote");

        let report = f.reconciler.full_sweep().await.unwrap();

        assert!(f.remote.exists("/remote/orphan.nfo"));
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn sweep_writes_missing_pointer_for_synced_media() {
        let f = fixture(options());
        write(&f.src.join("a.mkv"), "abc");
        f.remote.put_file("/remote/a.mkv", 3);
        let report = f.reconciler.full_sweep().await.unwrap();
        assert_eq!(report.uploaded, 0);
        assert_eq!(
            std::fs::read_to_string(f.dst.join("a.strm")).unwrap(),
            "http://x/media/a.mkv"
        );
    }
}
