use crate::{
    config::SyncTask,
    error::{Result, SyncError},
    remote::RemoteStore,
    task::{spawn_task, SyncTaskHandle, TaskState},
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Owns one running task per sync pair, keyed by task name.
#[derive(Default)]
pub struct SyncManager {
    tasks: HashMap<String, SyncTaskHandle>,
}

impl SyncManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn start(&mut self, task: SyncTask, remote: Arc<dyn RemoteStore>) -> Result<()> {
        let name = task.name.clone();
        if self.tasks.contains_key(&name) {
            return Err(SyncError::ConfigInvalid(format!("task {name} is already running")));
        }
        let id = task.id;
        let handle = spawn_task(task, remote)?;
        info!(task = %name, %id, "task started");
        self.tasks.insert(name, handle);
        Ok(())
    }

    /// Start every task against the shared remote. A task that cannot start
    /// is logged and skipped; returns how many started.
    pub fn start_all(&mut self, tasks: Vec<SyncTask>, remote: Arc<dyn RemoteStore>) -> usize {
        let mut started = 0;
        for task in tasks {
            let name = task.name.clone();
            match self.start(task, Arc::clone(&remote)) {
                Ok(()) => started += 1,
                Err(e) => error!(task = %name, error = %e, "task failed to start"),
            }
        }
        started
    }

    pub fn stop(&mut self, name: &str) {
        if let Some(h) = self.tasks.get(name) {
            h.stop();
        }
    }

    pub fn stop_all(&mut self) {
        for h in self.tasks.values() {
            h.stop();
        }
    }

    pub fn get(&self, name: &str) -> Option<&SyncTaskHandle> {
        self.tasks.get(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn states(&self) -> Vec<(String, TaskState)> {
        let mut out: Vec<_> = self
            .tasks
            .iter()
            .map(|(name, h)| (name.clone(), h.state().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Stop every task and wait for each runner to flush and exit. A
    /// panicked runner is logged and does not keep the others from stopping.
    pub async fn shutdown(mut self) {
        self.stop_all();
        for (name, handle) in self.tasks.drain() {
            let stats = handle.stats();
            let id = handle.config().id;
            match handle.join().await {
                Ok(()) => info!(
                    task = %name,
                    %id,
                    uploaded = stats.uploaded,
                    deleted = stats.deleted,
                    failed = stats.failed,
                    "task stopped"
                ),
                Err(e) if e.is_panic() => error!(task = %name, "task panicked"),
                Err(e) => warn!(task = %name, error = %e, "task was cancelled"),
            }
        }
    }
}
