use crate::{
    config::SyncTask,
    debounce::Debouncer,
    error::Result,
    event::from_notify,
    reconcile::{Reconciler, StatsSnapshot, TaskStats},
    remote::RemoteStore,
};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch::Ref;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Public handle returned to callers for controlling a running sync task.
#[derive(Debug)]
pub struct SyncTaskHandle {
    task: Arc<SyncTask>,
    ctrl_tx: mpsc::Sender<TaskCommand>,
    state_rx: watch::Receiver<TaskState>,
    stats: Arc<TaskStats>,
    debouncer: Arc<Debouncer>,
    join: JoinHandle<()>,
}

impl SyncTaskHandle {
    pub fn config(&self) -> &SyncTask {
        &self.task
    }

    pub fn stop(&self) {
        let _ = self.ctrl_tx.try_send(TaskCommand::Stop);
    }

    pub fn state(&self) -> Ref<'_, TaskState> {
        self.state_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskState> {
        self.state_rx.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Paths waiting out their debounce window.
    pub fn pending(&self) -> usize {
        self.debouncer.len()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the runner to exit. Call `stop` first.
    pub async fn join(self) -> std::result::Result<(), JoinError> {
        self.join.await
    }
}

#[derive(Debug, Clone)]
pub enum TaskCommand {
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    /// Startup full sweep in progress
    Sweeping,
    Running,
    Error(String),
}

struct TaskRunner {
    task: Arc<SyncTask>,
    reconciler: Reconciler,
    debouncer: Arc<Debouncer>,
    rescan: Arc<AtomicBool>,
}

/// Drain cadence: well inside the debounce window, bounded both ways.
fn drain_interval(delay: Duration) -> Duration {
    (delay / 4).clamp(Duration::from_millis(50), Duration::from_secs(1))
}

impl TaskRunner {
    #[instrument(name = "task", skip_all, fields(task = %self.task.name, id = %self.task.id))]
    async fn run(self, mut ctrl_rx: mpsc::Receiver<TaskCommand>, state_tx: watch::Sender<TaskState>) {
        let watcher = match self.spawn_watcher() {
            Ok(w) => w,
            Err(e) => {
                error!(source = %self.task.source_root.display(), error = %e, "cannot watch source root");
                let _ = state_tx.send(TaskState::Error(e.to_string()));
                return;
            }
        };
        info!(
            source = %self.task.source_root.display(),
            target = %self.task.target_root.display(),
            remote = %self.task.remote_root,
            "watching"
        );

        let mut stopped = false;
        if self.task.options.full_sync_on_startup {
            let _ = state_tx.send(TaskState::Sweeping);
            tokio::select! {
                cmd = ctrl_rx.recv() => {
                    match cmd {
                        Some(TaskCommand::Stop) | None => {
                            info!("stop requested during startup sweep");
                            stopped = true;
                        }
                    }
                }
                result = self.reconciler.full_sweep() => {
                    if let Err(e) = result {
                        error!(error = %e, "startup sweep failed");
                        drop(watcher);
                        self.debouncer.discard();
                        let _ = state_tx.send(TaskState::Error(e.to_string()));
                        return;
                    }
                }
            }
        }

        if !stopped {
            let _ = state_tx.send(TaskState::Running);
            let mut tick = tokio::time::interval(drain_interval(self.debouncer.delay()));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    cmd = ctrl_rx.recv() => {
                        match cmd {
                            Some(TaskCommand::Stop) | None => break,
                        }
                    }
                    _ = tick.tick() => self.drain().await,
                }
            }
        }

        self.shutdown(watcher).await;
        let _ = state_tx.send(TaskState::Idle);
    }

    async fn drain(&self) {
        if self.rescan.swap(false, Ordering::AcqRel) {
            warn!("watch dropped events, running a full sweep");
            if let Err(e) = self.reconciler.full_sweep().await {
                error!(error = %e, "rescan sweep failed");
            }
        }
        let due: Vec<_> = self.debouncer.poll().collect();
        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), pending = self.debouncer.len(), "draining settled intents");
        self.reconciler.apply_batch(due).await;
    }

    /// Close the watch, flush what has already settled, drop the rest.
    async fn shutdown(&self, watcher: RecommendedWatcher) {
        drop(watcher);
        let due: Vec<_> = self.debouncer.poll().collect();
        if !due.is_empty() {
            info!(count = due.len(), "flushing settled intents");
            self.reconciler.apply_batch(due).await;
        }
        let dropped = self.debouncer.discard();
        if dropped > 0 {
            info!(dropped, "discarded unsettled intents");
        }
        info!(stats = ?self.reconciler.stats(), "stopped");
    }

    fn spawn_watcher(&self) -> Result<RecommendedWatcher> {
        let root = self.task.source_root.clone();
        let name = self.task.name.clone();
        let debouncer = Arc::clone(&self.debouncer);
        let rescan = Arc::clone(&self.rescan);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if event.need_rescan() {
                        rescan.store(true, Ordering::Release);
                    }
                    for change in from_notify(event, &root) {
                        debouncer.observe(change);
                    }
                }
                Err(e) => warn!(task = %name, error = %e, "watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.task.source_root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }
}

/// Start the watch-to-reconcile pipeline for one task on the current runtime.
pub fn spawn_task(task: SyncTask, remote: Arc<dyn RemoteStore>) -> Result<SyncTaskHandle> {
    let task = Arc::new(task);
    let stats = Arc::new(TaskStats::default());
    let debouncer = Arc::new(Debouncer::new(task.options.debounce()));
    let reconciler = Reconciler::new(Arc::clone(&task), remote, Arc::clone(&stats))?
        .with_requeue(Arc::clone(&debouncer));
    let runner = TaskRunner {
        debouncer: Arc::clone(&debouncer),
        task: Arc::clone(&task),
        reconciler,
        rescan: Arc::new(AtomicBool::new(false)),
    };
    let (ctrl_tx, ctrl_rx) = mpsc::channel(4);
    let (state_tx, state_rx) = watch::channel(TaskState::Idle);
    let join = tokio::spawn(runner.run(ctrl_rx, state_tx));
    Ok(SyncTaskHandle {
        task,
        ctrl_tx,
        state_rx,
        stats,
        debouncer,
        join,
    })
}
