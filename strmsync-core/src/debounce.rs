//! Per-path event debouncing.
//!
//! Every path has at most one pending intent. A deadline index ordered by
//! (due time, sequence) lets a single drain loop pick up settled intents
//! without a timer per path.

use crate::event::{ChangeEvent, ChangeKind};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Created,
    Modified,
    Deleted,
}

impl IntentKind {
    pub fn is_delete(self) -> bool {
        self == IntentKind::Deleted
    }
}

/// The debounced unit of work for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIntent {
    pub path: PathBuf,
    pub kind: IntentKind,
    /// Old path when this intent is the creation half of a move
    pub renamed_from: Option<PathBuf>,
    pub enqueued_at: Instant,
    pub updated_at: Instant,
}

type Key = (Instant, u64);

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<PathBuf, (PendingIntent, Key)>,
    schedule: BTreeMap<Key, PathBuf>,
    seq: u64,
}

impl Inner {
    fn upsert(
        &mut self,
        path: PathBuf,
        kind: IntentKind,
        renamed_from: Option<PathBuf>,
        now: Instant,
        delay: Duration,
    ) {
        self.seq += 1;
        let key = (now + delay, self.seq);
        match self.pending.get_mut(&path) {
            Some((intent, old_key)) => {
                self.schedule.remove(&*old_key);
                intent.kind = kind;
                intent.updated_at = now;
                if kind.is_delete() {
                    intent.renamed_from = None;
                } else if renamed_from.is_some() {
                    intent.renamed_from = renamed_from;
                }
                *old_key = key;
            }
            None => {
                let intent = PendingIntent {
                    path: path.clone(),
                    kind,
                    renamed_from,
                    enqueued_at: now,
                    updated_at: now,
                };
                self.pending.insert(path.clone(), (intent, key));
            }
        }
        self.schedule.insert(key, path);
    }
}

#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    inner: Mutex<Inner>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn observe(&self, event: ChangeEvent) {
        self.observe_at(event, Instant::now());
    }

    /// Register or refresh the intent for the event's path. A move becomes
    /// a creation at the new path (remembering the old one) and a deletion
    /// at the old path, queued in that order.
    pub fn observe_at(&self, event: ChangeEvent, now: Instant) {
        let delay = self.delay;
        let mut inner = self.lock();
        match (event.kind, event.from) {
            (ChangeKind::Moved, Some(from)) => {
                inner.upsert(event.path, IntentKind::Created, Some(from.clone()), now, delay);
                inner.upsert(from, IntentKind::Deleted, None, now, delay);
            }
            (ChangeKind::Moved, None) | (ChangeKind::Created, _) => {
                inner.upsert(event.path, IntentKind::Created, None, now, delay)
            }
            (ChangeKind::Modified, _) => {
                inner.upsert(event.path, IntentKind::Modified, None, now, delay)
            }
            (ChangeKind::Deleted, _) => {
                inner.upsert(event.path, IntentKind::Deleted, None, now, delay)
            }
        }
    }

    pub fn poll(&self) -> std::vec::IntoIter<PendingIntent> {
        self.poll_at(Instant::now())
    }

    /// Remove and return every intent quiet for at least the delay, oldest
    /// deadline first.
    pub fn poll_at(&self, now: Instant) -> std::vec::IntoIter<PendingIntent> {
        let mut inner = self.lock();
        let later = inner.schedule.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut inner.schedule, later);
        due.into_values()
            .filter_map(|path| inner.pending.remove(&path).map(|(intent, _)| intent))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Drop everything still pending; returns how many intents were dropped.
    pub fn discard(&self) -> usize {
        let mut inner = self.lock();
        let n = inner.pending.len();
        inner.pending.clear();
        inner.schedule.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().schedule.keys().next().map(|(at, _)| *at)
    }
}
