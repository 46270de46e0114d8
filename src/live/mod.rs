//! Shared live queries over the entry store.
//!
//! Each distinct query key is backed by at most one feed task that reads
//! the current result and re-reads it whenever a matching change event
//! arrives, multicasting snapshots to every subscriber over a watch
//! channel. When the last subscriber detaches the feed is kept warm for
//! a grace period so rapid resubscribe churn does not trigger fresh
//! reads; once the grace timer elapses the feed is torn down and the
//! cached value discarded.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use log::{error, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::db::{Database, DiaryEntry, EntryChange};
use crate::error::StorageError;

/// How long a query's feed survives after its last subscriber detaches.
pub const DEFAULT_KEEP_WARM: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    AllEntries,
    EntryById(i64),
}

impl QueryKey {
    fn matches(&self, change: &EntryChange) -> bool {
        match self {
            QueryKey::AllEntries => true,
            QueryKey::EntryById(id) => change.entry_id() == *id,
        }
    }
}

/// The value carried by a live query at some instant.
#[derive(Debug, Clone)]
pub enum LiveSnapshot {
    /// The initial read has not completed yet.
    Pending,
    /// Result of an `AllEntries` query, newest id first.
    Entries(Arc<Vec<DiaryEntry>>),
    /// Result of an `EntryById` query.
    Entry(Option<DiaryEntry>),
}

struct Slot {
    subscribers: usize,
    epoch: u64,
    tx: watch::Sender<LiveSnapshot>,
    feed: JoinHandle<()>,
    grace: Option<JoinHandle<()>>,
}

struct CacheInner {
    db: Database,
    keep_warm: Duration,
    slots: Mutex<HashMap<QueryKey, Slot>>,
    next_epoch: AtomicU64,
    feeds_started: AtomicU64,
}

#[derive(Clone)]
pub struct LiveQueries {
    inner: Arc<CacheInner>,
}

impl LiveQueries {
    pub fn new(db: Database) -> Self {
        Self::with_keep_warm(db, DEFAULT_KEEP_WARM)
    }

    pub fn with_keep_warm(db: Database, keep_warm: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                db,
                keep_warm,
                slots: Mutex::new(HashMap::new()),
                next_epoch: AtomicU64::new(0),
                feeds_started: AtomicU64::new(0),
            }),
        }
    }

    /// Attaches to the live query for `key`, starting its feed if it is
    /// not already running. Concurrent subscribers to the same key share
    /// one feed and observe the same snapshot sequence.
    pub fn subscribe(&self, key: QueryKey) -> Subscription {
        let mut slots = lock_slots(&self.inner);

        let rx = match slots.get_mut(&key) {
            Some(slot) => {
                if let Some(timer) = slot.grace.take() {
                    timer.abort();
                }
                slot.subscribers += 1;
                slot.tx.subscribe()
            }
            None => {
                let (tx, rx) = watch::channel(LiveSnapshot::Pending);
                let feed = tokio::spawn(run_feed(
                    self.inner.db.clone(),
                    key.clone(),
                    tx.clone(),
                ));
                self.inner.feeds_started.fetch_add(1, Ordering::Relaxed);
                let epoch = self.inner.next_epoch.fetch_add(1, Ordering::Relaxed);
                slots.insert(
                    key.clone(),
                    Slot {
                        subscribers: 1,
                        epoch,
                        tx,
                        feed,
                        grace: None,
                    },
                );
                rx
            }
        };

        Subscription {
            cache: Arc::clone(&self.inner),
            key,
            rx,
            cancelled: false,
        }
    }

    /// Number of keys with a running feed (active or in grace).
    pub fn warm_queries(&self) -> usize {
        lock_slots(&self.inner).len()
    }

    #[cfg(test)]
    fn feeds_started(&self) -> u64 {
        self.inner.feeds_started.load(Ordering::Relaxed)
    }
}

fn lock_slots(inner: &CacheInner) -> std::sync::MutexGuard<'_, HashMap<QueryKey, Slot>> {
    match inner.slots.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn release(inner: &Arc<CacheInner>, key: &QueryKey) {
    let mut slots = lock_slots(inner);
    let Some(slot) = slots.get_mut(key) else {
        return;
    };

    slot.subscribers = slot.subscribers.saturating_sub(1);
    if slot.subscribers > 0 {
        return;
    }

    let epoch = slot.epoch;
    let cache = Arc::clone(inner);
    let key_for_timer = key.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(cache.keep_warm).await;

        let mut slots = lock_slots(&cache);
        let still_idle = slots
            .get(&key_for_timer)
            .is_some_and(|slot| slot.epoch == epoch && slot.subscribers == 0);
        if !still_idle {
            return;
        }
        if let Some(slot) = slots.remove(&key_for_timer) {
            slot.feed.abort();
        }
    });
    slot.grace = Some(timer);
}

async fn load(db: &Database, key: &QueryKey) -> Result<LiveSnapshot, StorageError> {
    match key {
        QueryKey::AllEntries => Ok(LiveSnapshot::Entries(Arc::new(db.all_entries().await?))),
        QueryKey::EntryById(id) => Ok(LiveSnapshot::Entry(db.entry_by_id(*id).await?)),
    }
}

async fn run_feed(db: Database, key: QueryKey, tx: watch::Sender<LiveSnapshot>) {
    let mut changes = db.subscribe_changes();

    match load(&db, &key).await {
        Ok(snapshot) => {
            tx.send_replace(snapshot);
        }
        Err(err) => error!("live query {key:?} initial read failed: {err}"),
    }

    loop {
        match changes.recv().await {
            Ok(change) => {
                if !key.matches(&change) {
                    continue;
                }
                match load(&db, &key).await {
                    Ok(snapshot) => {
                        tx.send_replace(snapshot);
                    }
                    Err(err) => error!("live query {key:?} refresh failed: {err}"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("live query {key:?} lagged {missed} changes behind; refreshing");
                match load(&db, &key).await {
                    Ok(snapshot) => {
                        tx.send_replace(snapshot);
                    }
                    Err(err) => error!("live query {key:?} refresh failed: {err}"),
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// A single observer's handle on a live query. Dropping it (or calling
/// [`Subscription::cancel`]) releases the underlying feed once every
/// other subscriber is gone and the grace period has elapsed.
pub struct Subscription {
    cache: Arc<CacheInner>,
    key: QueryKey,
    rx: watch::Receiver<LiveSnapshot>,
    cancelled: bool,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest snapshot; `Pending` until the first read completes.
    pub fn snapshot(&self) -> LiveSnapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next emission. Returns `None` when the feed has
    /// been torn down.
    pub async fn next(&mut self) -> Option<LiveSnapshot> {
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Detaches this subscriber. Idempotent.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            release(&self.cache, &self.key);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
