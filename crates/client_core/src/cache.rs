use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use shared::domain::{UserId, UserRecord};
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    api::{QueryData, QueryKey, UserApi},
    error::ClientError,
    validation::ValidUser,
};

const DEFAULT_GC_TIME: Duration = Duration::from_secs(300);
const EVENT_CHANNEL_CAPACITY: usize = 256;

pub type CacheHandle = Arc<QueryCache>;
pub type QueryCallback = Arc<dyn Fn(&QueryKey, &Arc<QueryEntry>) + Send + Sync>;

type SharedFetch = Shared<BoxFuture<'static, Result<QueryData, ClientError>>>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub stale_time: Duration,
    /// `None` keeps entries for the life of the cache.
    pub gc_time: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            gc_time: Some(DEFAULT_GC_TIME),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryEntry {
    pub data: Option<QueryData>,
    pub error: Option<ClientError>,
    pub is_loading: bool,
    pub is_invalidated: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub revision: u64,
}

impl QueryEntry {
    pub fn is_pending(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Succeeded,
    Failed(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutput {
    Created(Option<UserRecord>),
    Updated(Option<UserRecord>),
    Deleted(UserId),
}

#[derive(Debug, Clone)]
enum MutationOp {
    Create(ValidUser),
    Update(UserId, ValidUser),
    Delete(UserId),
}

#[derive(Debug, Clone)]
pub struct Mutation {
    op: MutationOp,
    invalidates: Vec<QueryKey>,
}

impl Mutation {
    pub fn create(user: ValidUser) -> Self {
        Self {
            op: MutationOp::Create(user),
            invalidates: vec![QueryKey::Users],
        }
    }

    pub fn update(id: UserId, user: ValidUser) -> Self {
        Self {
            invalidates: vec![QueryKey::Users, QueryKey::User(id.clone())],
            op: MutationOp::Update(id, user),
        }
    }

    pub fn delete(id: UserId) -> Self {
        Self {
            invalidates: vec![QueryKey::Users, QueryKey::User(id.clone())],
            op: MutationOp::Delete(id),
        }
    }

    pub fn invalidating(mut self, key: QueryKey) -> Self {
        if !self.invalidates.contains(&key) {
            self.invalidates.push(key);
        }
        self
    }

    pub fn kind(&self) -> MutationKind {
        match self.op {
            MutationOp::Create(_) => MutationKind::Create,
            MutationOp::Update(..) => MutationKind::Update,
            MutationOp::Delete(_) => MutationKind::Delete,
        }
    }

    pub fn invalidates(&self) -> &[QueryKey] {
        &self.invalidates
    }

    async fn run(&self, api: &UserApi) -> Result<MutationOutput, ClientError> {
        match &self.op {
            MutationOp::Create(user) => api.create_user(user).await.map(MutationOutput::Created),
            MutationOp::Update(id, user) => {
                api.update_user(id, user).await.map(MutationOutput::Updated)
            }
            MutationOp::Delete(id) => api
                .delete_user(id)
                .await
                .map(|()| MutationOutput::Deleted(id.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    QueryChanged {
        key: QueryKey,
        revision: u64,
    },
    MutationStarted {
        id: MutationId,
        kind: MutationKind,
    },
    MutationSettled {
        id: MutationId,
        kind: MutationKind,
        status: MutationStatus,
    },
}

struct Slot {
    entry: Arc<QueryEntry>,
    subscribers: HashMap<u64, QueryCallback>,
    inflight: Option<SharedFetch>,
    generation: u64,
    fetched_at: Option<Instant>,
    idle_since: Option<Instant>,
}

impl Slot {
    fn new() -> Self {
        Self {
            entry: Arc::new(QueryEntry::default()),
            subscribers: HashMap::new(),
            inflight: None,
            generation: 0,
            fetched_at: None,
            idle_since: Some(Instant::now()),
        }
    }

    fn is_stale(&self, stale_time: Duration) -> bool {
        self.entry.is_invalidated
            || self
                .fetched_at
                .map_or(true, |fetched_at| fetched_at.elapsed() >= stale_time)
    }

    fn replace(&mut self, change: impl FnOnce(&mut QueryEntry)) -> Arc<QueryEntry> {
        let mut next = QueryEntry::clone(&self.entry);
        change(&mut next);
        next.revision = self.entry.revision + 1;
        self.entry = Arc::new(next);
        Arc::clone(&self.entry)
    }

    fn notification(&self, key: &QueryKey) -> Notification {
        Notification {
            key: key.clone(),
            entry: Arc::clone(&self.entry),
            listeners: self.subscribers.values().cloned().collect(),
        }
    }
}

struct Notification {
    key: QueryKey,
    entry: Arc<QueryEntry>,
    listeners: Vec<QueryCallback>,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<QueryKey, Slot>,
    mutations: HashMap<MutationId, MutationKind>,
}

pub struct QueryCache {
    api: UserApi,
    config: CacheConfig,
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
    next_subscriber: AtomicU64,
    next_mutation: AtomicU64,
    this: Weak<QueryCache>,
}

impl QueryCache {
    pub fn create(api: UserApi, config: CacheConfig) -> CacheHandle {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|this| Self {
            api,
            config,
            state: Mutex::new(CacheState::default()),
            events,
            next_subscriber: AtomicU64::new(1),
            next_mutation: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn read(&self, key: &QueryKey) -> Arc<QueryEntry> {
        let (entry, notification) = {
            let mut state = self.lock();
            let slot = state.slots.entry(key.clone()).or_insert_with(Slot::new);
            let notification = if slot.inflight.is_none() && slot.is_stale(self.config.stale_time)
            {
                Some(self.start_fetch(slot, key).1)
            } else {
                None
            };
            (Arc::clone(&slot.entry), notification)
        };
        if let Some(notification) = notification {
            self.dispatch(notification);
        }
        entry
    }

    pub async fn fetch(&self, key: &QueryKey) -> Result<QueryData, ClientError> {
        let (fetch, notification) = {
            let mut state = self.lock();
            let slot = state.slots.entry(key.clone()).or_insert_with(Slot::new);
            let existing = slot.inflight.clone();
            match existing {
                Some(inflight) => {
                    debug!(%key, "joining in-flight fetch");
                    (inflight, None)
                }
                None => {
                    if !slot.is_stale(self.config.stale_time) {
                        if let Some(data) = slot.entry.data.clone() {
                            return Ok(data);
                        }
                    }
                    let (fetch, notification) = self.start_fetch(slot, key);
                    (fetch, Some(notification))
                }
            }
        };
        if let Some(notification) = notification {
            self.dispatch(notification);
        }
        fetch.await
    }

    pub fn peek(&self, key: &QueryKey) -> Option<Arc<QueryEntry>> {
        self.lock()
            .slots
            .get(key)
            .map(|slot| Arc::clone(&slot.entry))
    }

    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock()
            .slots
            .get(key)
            .is_some_and(|slot| slot.inflight.is_some())
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.lock()
            .slots
            .get(key)
            .map_or(0, |slot| slot.subscribers.len())
    }

    pub fn subscribe<F>(&self, key: &QueryKey, callback: F) -> Subscription
    where
        F: Fn(&QueryKey, &Arc<QueryEntry>) + Send + Sync + 'static,
    {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.lock();
            let slot = state.slots.entry(key.clone()).or_insert_with(Slot::new);
            slot.subscribers.insert(id, Arc::new(callback));
            slot.idle_since = None;
        }
        debug!(%key, subscriber = id, "subscribed");
        Subscription {
            cache: self.this.clone(),
            key: key.clone(),
            id,
        }
    }

    fn unsubscribe(&self, key: &QueryKey, id: u64) {
        let became_idle = {
            let mut state = self.lock();
            let Some(slot) = state.slots.get_mut(key) else {
                return;
            };
            slot.subscribers.remove(&id);
            if slot.subscribers.is_empty() {
                slot.idle_since = Some(Instant::now());
                true
            } else {
                false
            }
        };
        debug!(%key, subscriber = id, "unsubscribed");

        if became_idle {
            self.schedule_gc();
        }
    }

    fn schedule_gc(&self) {
        let Some(gc_time) = self.config.gc_time else {
            return;
        };
        let this = self.this.clone();
        spawn_detached(async move {
            tokio::time::sleep(gc_time).await;
            if let Some(cache) = this.upgrade() {
                cache.collect_garbage();
            }
        });
    }

    pub fn collect_garbage(&self) -> usize {
        let Some(gc_time) = self.config.gc_time else {
            return 0;
        };
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|key, slot| {
            let expired = slot.subscribers.is_empty()
                && slot.inflight.is_none()
                && slot
                    .idle_since
                    .is_some_and(|idle_since| idle_since.elapsed() >= gc_time);
            if expired {
                debug!(%key, "evicting idle query entry");
            }
            !expired
        });
        before - state.slots.len()
    }

    /// A fetch already in flight for one of the keys is detached: its waiters
    /// still get its result but the entry will not take it.
    pub fn invalidate(&self, keys: &[QueryKey]) {
        let mut notifications = Vec::new();
        {
            let mut state = self.lock();
            for key in keys {
                let Some(slot) = state.slots.get_mut(key) else {
                    continue;
                };
                slot.generation += 1;
                slot.inflight = None;
                slot.replace(|entry| {
                    entry.is_invalidated = true;
                    entry.is_loading = false;
                });
                debug!(%key, "invalidated");
                if slot.subscribers.is_empty() {
                    notifications.push(slot.notification(key));
                } else {
                    notifications.push(self.start_fetch(slot, key).1);
                }
            }
        }
        for notification in notifications {
            self.dispatch(notification);
        }
    }

    pub fn clear(&self, key: &QueryKey) {
        let notification = {
            let mut state = self.lock();
            let Some(slot) = state.slots.get_mut(key) else {
                return;
            };
            slot.generation += 1;
            slot.inflight = None;
            slot.fetched_at = None;
            slot.replace(|entry| {
                entry.data = None;
                entry.error = None;
                entry.is_loading = false;
                entry.is_invalidated = false;
                entry.updated_at = None;
            });
            slot.notification(key)
        };
        self.dispatch(notification);
    }

    /// Runs to completion even if the returned future is dropped.
    pub async fn mutate(&self, mutation: Mutation) -> Result<MutationOutput, ClientError> {
        let id = MutationId(self.next_mutation.fetch_add(1, Ordering::Relaxed));
        let kind = mutation.kind();
        self.lock().mutations.insert(id, kind);
        let _ = self.events.send(CacheEvent::MutationStarted { id, kind });
        info!(mutation_id = id.0, ?kind, "issuing mutation");

        let api = self.api.clone();
        let this = self.this.clone();
        let task = tokio::spawn(async move {
            let result = mutation.run(&api).await;
            if let Some(cache) = this.upgrade() {
                cache.settle_mutation(id, &mutation, &result);
            }
            result
        });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                let err = ClientError::Aborted(join_err.to_string());
                self.finish_mutation(id, kind, MutationStatus::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Oldest first.
    pub fn pending_mutations(&self) -> Vec<(MutationId, MutationKind)> {
        let mut pending: Vec<_> = self
            .lock()
            .mutations
            .iter()
            .map(|(id, kind)| (*id, *kind))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        pending
    }

    fn settle_mutation(
        &self,
        id: MutationId,
        mutation: &Mutation,
        result: &Result<MutationOutput, ClientError>,
    ) {
        let status = match result {
            Ok(_) => {
                self.invalidate(mutation.invalidates());
                MutationStatus::Succeeded
            }
            Err(err) => {
                warn!(mutation_id = id.0, kind = ?mutation.kind(), error = %err, "mutation failed");
                MutationStatus::Failed(err.clone())
            }
        };
        self.finish_mutation(id, mutation.kind(), status);
    }

    fn finish_mutation(&self, id: MutationId, kind: MutationKind, status: MutationStatus) {
        if self.lock().mutations.remove(&id).is_none() {
            return;
        }
        debug!(mutation_id = id.0, ?kind, ?status, "mutation settled");
        let _ = self
            .events
            .send(CacheEvent::MutationSettled { id, kind, status });
    }

    fn start_fetch(&self, slot: &mut Slot, key: &QueryKey) -> (SharedFetch, Notification) {
        let generation = slot.generation;
        let api = self.api.clone();
        let this = self.this.clone();
        let task_key = key.clone();
        let fetch = async move {
            let result = api.query(&task_key).await;
            if let Some(cache) = this.upgrade() {
                cache.complete_fetch(&task_key, generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        debug!(%key, generation, "starting fetch");
        slot.inflight = Some(fetch.clone());
        slot.replace(|entry| entry.is_loading = true);
        spawn_detached(fetch.clone().map(|_| ()));
        (fetch, slot.notification(key))
    }

    fn complete_fetch(
        &self,
        key: &QueryKey,
        generation: u64,
        result: &Result<QueryData, ClientError>,
    ) {
        let (notification, unwatched) = {
            let mut state = self.lock();
            let Some(slot) = state.slots.get_mut(key) else {
                debug!(%key, "dropping fetch result for evicted entry");
                return;
            };
            if slot.generation != generation {
                debug!(%key, generation, "dropping fetch result superseded by invalidation");
                return;
            }
            slot.inflight = None;
            match result {
                Ok(data) => {
                    slot.fetched_at = Some(Instant::now());
                    slot.replace(|entry| {
                        entry.data = Some(data.clone());
                        entry.error = None;
                        entry.is_loading = false;
                        entry.is_invalidated = false;
                        entry.updated_at = Some(Utc::now());
                    });
                }
                Err(err) => {
                    warn!(%key, error = %err, "query fetch failed");
                    slot.replace(|entry| {
                        entry.error = Some(err.clone());
                        entry.is_loading = false;
                    });
                }
            }
            // Entries nobody subscribed to start idling once they settle.
            let unwatched = slot.subscribers.is_empty();
            if unwatched {
                slot.idle_since = Some(Instant::now());
            }
            (slot.notification(key), unwatched)
        };
        self.dispatch(notification);
        if unwatched {
            self.schedule_gc();
        }
    }

    fn dispatch(&self, notification: Notification) {
        let Notification {
            key,
            entry,
            listeners,
        } = notification;
        for listener in &listeners {
            listener(&key, &entry);
        }
        let _ = self.events.send(CacheEvent::QueryChanged {
            key,
            revision: entry.revision,
        });
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Unsubscribes on drop.
pub struct Subscription {
    cache: Weak<QueryCache>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unsubscribe(&self.key, self.id);
        }
    }
}

fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => warn!("no tokio runtime available; background cache work not started"),
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
