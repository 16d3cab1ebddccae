//! In-memory [`Store`] used by tests and the standalone binary.
//!
//! Besides the trait it offers out-of-band helpers that play the role of the
//! other actors in a cluster (`seed`, `patch_status`, `delete`), an opt-in
//! action log of every trait call, and fault injection through
//! [`MemoryStore::fail_next`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future;
use futures_util::stream::{BoxStream, StreamExt};
use procon_events::WatchEvent;
use procon_id::{Generation, ObjectKey, ResourceVersion, TypedKey, Uid};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use super::{Store, StoreError, Stores};
use crate::api::{Function, LabelSelector, Processor, Resource, Stream, Workload};

/// Buffered watch events per subscriber before it lags.
const WATCH_CAPACITY: usize = 1024;

/// Store operations, as recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
}

impl Verb {
    /// Returns true for verbs that write.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Verb::Create | Verb::Update | Verb::UpdateStatus)
    }
}

/// One recorded store call. `key` is `None` for lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAction {
    pub verb: Verb,
    pub key: Option<ObjectKey>,
}

struct State<R: Resource> {
    objects: BTreeMap<R::Key, R>,
    version: u64,
    /// `None` unless built with [`MemoryStore::with_action_log`].
    actions: Option<Vec<StoreAction>>,
    faults: Vec<(Verb, StoreError)>,
}

impl<R: Resource> State<R> {
    fn next_version(&mut self) -> ResourceVersion {
        self.version += 1;
        ResourceVersion::new(self.version)
    }

    /// Records the call and pops the first fault queued for `verb`.
    fn begin(&mut self, verb: Verb, key: Option<ObjectKey>) -> Result<(), StoreError> {
        if let Some(actions) = &mut self.actions {
            actions.push(StoreAction { verb, key });
        }
        match self.faults.iter().position(|(v, _)| *v == verb) {
            Some(index) => Err(self.faults.remove(index).1),
            None => Ok(()),
        }
    }

    fn stored(&self, key: &R::Key) -> Result<&R, StoreError> {
        self.objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(object_key(key)))
    }

    fn check_version(&self, object: &R, stored: &R) -> Result<(), StoreError> {
        let expected = object.meta().resource_version;
        let actual = stored.meta().resource_version;
        if expected.is_unset() || expected == actual {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                key: object_key(&object.key()),
                expected,
                actual,
            })
        }
    }
}

type EventFn<R> = fn(ObjectKey, ResourceVersion, R) -> WatchEvent<R>;

fn object_key<K: TypedKey>(key: &K) -> ObjectKey {
    ObjectKey::new(K::KIND, key.namespace(), key.name())
}

/// A map of objects behind a mutex, with a broadcast watch.
pub struct MemoryStore<R: Resource> {
    state: Mutex<State<R>>,
    events: broadcast::Sender<WatchEvent<R>>,
}

impl<R: Resource> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> MemoryStore<R> {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A store that records every trait call, for assertions in tests.
    pub fn with_action_log() -> Self {
        Self::build(Some(Vec::new()))
    }

    fn build(actions: Option<Vec<StoreAction>>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                version: 0,
                actions,
                faults: Vec::new(),
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, make: EventFn<R>, object: &R) {
        let event = make(
            object_key(&object.key()),
            object.meta().resource_version,
            object.clone(),
        );
        debug!(key = %event.key, event = %event.event_type, "store event");
        // No receivers is fine; nobody is watching yet.
        let _ = self.events.send(event);
    }

    /// Inserts or replaces an object as another actor would, status
    /// included. Not recorded in the action log.
    pub fn seed(&self, mut object: R) -> R {
        let mut state = self.lock();
        let existing = state.objects.get(&object.key()).cloned();
        let generation = match &existing {
            Some(stored) if object.spec() == stored.spec() => stored.meta().generation,
            Some(stored) => stored.meta().generation.next(),
            None if object.meta().generation == Generation::default() => Generation::FIRST,
            None => object.meta().generation,
        };
        let version = state.next_version();

        let meta = object.meta_mut();
        match &existing {
            Some(stored) => {
                meta.uid = stored.meta().uid;
                meta.creation_timestamp = stored.meta().creation_timestamp;
            }
            None => {
                meta.uid.get_or_insert_with(Uid::new);
                meta.creation_timestamp.get_or_insert_with(Utc::now);
            }
        }
        meta.generation = generation;
        meta.resource_version = version;
        state.objects.insert(object.key(), object.clone());
        drop(state);

        let make: EventFn<R> = if existing.is_some() {
            WatchEvent::modified
        } else {
            WatchEvent::added
        };
        self.emit(make, &object);
        object
    }

    /// Changes an object's status as its own controller would. Not
    /// recorded in the action log.
    pub fn patch_status(&self, key: &R::Key, patch: impl FnOnce(&mut R::Status)) -> Option<R> {
        let mut state = self.lock();
        let mut object = state.objects.get(key)?.clone();
        patch(object.status_mut());
        object.meta_mut().resource_version = state.next_version();
        state.objects.insert(key.clone(), object.clone());
        drop(state);

        self.emit(WatchEvent::modified, &object);
        Some(object)
    }

    /// Removes an object. Not recorded in the action log.
    pub fn delete(&self, key: &R::Key) -> Option<R> {
        let mut state = self.lock();
        let mut object = state.objects.remove(key)?;
        object.meta_mut().resource_version = state.next_version();
        drop(state);

        self.emit(WatchEvent::deleted, &object);
        Some(object)
    }

    /// Current stored copy, bypassing the action log.
    pub fn peek(&self, key: &R::Key) -> Option<R> {
        self.lock().objects.get(key).cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes the next call with `verb` fail with `error`.
    pub fn fail_next(&self, verb: Verb, error: StoreError) {
        self.lock().faults.push((verb, error));
    }

    /// Every trait call so far, oldest first. Always empty without the
    /// action log.
    pub fn actions(&self) -> Vec<StoreAction> {
        self.lock().actions.clone().unwrap_or_default()
    }

    /// Recorded writes only.
    pub fn mutations(&self) -> Vec<StoreAction> {
        self.actions()
            .into_iter()
            .filter(|a| a.verb.is_mutation())
            .collect()
    }

    pub fn clear_actions(&self) {
        if let Some(actions) = &mut self.lock().actions {
            actions.clear();
        }
    }
}

#[async_trait]
impl<R: Resource> Store<R> for MemoryStore<R> {
    async fn get(&self, key: &R::Key) -> Result<R, StoreError> {
        let mut state = self.lock();
        state.begin(Verb::Get, Some(object_key(key)))?;
        state.stored(key).cloned()
    }

    async fn list(&self, selector: &LabelSelector) -> Result<Vec<R>, StoreError> {
        let mut state = self.lock();
        state.begin(Verb::List, None)?;
        Ok(state
            .objects
            .values()
            .filter(|o| selector.matches(&o.meta().labels))
            .cloned()
            .collect())
    }

    fn watch(&self) -> BoxStream<'static, WatchEvent<R>> {
        // A lagging subscriber skips what it missed; periodic resync covers
        // the gap.
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| future::ready(event.ok()))
            .boxed()
    }

    async fn create(&self, object: &R) -> Result<R, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.begin(Verb::Create, Some(object_key(&key)))?;
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(object_key(&key)));
        }

        let mut created = object.clone();
        *created.status_mut() = R::Status::default();
        let version = state.next_version();
        let meta = created.meta_mut();
        meta.uid = Some(Uid::new());
        meta.generation = Generation::FIRST;
        meta.resource_version = version;
        meta.creation_timestamp = Some(Utc::now());
        state.objects.insert(key, created.clone());
        drop(state);

        self.emit(WatchEvent::added, &created);
        Ok(created)
    }

    async fn update(&self, object: &R) -> Result<R, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.begin(Verb::Update, Some(object_key(&key)))?;
        let stored = state.stored(&key)?.clone();
        state.check_version(object, &stored)?;

        let mut updated = object.clone();
        *updated.status_mut() = stored.status().clone();
        let version = state.next_version();
        let meta = updated.meta_mut();
        meta.uid = stored.meta().uid;
        meta.creation_timestamp = stored.meta().creation_timestamp;
        meta.resource_version = version;
        meta.generation = if object.spec() == stored.spec() {
            stored.meta().generation
        } else {
            stored.meta().generation.next()
        };
        state.objects.insert(key, updated.clone());
        drop(state);

        self.emit(WatchEvent::modified, &updated);
        Ok(updated)
    }

    async fn update_status(&self, object: &R) -> Result<R, StoreError> {
        let key = object.key();
        let mut state = self.lock();
        state.begin(Verb::UpdateStatus, Some(object_key(&key)))?;
        let stored = state.stored(&key)?.clone();
        state.check_version(object, &stored)?;

        let mut updated = stored;
        *updated.status_mut() = object.status().clone();
        updated.meta_mut().resource_version = state.next_version();
        state.objects.insert(key, updated.clone());
        drop(state);

        self.emit(WatchEvent::modified, &updated);
        Ok(updated)
    }
}

/// Concrete in-memory stores for every kind, kept alongside the
/// type-erased [`Stores`] handed to the controller.
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub processors: Arc<MemoryStore<Processor>>,
    pub functions: Arc<MemoryStore<Function>>,
    pub streams: Arc<MemoryStore<Stream>>,
    pub workloads: Arc<MemoryStore<Workload>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores that record every trait call.
    pub fn with_action_log() -> Self {
        Self {
            processors: Arc::new(MemoryStore::with_action_log()),
            functions: Arc::new(MemoryStore::with_action_log()),
            streams: Arc::new(MemoryStore::with_action_log()),
            workloads: Arc::new(MemoryStore::with_action_log()),
        }
    }

    /// Type-erased handles over the same stores.
    pub fn stores(&self) -> Stores {
        Stores {
            processors: self.processors.clone(),
            functions: self.functions.clone(),
            streams: self.streams.clone(),
            workloads: self.workloads.clone(),
        }
    }

    /// Writes recorded across every kind.
    pub fn mutation_count(&self) -> usize {
        self.processors.mutations().len()
            + self.functions.mutations().len()
            + self.streams.mutations().len()
            + self.workloads.mutations().len()
    }

    pub fn clear_actions(&self) {
        self.processors.clear_actions();
        self.functions.clear_actions();
        self.streams.clear_actions();
        self.workloads.clear_actions();
    }
}
