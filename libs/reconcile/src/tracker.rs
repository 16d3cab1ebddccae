//! Dependency tracker: which reconcile keys must run again when a
//! referenced object changes.
//!
//! Edges are registered while a pass resolves its references. A pass opens a
//! [`TrackingSession`]; every `track` call takes effect immediately (so a
//! reference to an object that does not exist yet still re-triggers the pass
//! once it appears) and `commit` prunes the edges the pass no longer touched.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

#[derive(Debug)]
struct Index<D, K> {
    /// dependency -> dependents
    dependents: HashMap<D, HashSet<K>>,
    /// dependent -> dependencies
    dependencies: HashMap<K, HashSet<D>>,
}

impl<D, K> Index<D, K>
where
    D: Clone + Eq + Hash,
    K: Clone + Eq + Hash,
{
    fn insert(&mut self, dependency: D, dependent: K) {
        self.dependents
            .entry(dependency.clone())
            .or_default()
            .insert(dependent.clone());
        self.dependencies
            .entry(dependent)
            .or_default()
            .insert(dependency);
    }

    fn remove(&mut self, dependency: &D, dependent: &K) {
        if let Some(set) = self.dependents.get_mut(dependency) {
            set.remove(dependent);
            if set.is_empty() {
                self.dependents.remove(dependency);
            }
        }
        if let Some(set) = self.dependencies.get_mut(dependent) {
            set.remove(dependency);
            if set.is_empty() {
                self.dependencies.remove(dependent);
            }
        }
    }
}

/// Bidirectional dependency index, safe to share between workers.
#[derive(Debug)]
pub struct Tracker<D, K> {
    index: Mutex<Index<D, K>>,
}

impl<D, K> Default for Tracker<D, K> {
    fn default() -> Self {
        Self {
            index: Mutex::new(Index {
                dependents: HashMap::new(),
                dependencies: HashMap::new(),
            }),
        }
    }
}

impl<D, K> Tracker<D, K>
where
    D: Clone + Eq + Hash + std::fmt::Debug,
    K: Clone + Eq + Hash + std::fmt::Debug,
{
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Index<D, K>> {
        // The index holds no invariants a panicking holder could break
        // halfway, so a poisoned lock is still usable.
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register that `dependent` depends on `dependency`.
    pub fn track(&self, dependency: D, dependent: K) {
        trace!(?dependency, ?dependent, "tracking dependency");
        self.lock().insert(dependency, dependent);
    }

    /// Everything that currently depends on `dependency`.
    pub fn lookup(&self, dependency: &D) -> Vec<K> {
        self.lock()
            .dependents
            .get(dependency)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Everything `dependent` currently depends on.
    pub fn dependencies_of(&self, dependent: &K) -> Vec<D> {
        self.lock()
            .dependencies
            .get(dependent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every edge of `dependent`.
    pub fn forget(&self, dependent: &K) {
        let mut index = self.lock();
        let Some(dependencies) = index.dependencies.remove(dependent) else {
            return;
        };
        for dependency in dependencies {
            if let Some(set) = index.dependents.get_mut(&dependency) {
                set.remove(dependent);
                if set.is_empty() {
                    index.dependents.remove(&dependency);
                }
            }
        }
    }

    /// Open a pass-scoped session for `dependent`.
    pub fn session(&self, dependent: K) -> TrackingSession<'_, D, K> {
        TrackingSession {
            tracker: self,
            dependent,
            touched: HashSet::new(),
        }
    }

    /// Number of dependencies with at least one dependent.
    pub fn len(&self) -> usize {
        self.lock().dependents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Edges registered by one reconcile pass.
#[derive(Debug)]
pub struct TrackingSession<'a, D, K> {
    tracker: &'a Tracker<D, K>,
    dependent: K,
    touched: HashSet<D>,
}

impl<D, K> TrackingSession<'_, D, K>
where
    D: Clone + Eq + Hash + std::fmt::Debug,
    K: Clone + Eq + Hash + std::fmt::Debug,
{
    /// Register an edge from this session's dependent to `dependency`.
    pub fn track(&mut self, dependency: D) {
        self.tracker.track(dependency.clone(), self.dependent.clone());
        self.touched.insert(dependency);
    }

    /// Replace the dependent's edges with the ones touched in this session.
    pub fn commit(self) {
        let mut index = self.tracker.lock();
        let stale: Vec<D> = index
            .dependencies
            .get(&self.dependent)
            .map(|set| {
                set.iter()
                    .filter(|d| !self.touched.contains(*d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for dependency in &stale {
            index.remove(dependency, &self.dependent);
        }
        if !stale.is_empty() {
            trace!(dependent = ?self.dependent, pruned = stale.len(), "pruned stale dependencies");
        }
    }
}
