//! Thought and rule stores.
//!
//! [`Store`] is a concurrent id → entity map (DashMap) with:
//!
//! - update semantics that preserve `created_at` and refresh `modified_at`
//! - prefix lookup for short ids typed by humans
//! - synchronous change listeners
//! - a pending change set drained by [`Store::get_delta`], the only channel
//!   external broadcasters use to learn what changed
//!
//! [`snapshot`] holds the persisted form of both stores.

pub mod snapshot;

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

use crate::error::StoreError;
use crate::rule::Rule;
use crate::thought::{Thought, ThoughtStatus};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shortest prefix accepted by [`Store::resolve_prefix`] (exact ids are
/// always accepted).
pub const MIN_PREFIX_LEN: usize = 4;

pub type ThoughtStore = Store<Thought>;
pub type RuleStore = Store<Rule>;

/// Current time in unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An entity a [`Store`] can hold.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn created_at(&self) -> u64;

    /// Overwrite both timestamps.
    fn stamp(&mut self, created_at: u64, modified_at: u64);

    /// Carry over extension metadata from the entity being replaced.
    fn merge_from(&mut self, previous: &Self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

/// A single mutation, as seen by listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub id: String,
}

/// Listener invoked synchronously after every mutation.
pub type ChangeListener = Box<dyn Fn(&Change) + Send + Sync>;

/// Everything that changed since the previous drain.
#[derive(Debug, Clone)]
pub struct Delta<T> {
    /// Current state of added or updated entities, ordered by id.
    pub changed: Vec<T>,
    /// Ids of deleted entities, ordered.
    pub deleted: Vec<String>,
}

impl<T> Delta<T> {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Default)]
struct PendingChanges {
    changed: BTreeSet<String>,
    deleted: BTreeSet<String>,
}

/// Concurrent entity store with change tracking.
pub struct Store<T: Record> {
    label: &'static str,
    items: DashMap<String, T>,
    pending: Mutex<PendingChanges>,
    listeners: RwLock<Vec<ChangeListener>>,
}

impl<T: Record> Store<T> {
    /// Create an empty store. `label` names the store in errors and logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            items: DashMap::new(),
            pending: Mutex::new(PendingChanges::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Insert a new entity. Fails if the id is taken.
    pub fn add(&self, mut item: T) -> StoreResult<()> {
        let now = now_millis();
        let created = if item.created_at() == 0 {
            now
        } else {
            item.created_at()
        };
        item.stamp(created, now);
        let id = item.id().to_string();

        match self.items.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::DuplicateId {
                    store: self.label,
                    id,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(item);
            }
        }
        self.record(ChangeKind::Added, id);
        Ok(())
    }

    /// Replace an existing entity, keeping its original `created_at`.
    pub fn update(&self, mut item: T) -> StoreResult<()> {
        let id = item.id().to_string();
        {
            let Some(mut slot) = self.items.get_mut(&id) else {
                return Err(StoreError::NotFound {
                    store: self.label,
                    id,
                });
            };
            item.merge_from(&slot);
            item.stamp(slot.created_at(), now_millis());
            *slot = item;
        }
        self.record(ChangeKind::Updated, id);
        Ok(())
    }

    /// Atomically mutate an entity in place and return its new state.
    ///
    /// The closure must not call back into this store.
    pub fn modify<F>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let updated = {
            let mut slot = self.items.get_mut(id)?;
            let created = slot.created_at();
            f(&mut slot);
            slot.stamp(created, now_millis());
            slot.value().clone()
        };
        self.record(ChangeKind::Updated, id.to_string());
        Some(updated)
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.items.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    /// All entities, oldest first (ties broken by id).
    pub fn get_all(&self) -> Vec<T> {
        self.filter(|_| true)
    }

    /// Entities matching a predicate, oldest first.
    pub fn filter<P>(&self, pred: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        let mut out: Vec<T> = self
            .items
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        out
    }

    /// Remove an entity. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        let existed = self.items.remove(id).is_some();
        if existed {
            self.record(ChangeKind::Deleted, id.to_string());
        }
        existed
    }

    /// Resolve an exact id or unique prefix, or `None`.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<T> {
        self.resolve_prefix(prefix).ok()
    }

    /// Resolve an exact id or unique prefix, explaining failures.
    pub fn resolve_prefix(&self, prefix: &str) -> StoreResult<T> {
        if let Some(exact) = self.get(prefix) {
            return Ok(exact);
        }
        if prefix.chars().count() < MIN_PREFIX_LEN {
            return Err(StoreError::PrefixTooShort {
                store: self.label,
                prefix: prefix.to_string(),
                min: MIN_PREFIX_LEN,
            });
        }
        let mut matches: Vec<T> = self
            .items
            .iter()
            .filter(|r| r.key().starts_with(prefix))
            .map(|r| r.value().clone())
            .take(2)
            .collect();
        match matches.len() {
            0 => Err(StoreError::NoMatch {
                store: self.label,
                prefix: prefix.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(StoreError::AmbiguousPrefix {
                store: self.label,
                prefix: prefix.to_string(),
                matches: self
                    .items
                    .iter()
                    .filter(|r| r.key().starts_with(prefix))
                    .count(),
            }),
        }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Register a listener called after every mutation.
    ///
    /// Listeners run on the mutating thread with no store locks held.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Drain the pending change set.
    ///
    /// Drains are destructive: a second call returns only what changed in
    /// between.
    pub fn get_delta(&self) -> Delta<T> {
        let pending = {
            let mut guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        Delta {
            changed: pending
                .changed
                .iter()
                .filter_map(|id| self.get(id))
                .collect(),
            deleted: pending.deleted.into_iter().collect(),
        }
    }

    /// Whether anything changed since the last drain.
    pub fn has_pending_changes(&self) -> bool {
        let guard = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        !guard.changed.is_empty() || !guard.deleted.is_empty()
    }

    /// Replace the whole content, keeping stored timestamps. Every loaded id
    /// is reported as changed; ids that disappear are reported as deleted.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) {
        let old: Vec<String> = self.items.iter().map(|r| r.key().clone()).collect();
        self.items.clear();
        for item in items {
            self.items.insert(item.id().to_string(), item);
        }
        for id in old {
            if !self.items.contains_key(&id) {
                self.record(ChangeKind::Deleted, id);
            }
        }
        let loaded: Vec<String> = self.items.iter().map(|r| r.key().clone()).collect();
        for id in loaded {
            self.record(ChangeKind::Updated, id);
        }
    }

    fn record(&self, kind: ChangeKind, id: String) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match kind {
                ChangeKind::Added | ChangeKind::Updated => {
                    pending.deleted.remove(&id);
                    pending.changed.insert(id.clone());
                }
                ChangeKind::Deleted => {
                    pending.changed.remove(&id);
                    pending.deleted.insert(id.clone());
                }
            }
        }
        let change = Change { kind, id };
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(&change);
        }
    }
}

impl<T: Record> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.label)
            .field("count", &self.items.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Thought queries
// ---------------------------------------------------------------------------

impl Store<Thought> {
    /// All thoughts in the given status.
    pub fn with_status(&self, status: ThoughtStatus) -> Vec<Thought> {
        self.filter(|t| t.status == status)
    }

    pub fn pending(&self) -> Vec<Thought> {
        self.with_status(ThoughtStatus::Pending)
    }

    /// The WAITING thought suspended on the given external request.
    pub fn find_waiting_for(&self, request_id: &str) -> Option<Thought> {
        self.items
            .iter()
            .find(|r| {
                let t = r.value();
                t.status == ThoughtStatus::Waiting
                    && t.metadata.waiting_for.as_deref() == Some(request_id)
            })
            .map(|r| r.value().clone())
    }

    pub fn children_of(&self, parent_id: &str) -> Vec<Thought> {
        self.filter(|t| t.metadata.parent_id.as_deref() == Some(parent_id))
    }

    /// Thought counts per status, in lifecycle order.
    pub fn status_counts(&self) -> Vec<(ThoughtStatus, usize)> {
        [
            ThoughtStatus::Pending,
            ThoughtStatus::Active,
            ThoughtStatus::Waiting,
            ThoughtStatus::Done,
            ThoughtStatus::Failed,
        ]
        .into_iter()
        .map(|s| (s, self.items.iter().filter(|r| r.value().status == s).count()))
        .collect()
    }
}

impl Store<Rule> {
    /// Rules eligible for matching.
    pub fn enabled(&self) -> Vec<Rule> {
        self.filter(|r| r.metadata.enabled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::term::Term;
    use crate::thought::ThoughtKind;

    fn thought(id: &str) -> Thought {
        Thought::with_id(id, ThoughtKind::Input, Term::atom(id))
    }

    #[test]
    fn add_get_delete() {
        let store = ThoughtStore::new("thoughts");
        store.add(thought("a1")).unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(store.get("a1").unwrap().content, Term::atom("a1"));
        assert!(store.delete("a1"));
        assert!(!store.delete("a1"));
        assert!(store.get("a1").is_none());
    }

    #[test]
    fn duplicate_add_fails() {
        let store = ThoughtStore::new("thoughts");
        store.add(thought("a1")).unwrap();
        let err = store.add(thought("a1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn update_preserves_created_at_and_merges_extra() {
        let store = ThoughtStore::new("thoughts");
        let mut t = thought("a1");
        t.metadata.created_at = 42;
        t.metadata.extra.insert("source".into(), "cli".into());
        store.add(t).unwrap();

        let mut replacement = thought("a1");
        replacement.content = Term::atom("changed");
        replacement.metadata.extra.insert("note".into(), "x".into());
        store.update(replacement).unwrap();

        let stored = store.get("a1").unwrap();
        assert_eq!(stored.metadata.created_at, 42);
        assert!(stored.metadata.modified_at >= 42);
        assert_eq!(stored.content, Term::atom("changed"));
        assert_eq!(stored.metadata.extra.get("source").map(String::as_str), Some("cli"));
        assert_eq!(stored.metadata.extra.get("note").map(String::as_str), Some("x"));
    }

    #[test]
    fn update_missing_fails() {
        let store = ThoughtStore::new("thoughts");
        assert!(matches!(
            store.update(thought("nope")),
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.modify("nope", |_| {}).is_none());
    }

    #[test]
    fn prefix_lookup() {
        let store = ThoughtStore::new("thoughts");
        store.add(thought("abcd-1111")).unwrap();
        store.add(thought("abcd-2222")).unwrap();
        store.add(thought("xy")).unwrap();

        // Exact ids always resolve, even when short.
        assert_eq!(store.find_by_prefix("xy").unwrap().id, "xy");
        assert_eq!(store.find_by_prefix("abcd-1").unwrap().id, "abcd-1111");
        assert!(matches!(
            store.resolve_prefix("abcd"),
            Err(StoreError::AmbiguousPrefix { matches: 2, .. })
        ));
        assert!(matches!(
            store.resolve_prefix("ab"),
            Err(StoreError::PrefixTooShort { .. })
        ));
        assert!(matches!(
            store.resolve_prefix("zzzz"),
            Err(StoreError::NoMatch { .. })
        ));
    }

    #[test]
    fn delta_drains_and_tracks_deletions() {
        let store = ThoughtStore::new("thoughts");
        store.add(thought("a")).unwrap();
        store.add(thought("b")).unwrap();
        store.modify("a", |t| t.status = ThoughtStatus::Done);

        let delta = store.get_delta();
        let ids: Vec<_> = delta.changed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(delta.deleted.is_empty());
        assert!(store.get_delta().is_empty());

        store.modify("b", |t| t.status = ThoughtStatus::Done);
        store.delete("b");
        let delta = store.get_delta();
        assert!(delta.changed.is_empty());
        assert_eq!(delta.deleted, ["b"]);
    }

    #[test]
    fn listeners_see_every_mutation() {
        let store = ThoughtStore::new("thoughts");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        store.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.add(thought("a")).unwrap();
        store.modify("a", |t| t.metadata.retries = 1);
        store.delete("a");
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn waiting_lookup_and_children() {
        let store = ThoughtStore::new("thoughts");
        let parent = thought("p");
        let mut waiting = thought("w").child_of(&parent);
        waiting.status = ThoughtStatus::Waiting;
        waiting.metadata.waiting_for = Some("req-1".into());
        store.add(parent).unwrap();
        store.add(waiting).unwrap();

        assert_eq!(store.find_waiting_for("req-1").unwrap().id, "w");
        assert!(store.find_waiting_for("req-2").is_none());
        assert_eq!(store.children_of("p").len(), 1);
        assert!(store.pending().iter().all(|t| t.id == "p"));

        // A stale request id on a thought that is no longer waiting is ignored.
        store.modify("w", |t| t.status = ThoughtStatus::Failed);
        assert!(store.find_waiting_for("req-1").is_none());
    }

    #[test]
    fn concurrent_adds() {
        let store = Arc::new(ThoughtStore::new("thoughts"));
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.add(thought(&format!("t{i}"))).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.count(), 64);
        assert_eq!(store.get_delta().changed.len(), 64);
    }
}
