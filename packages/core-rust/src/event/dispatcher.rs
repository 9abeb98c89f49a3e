//! Priority-ordered, type-routed event dispatcher.
//!
//! Listeners are bucketed by their declared [`EventType`]. Each bucket is
//! kept sorted by `(priority, registration sequence)`, so ties run in the
//! order they were added.
//!
//! The bucket map lives behind an `ArcSwap`: mutations take a single mutex,
//! copy the map, edit one bucket and publish the new map; dispatch loads the
//! current map without locking. A dispatch that races a mutation sees either
//! the old or the new listener set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use super::executor::{DirectExecutor, Executor};
use super::listener::{invoke_listener, same_listener, Listenable, ListenerRef};
use super::model::{Event, EventType};

/// Errors from listener registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("listener does not declare a concrete event type")]
    UndeclaredEventType,
}

#[derive(Clone)]
struct ListenerEntry {
    listener: ListenerRef,
    seq: u64,
}

impl ListenerEntry {
    fn sort_key(&self) -> (i32, u64) {
        (self.listener.priority(), self.seq)
    }

    fn holds(&self, listener: &ListenerRef) -> bool {
        same_listener(&self.listener, listener)
    }
}

type Buckets = HashMap<EventType, Arc<Vec<ListenerEntry>>>;

/// Routes events to listeners registered for the event's type or any of
/// its ancestors.
///
/// Owned and injectable; independent dispatchers do not share state.
pub struct EventDispatcher {
    buckets: ArcSwap<Buckets>,
    /// Serializes all mutations; guards the next registration sequence number.
    mutation: Mutex<u64>,
    executor: Arc<dyn Executor>,
}

impl EventDispatcher {
    /// Creates a dispatcher that runs listeners on the caller's thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executor(Arc::new(DirectExecutor))
    }

    /// Creates a dispatcher that hands each dispatch to `executor`.
    #[must_use]
    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            buckets: ArcSwap::from_pointee(HashMap::new()),
            mutation: Mutex::new(0),
            executor,
        }
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Dispatches `event` to every matching listener.
    ///
    /// The listener set is captured when this is called; the executor then
    /// runs all matching listeners, in priority order, as one task.
    pub fn dispatch(&self, event: Arc<dyn Event>) {
        let buckets = self.buckets.load_full();
        self.executor
            .execute(Box::new(move || deliver(&buckets, event.as_ref())));
    }

    /// Convenience wrapper around [`EventDispatcher::dispatch`].
    pub fn dispatch_event<E: Event>(&self, event: E) {
        self.dispatch(Arc::new(event));
    }

    /// Number of listeners registered for exactly `event_type`.
    #[must_use]
    pub fn listener_count(&self, event_type: &EventType) -> usize {
        self.buckets.load().get(event_type).map_or(0, |b| b.len())
    }

    fn mutate_bucket<F>(&self, event_type: &'static EventType, edit: F)
    where
        F: FnOnce(&mut Vec<ListenerEntry>, &mut u64),
    {
        let mut next_seq = self.mutation.lock();
        let current = self.buckets.load_full();

        let mut entries = current
            .get(event_type)
            .map(|bucket| bucket.as_ref().clone())
            .unwrap_or_default();
        edit(&mut entries, &mut *next_seq);
        entries.sort_by_key(ListenerEntry::sort_key);

        let mut next = current.as_ref().clone();
        if entries.is_empty() {
            next.remove(event_type);
        } else {
            next.insert(*event_type, Arc::new(entries));
        }
        self.buckets.store(Arc::new(next));
    }
}

impl Listenable for EventDispatcher {
    fn add_listener(&self, listener: ListenerRef) -> Result<(), DispatchError> {
        let event_type = assert_listener(&listener)?;
        self.mutate_bucket(event_type, |entries, next_seq| {
            if entries.iter().any(|e| e.holds(&listener)) {
                return;
            }
            entries.push(ListenerEntry {
                listener,
                seq: *next_seq,
            });
            *next_seq += 1;
        });
        debug!(event_type = %event_type, "listener added");
        Ok(())
    }

    fn remove_listener(&self, listener: &ListenerRef) -> Result<(), DispatchError> {
        let event_type = assert_listener(listener)?;
        self.mutate_bucket(event_type, |entries, _| {
            entries.retain(|e| !e.holds(listener));
        });
        Ok(())
    }

    fn get_all_listeners(&self) -> Vec<ListenerRef> {
        let buckets = self.buckets.load();
        let mut all: Vec<&ListenerEntry> = Vec::new();
        for entry in buckets.values().flat_map(|bucket| bucket.iter()) {
            if !all.iter().any(|e| e.holds(&entry.listener)) {
                all.push(entry);
            }
        }
        all.sort_by_key(|e| e.sort_key());
        all.into_iter().map(|e| Arc::clone(&e.listener)).collect()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.buckets.load();
        let mut types: Vec<_> = buckets.keys().map(EventType::name).collect();
        types.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("event_types", &types)
            .finish_non_exhaustive()
    }
}

fn assert_listener(listener: &ListenerRef) -> Result<&'static EventType, DispatchError> {
    listener
        .declared_event_type()
        .ok_or(DispatchError::UndeclaredEventType)
}

fn deliver(buckets: &Buckets, event: &dyn Event) {
    let event_type = event.event_type();
    let mut matched: Vec<&ListenerEntry> = buckets
        .iter()
        .filter(|(registered, _)| registered.is_assignable_from(event_type))
        .flat_map(|(_, bucket)| bucket.iter())
        .collect();
    matched.sort_by_key(|e| e.sort_key());

    for entry in matched {
        invoke_listener(entry.listener.as_ref(), event);
    }
}
