//! The host event-emitter abstraction.
//!
//! Any object an embedding application wants to pass to
//! [`crate::handle::StateHandle::on`] needs only implement [`EventSource`];
//! [`EventEmitter`] is the concrete, reusable implementation used internally
//! for the FSM's own named-event channel (see `allStateEvent`) and available
//! to applications as a ready-made "arbitrary emitter".

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A listener callback. Boxed as `Arc` so the same closure can be recorded
/// both in the emitter's table and, transiently, in the caller's scope.
pub type Listener<Evt> = Arc<dyn Fn(&Evt) + Send + Sync>;

/// Opaque handle returned by subscription, accepted by `remove_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// The narrow interface the FSM core needs from an event-emitter
/// collaborator: `on`/`once`/`removeListener`/`emit`, plus a `listeners`
/// query realized here as a count (closures aren't nameable/equatable
/// values in Rust, so a count is the faithful projection of "the current
/// set").
pub trait EventSource<Evt>: Send + Sync {
    /// Subscribe `cb` to `event`; returns an id usable with
    /// [`EventSource::remove_listener`].
    fn on(&self, event: &str, cb: Listener<Evt>) -> ListenerId;

    /// Subscribe `cb` to fire at most once, then self-remove.
    fn once(&self, event: &str, cb: Listener<Evt>) -> ListenerId;

    /// Remove a previously registered listener. A no-op if already removed.
    fn remove_listener(&self, event: &str, id: ListenerId);

    /// Dispatch `payload` to every listener currently registered for
    /// `event`, in registration order.
    fn emit(&self, event: &str, payload: &Evt);

    /// Number of listeners currently registered for `event`.
    fn listener_count(&self, event: &str) -> usize;
}

struct Entry<Evt> {
    id: ListenerId,
    once: bool,
    cb: Listener<Evt>,
}

struct Inner<Evt> {
    by_event: HashMap<String, Vec<Entry<Evt>>>,
}

/// A concrete, generic event emitter: `on`/`once`/`removeListener`/`emit`
/// over string-keyed events carrying a single payload type `Evt`.
pub struct EventEmitter<Evt> {
    inner: Mutex<Inner<Evt>>,
}

impl<Evt> fmt::Debug for EventEmitter<Evt> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl<Evt> Default for EventEmitter<Evt> {
    fn default() -> Self {
        Self::new()
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> ListenerId {
    ListenerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

impl<Evt> EventEmitter<Evt> {
    /// Create an empty emitter with no listeners.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_event: HashMap::new(),
            }),
        }
    }

    fn subscribe(&self, event: &str, once: bool, cb: Listener<Evt>) -> ListenerId {
        let id = next_id();
        let mut inner = self.inner.lock().unwrap();
        inner
            .by_event
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, once, cb });
        id
    }
}

impl<Evt> EventSource<Evt> for EventEmitter<Evt> {
    fn on(&self, event: &str, cb: Listener<Evt>) -> ListenerId {
        self.subscribe(event, false, cb)
    }

    fn once(&self, event: &str, cb: Listener<Evt>) -> ListenerId {
        self.subscribe(event, true, cb)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entries) = inner.by_event.get_mut(event) {
            entries.retain(|e| e.id != id);
        }
    }

    fn emit(&self, event: &str, payload: &Evt) {
        // Snapshot callbacks, then drop the lock, then invoke them, so a
        // listener that re-enters the emitter (e.g. subscribes or removes
        // itself) never deadlocks against this call.
        let callbacks: Vec<Listener<Evt>> = {
            let mut inner = self.inner.lock().unwrap();
            let Some(entries) = inner.by_event.get_mut(event) else {
                return;
            };
            let callbacks = entries.iter().map(|e| e.cb.clone()).collect();
            entries.retain(|e| !e.once);
            callbacks
        };
        for cb in callbacks {
            cb(payload);
        }
    }

    fn listener_count(&self, event: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.by_event.get(event).map_or(0, |v| v.len())
    }
}
