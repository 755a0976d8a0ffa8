//! The FSM core: current state, history, the in-transition re-entrancy
//! guard, sub-state boundary logic, all-state-event enforcement, and
//! deferred `stateChanged` emission.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::emitter::{EventEmitter, EventSource, Listener, ListenerId};
use crate::error::{FsmError, FsmResult};
use crate::handle::StateHandle;

/// The code associated with a state: runs exactly once, synchronously, on
/// entry. Registers its triggers through the supplied handle and returns.
pub type EntryFn<Ctx, Evt> = Arc<dyn Fn(&Arc<StateHandle<Ctx, Evt>>) + Send + Sync>;

/// A root state's table entry: its own entry function, plus any sub-states
/// nested one level beneath it, keyed by their leaf name.
pub(crate) struct StateEntry<Ctx, Evt> {
    pub(crate) entry: EntryFn<Ctx, Evt>,
    pub(crate) sub_states: HashMap<String, EntryFn<Ctx, Evt>>,
}

/// History retains only the most recent entries; older ones are dropped.
const HISTORY_CAPACITY: usize = 7;

struct Inner<Ctx, Evt> {
    ctx: Ctx,
    state: Option<String>,
    handle: Option<Arc<StateHandle<Ctx, Evt>>>,
    history: VecDeque<String>,
    in_transition: bool,
    next_state: Option<String>,
    to_emit: Vec<String>,
    all_state_events: HashSet<String>,
    states: HashMap<String, StateEntry<Ctx, Evt>>,
    events: Arc<EventEmitter<Evt>>,
    state_changed: Arc<EventEmitter<String>>,
}

/// A live FSM instance. Cheaply `Clone`-able (an `Arc` handle internally),
/// so it can be captured by the timer/listener callbacks its states
/// register, and passed around as the `emitter` argument to another FSM's
/// `StateHandle::on` for inter-FSM coordination.
pub struct Fsm<Ctx, Evt> {
    inner: Arc<Mutex<Inner<Ctx, Evt>>>,
    clock: Arc<dyn Clock>,
}

impl<Ctx, Evt> Clone for Fsm<Ctx, Evt> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clock: Arc::clone(&self.clock),
        }
    }
}

fn split_state_name(name: &str) -> FsmResult<(String, Option<String>)> {
    match name.matches('.').count() {
        0 => Ok((name.to_string(), None)),
        1 => {
            let (root, sub) = name.split_once('.').expect("one dot present");
            Ok((root.to_string(), Some(sub.to_string())))
        }
        _ => Err(FsmError::MalformedState(name.to_string())),
    }
}

impl<Ctx, Evt> Fsm<Ctx, Evt>
where
    Ctx: Send + 'static,
    Evt: Send + Sync + 'static,
{
    pub(crate) fn construct(
        ctx: Ctx,
        states: HashMap<String, StateEntry<Ctx, Evt>>,
        all_state_events: HashSet<String>,
        clock: Arc<dyn Clock>,
        initial_state: impl Into<String>,
    ) -> FsmResult<Self> {
        let initial_state = initial_state.into();
        if initial_state.is_empty() {
            return Err(FsmError::argument(
                "initialState",
                "must be a non-empty state name",
            ));
        }
        let inner = Inner {
            ctx,
            state: None,
            handle: None,
            history: VecDeque::new(),
            in_transition: false,
            next_state: None,
            to_emit: Vec::new(),
            all_state_events,
            states,
            events: Arc::new(EventEmitter::new()),
            state_changed: Arc::new(EventEmitter::new()),
        };
        let fsm = Fsm {
            inner: Arc::new(Mutex::new(inner)),
            clock,
        };
        fsm.transition_internal(initial_state)?;
        Ok(fsm)
    }

    /// The full current state name, or `None` before initial entry.
    pub fn get_state(&self) -> Option<String> {
        self.inner.lock().unwrap().state.clone()
    }

    /// True iff the current state equals `s` or `s` is its parent.
    pub fn is_in_state(&self, s: &str) -> bool {
        match self.get_state() {
            Some(current) => current == s || current.starts_with(&format!("{s}.")),
            None => false,
        }
    }

    /// The last [`HISTORY_CAPACITY`] full state names, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.inner.lock().unwrap().history.iter().cloned().collect()
    }

    /// Invoke `cb` synchronously if already in `s` (or a sub-state of it);
    /// otherwise invoke it the first time a later transition satisfies the
    /// predicate. A transition that doesn't satisfy it re-arms the wait.
    pub fn on_state<F>(&self, s: impl Into<String>, cb: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let target = s.into();
        if self.is_in_state(&target) {
            cb();
            return;
        }

        let emitter = self.inner.lock().unwrap().state_changed.clone();
        let fsm = self.clone();
        let cb = Arc::new(cb);
        let id_slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let id_slot_inner = Arc::clone(&id_slot);
        let emitter_inner = Arc::clone(&emitter);
        let id = emitter.on(
            "stateChanged",
            Arc::new(move |_new_state: &String| {
                if fsm.is_in_state(&target) {
                    cb();
                    if let Some(id) = id_slot_inner.lock().unwrap().take() {
                        emitter_inner.remove_listener("stateChanged", id);
                    }
                }
            }),
        );
        *id_slot.lock().unwrap() = Some(id);
    }

    /// Subscribe to every `stateChanged` emission, raw and un-deduplicated
    /// (one per transition, deferred and batched to the next tokio tick).
    /// `on_state` is the ergonomic wrapper most callers want; this is the
    /// low-level hook for observability and tests. Deliberately *unscoped* —
    /// it isn't tied to any `StateHandle`, so it's never torn down
    /// automatically. Prefer `StateHandle::on_state_changed` when another
    /// FSM's transitions are meant to drive this one's; reach for this only
    /// when the subscription is meant to outlive any single state.
    pub fn on_transition(&self, cb: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        let emitter = Arc::clone(&self.inner.lock().unwrap().state_changed);
        emitter.on("stateChanged", Arc::new(move |s: &String| cb(s)))
    }

    /// The underlying `stateChanged` event source. Exposed so another FSM's
    /// `StateHandle` can subscribe to it in a scoped, auto-torn-down way via
    /// `StateHandle::on_state_changed` — the `stateChanged` channel is
    /// always `String`-payloaded regardless of this FSM's own `Evt`, so it
    /// can't be reached through the `EventSource<Evt>` impl below unless
    /// `Evt = String`.
    pub fn state_changed_source(&self) -> Arc<EventEmitter<String>> {
        Arc::clone(&self.inner.lock().unwrap().state_changed)
    }

    /// Append `name` to the set of events every state must register a
    /// listener for.
    pub fn all_state_event(&self, name: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .all_state_events
            .insert(name.into());
    }

    /// Public escape hatch: delegates directly to the internal transition
    /// routine, bypassing handle validity. The sanctioned path remains
    /// `StateHandle::goto_state`.
    pub fn goto_state(&self, target: impl Into<String>) -> FsmResult<()> {
        self.transition_internal(target.into())
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run `f` against the shared context under the FSM's single
    /// logical-execution-context lock.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut Ctx) -> R) -> R {
        let mut core = self.inner.lock().unwrap();
        f(&mut core.ctx)
    }

    fn flush_state_changed(&self) {
        let (batch, emitter) = {
            let mut core = self.inner.lock().unwrap();
            (
                std::mem::take(&mut core.to_emit),
                Arc::clone(&core.state_changed),
            )
        };
        for name in batch {
            log::trace!("fsm: emitting stateChanged({name:?})");
            emitter.emit("stateChanged", &name);
        }
    }

    /// The 8-step transition routine of the core design. Structured as a
    /// loop so that the re-entrancy guard (an entry function calling
    /// `gotoState` synchronously) and the drain of a queued `next_state`
    /// share one critical section, without ever recursing while the lock
    /// is held.
    pub(crate) fn transition_internal(&self, target: String) -> FsmResult<()> {
        let mut core = self.inner.lock().unwrap();

        if core.in_transition {
            if core.next_state.is_some() {
                return Err(FsmError::argument(
                    "gotoState",
                    "a transition is already pending for the in-flight entry function",
                ));
            }
            log::debug!("fsm: queuing re-entrant transition to {target:?}");
            core.next_state = Some(target);
            return Ok(());
        }

        let mut current_target = target;
        loop {
            let (new_root, new_sub) = split_state_name(&current_target)?;

            let previous_state = core.state.clone();
            let previous_root = match &previous_state {
                Some(s) => Some(split_state_name(s)?.0),
                None => None,
            };
            let crosses_boundary = previous_root.as_deref() != Some(new_root.as_str());

            let outgoing_handle = core.handle.clone();
            if crosses_boundary {
                if let Some(old) = &outgoing_handle {
                    log::debug!(
                        "fsm: leaving {previous_state:?} for {current_target:?}, tearing down scope"
                    );
                    old.disconnect();
                }
            }

            let entry_fn = {
                let state_entry = match core.states.get(&new_root) {
                    Some(e) => e,
                    None => return Err(FsmError::UnknownState(current_target.clone())),
                };
                match &new_sub {
                    None => Arc::clone(&state_entry.entry),
                    Some(sub) => match state_entry.sub_states.get(sub) {
                        Some(f) => Arc::clone(f),
                        None => return Err(FsmError::UnknownSubState(current_target.clone())),
                    },
                }
            };

            core.state = Some(current_target.clone());
            core.history.push_back(current_target.clone());
            if core.history.len() > HISTORY_CAPACITY {
                core.history.pop_front();
            }

            let link = if crosses_boundary { None } else { outgoing_handle };
            let new_handle = StateHandle::new(self.clone(), current_target.clone(), link);
            core.handle = Some(Arc::clone(&new_handle));

            core.in_transition = true;
            drop(core);

            log::trace!("fsm: entering {current_target:?}");
            let entry_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                entry_fn(&new_handle);
            }));

            core = self.inner.lock().unwrap();
            core.in_transition = false;

            if let Err(payload) = entry_result {
                // Entry-function exceptions are fatal: unwind with
                // `in_transition` already cleared above so the
                // re-entrancy guard never wedges the FSM.
                drop(core);
                std::panic::resume_unwind(payload);
            }

            for name in core.all_state_events.clone() {
                if core.events.listener_count(&name) == 0 {
                    return Err(FsmError::AllStateEventMissing {
                        state: current_target.clone(),
                        event: name,
                    });
                }
            }

            core.to_emit.push(current_target.clone());
            if core.to_emit.len() == 1 {
                let fsm = self.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    fsm.flush_state_changed();
                });
            }

            match core.next_state.take() {
                Some(next) => {
                    current_target = next;
                    continue;
                }
                None => break,
            }
        }

        Ok(())
    }
}

impl<Ctx, Evt> EventSource<Evt> for Fsm<Ctx, Evt>
where
    Ctx: Send + 'static,
    Evt: Send + Sync + 'static,
{
    fn on(&self, event: &str, cb: Listener<Evt>) -> ListenerId {
        let events = Arc::clone(&self.inner.lock().unwrap().events);
        events.on(event, cb)
    }

    fn once(&self, event: &str, cb: Listener<Evt>) -> ListenerId {
        let events = Arc::clone(&self.inner.lock().unwrap().events);
        events.once(event, cb)
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        let events = Arc::clone(&self.inner.lock().unwrap().events);
        events.remove_listener(event, id)
    }

    fn emit(&self, event: &str, payload: &Evt) {
        let events = Arc::clone(&self.inner.lock().unwrap().events);
        events.emit(event, payload)
    }

    fn listener_count(&self, event: &str) -> usize {
        let events = Arc::clone(&self.inner.lock().unwrap().events);
        events.listener_count(event)
    }
}
