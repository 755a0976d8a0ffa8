//! The per-state scope handle: the only lawful channel for `gotoState`, and
//! the owner of every listener/timer registered while its state is active.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::TimerToken;
use crate::emitter::{EventSource, Listener, ListenerId};
use crate::error::{FsmError, FsmResult};
use crate::fsm::Fsm;

struct ListenerRecord<Evt> {
    emitter: Arc<dyn EventSource<Evt>>,
    event: String,
    id: ListenerId,
}

/// A scope owner for a single state occupancy. Entry functions register
/// triggers through this handle; when the FSM leaves the state (crossing a
/// root boundary), every listener and timer recorded here — and in every
/// handle linked behind it — is torn down.
pub struct StateHandle<Ctx, Evt> {
    fsm: Fsm<Ctx, Evt>,
    state: String,
    valid: Mutex<bool>,
    link: Option<Arc<StateHandle<Ctx, Evt>>>,
    listeners: Mutex<Vec<ListenerRecord<Evt>>>,
    timeouts: Mutex<Vec<TimerToken>>,
    intervals: Mutex<Vec<TimerToken>>,
    immediates: Mutex<Vec<TimerToken>>,
    valid_transitions: Mutex<Option<HashSet<String>>>,
    /// Teardown closures for subscriptions whose payload type isn't `Evt`
    /// (currently: another FSM's `stateChanged` channel, always `String`),
    /// registered via [`StateHandle::on_state_changed`].
    foreign_teardowns: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    /// The state this handle was used to transition to. Diagnostic only,
    /// and also doubles as the "previously used target" named in a
    /// `HandleAlreadyUsed` error.
    next_state: Mutex<Option<String>>,
}

impl<Ctx, Evt> StateHandle<Ctx, Evt> {
    pub(crate) fn new(
        fsm: Fsm<Ctx, Evt>,
        state: String,
        link: Option<Arc<StateHandle<Ctx, Evt>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            fsm,
            state,
            valid: Mutex::new(true),
            link,
            listeners: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
            intervals: Mutex::new(Vec::new()),
            immediates: Mutex::new(Vec::new()),
            valid_transitions: Mutex::new(None),
            foreign_teardowns: Mutex::new(Vec::new()),
            next_state: Mutex::new(None),
        })
    }

    /// The FSM this handle belongs to.
    pub fn fsm(&self) -> &Fsm<Ctx, Evt> {
        &self.fsm
    }

    /// The full state name this handle was entered for.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Whether this handle has not yet been used to cause a transition.
    pub fn is_valid(&self) -> bool {
        *self.valid.lock().unwrap()
    }

    /// Subscribe `cb` to `emitter`'s `event`, recording the subscription for
    /// automatic teardown when this scope ends.
    pub fn on(
        self: &Arc<Self>,
        emitter: Arc<dyn EventSource<Evt>>,
        event: impl Into<String>,
        cb: Listener<Evt>,
    ) -> ListenerId {
        let event = event.into();
        let id = emitter.on(&event, cb);
        self.listeners.lock().unwrap().push(ListenerRecord {
            emitter,
            event,
            id,
        });
        id
    }

    /// Subscribe `cb` to another FSM's `stateChanged` channel, scoped to
    /// this handle like any other listener: torn down when this state's
    /// scope ends. This is the lawful inter-FSM coordination path named in
    /// the concurrency model — `other`'s `stateChanged` lives on a
    /// dedicated `String`-payload channel separate from its `Evt`-typed
    /// named-event channel, so it can't be reached through plain `on`
    /// unless `Evt = String`.
    pub fn on_state_changed<OtherCtx, OtherEvt>(
        self: &Arc<Self>,
        other: &Fsm<OtherCtx, OtherEvt>,
        cb: impl Fn(&str) + Send + Sync + 'static,
    ) where
        OtherCtx: Send + 'static,
        OtherEvt: Send + Sync + 'static,
    {
        let emitter = other.state_changed_source();
        let id = emitter.on("stateChanged", Arc::new(move |s: &String| cb(s)));
        self.foreign_teardowns
            .lock()
            .unwrap()
            .push(Box::new(move || emitter.remove_listener("stateChanged", id)));
    }

    /// Schedule a one-shot timer, recording its token for teardown.
    pub fn timeout(self: &Arc<Self>, delay: Duration, cb: impl Fn() + Send + Sync + 'static) {
        let token = self.fsm.clock().timeout(delay, Arc::new(cb));
        self.timeouts.lock().unwrap().push(token);
    }

    /// Schedule a periodic timer, recording its token for teardown.
    pub fn interval(self: &Arc<Self>, period: Duration, cb: impl Fn() + Send + Sync + 'static) {
        let token = self.fsm.clock().interval(period, Arc::new(cb));
        self.intervals.lock().unwrap().push(token);
    }

    /// Schedule a next-tick callback, recording its token for teardown.
    pub fn immediate(self: &Arc<Self>, cb: impl Fn() + Send + Sync + 'static) {
        let token = self.fsm.clock().immediate(Arc::new(cb));
        self.immediates.lock().unwrap().push(token);
    }

    /// Wrap `cb` so that it becomes a silent no-op once this handle is
    /// invalidated; while valid, it forwards its argument and `cb`'s return
    /// value unchanged.
    pub fn callback<A, R, F>(self: &Arc<Self>, cb: F) -> impl Fn(A) -> Option<R> + Send + Sync
    where
        F: Fn(A) -> R + Send + Sync + 'static,
        A: 'static,
        R: 'static,
    {
        let handle = Arc::clone(self);
        move |arg: A| {
            if handle.is_valid() {
                Some(cb(arg))
            } else {
                None
            }
        }
    }

    /// Restrict the states this handle may transition to.
    pub fn valid_transitions<I, S>(&self, list: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.valid_transitions.lock().unwrap() =
            Some(list.into_iter().map(Into::into).collect());
    }

    /// The only lawful path to a transition. Fails if this handle was
    /// already used, or if `target` is absent from an active
    /// `validTransitions` list.
    pub fn goto_state(self: &Arc<Self>, target: impl Into<String>) -> FsmResult<()> {
        let target = target.into();
        let mut valid = self.valid.lock().unwrap();
        if !*valid {
            let previously_used = self
                .next_state
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(FsmError::HandleAlreadyUsed {
                current: self.state.clone(),
                attempted: target,
                previously_used,
            });
        }
        if let Some(allowed) = &*self.valid_transitions.lock().unwrap() {
            if !allowed.contains(&target) {
                return Err(FsmError::InvalidTransition {
                    current: self.state.clone(),
                    attempted: target,
                });
            }
        }
        *valid = false;
        drop(valid);
        *self.next_state.lock().unwrap() = Some(target.clone());
        self.fsm.transition_internal(target)
    }

    /// Tear down every listener and timer recorded through this handle,
    /// then cascade into the linked predecessor, if any. Idempotent.
    pub fn disconnect(&self) {
        for record in self.listeners.lock().unwrap().drain(..) {
            record.emitter.remove_listener(&record.event, record.id);
        }
        for token in self.timeouts.lock().unwrap().drain(..) {
            token.cancel();
        }
        for token in self.intervals.lock().unwrap().drain(..) {
            token.cancel();
        }
        for token in self.immediates.lock().unwrap().drain(..) {
            token.cancel();
        }
        for teardown in self.foreign_teardowns.lock().unwrap().drain(..) {
            teardown();
        }
        if let Some(link) = &self.link {
            link.disconnect();
        }
    }
}
