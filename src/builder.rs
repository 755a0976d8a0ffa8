//! Builder pattern for assembling a state table before constructing a live
//! [`crate::fsm::Fsm`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::clock::{Clock, TokioClock};
use crate::error::{FsmError, FsmResult};
use crate::fsm::{EntryFn, Fsm, StateEntry};

/// Assembles root states, their nested sub-states, and the all-state-event
/// set, then constructs the FSM and drives it into its initial state.
pub struct FsmBuilder<Ctx, Evt> {
    context: Ctx,
    states: HashMap<String, StateEntry<Ctx, Evt>>,
    all_state_events: HashSet<String>,
    clock: Arc<dyn Clock>,
    /// First malformed-input error seen while assembling the table, surfaced
    /// from [`FsmBuilder::build`]. Builder methods return `Self` for
    /// chaining, so a call-order mistake (e.g. `sub_state` before its
    /// parent's `state`) can't fail on the spot; it's recorded here instead
    /// of silently dropped.
    pending_error: Option<FsmError>,
}

impl<Ctx, Evt> FsmBuilder<Ctx, Evt>
where
    Ctx: Send + 'static,
    Evt: Send + Sync + 'static,
{
    /// Start a new builder over the given shared context, with the default
    /// tokio-backed clock.
    pub fn new(context: Ctx) -> Self {
        Self {
            context,
            states: HashMap::new(),
            all_state_events: HashSet::new(),
            clock: Arc::new(TokioClock),
            pending_error: None,
        }
    }

    /// Use a non-default [`Clock`] implementation, e.g. a fake clock in
    /// tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a root state's entry function.
    pub fn state(mut self, name: impl Into<String>, entry: EntryFn<Ctx, Evt>) -> Self {
        self.states.insert(
            name.into(),
            StateEntry {
                entry,
                sub_states: HashMap::new(),
            },
        );
        self
    }

    /// Register a sub-state nested one level under `parent`, reachable as
    /// `"parent.leaf"`. `parent` must already have been registered via
    /// [`FsmBuilder::state`]; if it hasn't, [`FsmBuilder::build`] fails with
    /// [`FsmError::ArgumentType`] rather than silently dropping the
    /// sub-state.
    pub fn sub_state(
        mut self,
        parent: impl Into<String>,
        leaf: impl Into<String>,
        entry: EntryFn<Ctx, Evt>,
    ) -> Self {
        let parent = parent.into();
        let leaf = leaf.into();
        match self.states.get_mut(&parent) {
            Some(state_entry) => {
                state_entry.sub_states.insert(leaf, entry);
            }
            None => {
                if self.pending_error.is_none() {
                    self.pending_error = Some(FsmError::argument(
                        "parent",
                        format!(
                            "sub_state {leaf:?} registered before its parent state {parent:?} was"
                        ),
                    ));
                }
            }
        }
        self
    }

    /// Require every state to register a listener for `name` on entry.
    pub fn all_state_event(mut self, name: impl Into<String>) -> Self {
        self.all_state_events.insert(name.into());
        self
    }

    /// Construct the FSM and synchronously drive it into `initial`.
    pub fn build(self, initial: impl Into<String>) -> FsmResult<Fsm<Ctx, Evt>> {
        if let Some(err) = self.pending_error {
            return Err(err);
        }
        let initial = initial.into();
        if !self.states.contains_key(initial.split('.').next().unwrap_or(&initial)) {
            return Err(FsmError::UnknownState(initial));
        }
        Fsm::construct(
            self.context,
            self.states,
            self.all_state_events,
            self.clock,
            initial,
        )
    }
}
