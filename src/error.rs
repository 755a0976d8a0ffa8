//! Error types for the state machine

use thiserror::Error;

/// Result type alias for state machine operations
pub type FsmResult<T> = std::result::Result<T, FsmError>;

/// Errors that can occur during state machine operations
#[derive(Error, Debug)]
pub enum FsmError {
    /// Target state's root segment has no registered entry function.
    #[error("Unknown FSM state: {0}")]
    UnknownState(String),

    /// Root exists but the sub-segment does not.
    #[error("Unknown FSM sub-state: {0}")]
    UnknownSubState(String),

    /// Target state name contains more than one dot.
    #[error("Malformed FSM state name: {0}")]
    MalformedState(String),

    /// `gotoState` was called on a handle that already caused a transition.
    #[error(
        "FSM attempted to leave state {current} towards {attempted} via a handle that was already used to enter state {previously_used}"
    )]
    HandleAlreadyUsed {
        /// The FSM's current state at the time of the rejected call.
        current: String,
        /// The state the rejected call tried to transition to.
        attempted: String,
        /// The state the handle was already used to enter.
        previously_used: String,
    },

    /// The target state is absent from the active `validTransitions` list.
    #[error("Invalid FSM transition: {current} => {attempted}")]
    InvalidTransition {
        /// The FSM's current state.
        current: String,
        /// The rejected target state.
        attempted: String,
    },

    /// After a transition, a required all-state event has no listener.
    #[error(
        "FSM state {state:?} did not register a listener for required all-state event {event:?}"
    )]
    AllStateEventMissing {
        /// The state that was just entered.
        state: String,
        /// The missing event name.
        event: String,
    },

    /// A non-string state, non-function callback, or non-array-of-strings
    /// transition list (or other malformed argument) was supplied.
    #[error("Invalid argument {argument:?}: {reason}")]
    ArgumentType {
        /// Name of the offending argument.
        argument: String,
        /// Human-readable explanation.
        reason: String,
    },
}

impl FsmError {
    pub(crate) fn argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        FsmError::ArgumentType {
            argument: argument.into(),
            reason: reason.into(),
        }
    }
}
