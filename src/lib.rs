//! # Moore FSM
//!
//! An async-friendly Moore finite state machine runtime.
//!
//! Each state is a piece of code — an *entry function* — that runs exactly
//! once when the state is entered. It does not run "while" the FSM is in
//! that state; all it can do is register listeners and timers through the
//! [`StateHandle`] it's given, and those triggers cause the next
//! transition. When the FSM leaves a state for another at the same nesting
//! level (a root-boundary transition), every listener and timer registered
//! through that state's handle is automatically torn down — there is no
//! way to leak a callback from a state you've already left.
//!
//! States may nest one level deep (`"parent.child"`); a sub-state inherits
//! its parent's listeners and timers, and only the root segment changing
//! triggers teardown.
//!
//! ## Quick start
//!
//! ```rust
//! use moore_fsm::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> FsmResult<()> {
//!     let fsm: Fsm<(), ()> = FsmBuilder::new(())
//!         .state("off", Arc::new(|handle: &Arc<StateHandle<(), ()>>| {
//!             log::info!("entered off");
//!         }))
//!         .state("on", Arc::new(|_handle: &Arc<StateHandle<(), ()>>| {
//!             log::info!("entered on");
//!         }))
//!         .build("off")?;
//!
//!     fsm.goto_state("on")?;
//!     assert_eq!(fsm.get_state().as_deref(), Some("on"));
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

mod adapter;
mod builder;
mod clock;
mod emitter;
mod error;
mod fsm;
mod handle;

pub use adapter::{AsyncCallbackAdapter, Completion, NodeStyleFn};
pub use builder::FsmBuilder;
pub use clock::{Clock, TimerToken, TokioClock};
pub use emitter::{EventEmitter, EventSource, Listener, ListenerId};
pub use error::{FsmError, FsmResult};
pub use fsm::{EntryFn, Fsm};
pub use handle::StateHandle;
pub use std::time::Duration;

pub mod prelude {
    //! Convenient re-export of the commonly used types.

    pub use crate::{
        AsyncCallbackAdapter, Clock, Duration, EntryFn, EventEmitter, EventSource, Fsm,
        FsmBuilder, FsmError, FsmResult, Listener, ListenerId, StateHandle, TimerToken,
        TokioClock,
    };
}
