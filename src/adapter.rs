//! Adapts a node-style `f(args..., cb)` collaborator — where `cb` fires
//! exactly once with either a success or failure result — into an
//! [`EventSource`]-shaped emitter with `run`, `error`, and `return` events.
//!
//! In the source material this adapter only disclaims "no guard against a
//! callback firing twice." Routing the completion through a
//! `Box<dyn FnOnce(Result<T, Err>) + Send>` makes a second completion a
//! compile-time impossibility here rather than a documented risk — a
//! structural strengthening, not a behavior change.

use std::sync::Arc;

use crate::emitter::EventEmitter;

/// A single-shot, node-style completion callback.
pub type Completion<T, Err> = Box<dyn FnOnce(Result<T, Err>) + Send>;

/// A node-style async function: takes `args` plus a completion callback,
/// and returns without waiting for it to fire.
pub type NodeStyleFn<Args, T, Err> = Arc<dyn Fn(Args, Completion<T, Err>) + Send + Sync>;

/// Wraps a [`NodeStyleFn`] collaborator so its single completion is
/// re-exposed as `"error"`/`"return"` events on ordinary emitters.
pub struct AsyncCallbackAdapter<Args, T, Err> {
    args: Arc<std::sync::Mutex<Option<Args>>>,
    f: NodeStyleFn<Args, T, Err>,
    error: Arc<EventEmitter<Err>>,
    ret: Arc<EventEmitter<T>>,
}

impl<Args, T, Err> AsyncCallbackAdapter<Args, T, Err>
where
    Args: Send + 'static,
    T: Send + Sync + 'static,
    Err: Send + Sync + 'static,
{
    /// Build an adapter around `f`, capturing `args` for a later [`run`].
    ///
    /// [`run`]: AsyncCallbackAdapter::run
    pub fn new(f: NodeStyleFn<Args, T, Err>, args: Args) -> Self {
        Self {
            args: Arc::new(std::sync::Mutex::new(Some(args))),
            f,
            error: Arc::new(EventEmitter::new()),
            ret: Arc::new(EventEmitter::new()),
        }
    }

    /// The `"error"` channel: emits once, iff `f`'s callback completed with
    /// `Err`.
    pub fn error(&self) -> &Arc<EventEmitter<Err>> {
        &self.error
    }

    /// The `"return"` channel: emits once, iff `f`'s callback completed
    /// with `Ok`.
    pub fn ret(&self) -> &Arc<EventEmitter<T>> {
        &self.ret
    }

    /// Invoke `f` with the captured args and a completion callback that
    /// routes its single result onto `error` or `ret`. Calling `run` more
    /// than once re-invokes `f`, which will panic if the captured args were
    /// already consumed.
    pub fn run(&self) {
        let args = self
            .args
            .lock()
            .unwrap()
            .take()
            .expect("AsyncCallbackAdapter::run called more than once");
        let error = Arc::clone(&self.error);
        let ret = Arc::clone(&self.ret);
        let cb: Completion<T, Err> = Box::new(move |result| match result {
            Ok(value) => ret.emit("return", &value),
            Err(err) => error.emit("error", &err),
        });
        (self.f)(args, cb);
    }
}
