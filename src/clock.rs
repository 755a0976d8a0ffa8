//! The host timer abstraction: one-shot, periodic, and next-tick
//! scheduling primitives, each returning a cancellable [`TimerToken`].

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A cancellable handle to a scheduled timer callback.
pub struct TimerToken {
    handle: JoinHandle<()>,
}

impl TimerToken {
    /// Cancel the timer. Idempotent; cancelling an already-fired or
    /// already-cancelled timer is a no-op.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for TimerToken {
    fn drop(&mut self) {
        // Tokens are owned by a `StateHandle`'s scope collections and are
        // explicitly cancelled on teardown; dropping one outside of that
        // path (e.g. a test holding it directly) should not leave the timer
        // running past the token's lifetime.
        self.handle.abort();
    }
}

/// The narrow interface the FSM core needs from a timer collaborator.
pub trait Clock: Send + Sync {
    /// Schedule `cb` to run once, after `delay`.
    fn timeout(&self, delay: Duration, cb: Arc<dyn Fn() + Send + Sync>) -> TimerToken;

    /// Schedule `cb` to run repeatedly, every `period`.
    fn interval(&self, period: Duration, cb: Arc<dyn Fn() + Send + Sync>) -> TimerToken;

    /// Schedule `cb` to run on the next turn of the event loop.
    fn immediate(&self, cb: Arc<dyn Fn() + Send + Sync>) -> TimerToken;
}

/// The default [`Clock`], backed by the `tokio` runtime the FSM is driven
/// from.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn timeout(&self, delay: Duration, cb: Arc<dyn Fn() + Send + Sync>) -> TimerToken {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cb();
        });
        TimerToken { handle }
    }

    fn interval(&self, period: Duration, cb: Arc<dyn Fn() + Send + Sync>) -> TimerToken {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; consume it so `interval`
            // behaves like a periodic timer rather than one that also
            // fires at t=0.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cb();
            }
        });
        TimerToken { handle }
    }

    fn immediate(&self, cb: Arc<dyn Fn() + Send + Sync>) -> TimerToken {
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            cb();
        });
        TimerToken { handle }
    }
}
