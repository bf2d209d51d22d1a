//! Server lifecycle and shutdown coordination.
//!
//! [`Lifecycle`] tracks which phase the server is in and how many calls are
//! currently in flight. Phases only ever move forward:
//!
//! ```text
//! Starting -> Serving -> Draining -> Stopped
//! ```
//!
//! Calls are admitted in `Starting` and `Serving`. Once draining starts, new
//! calls are refused with [`Error::ServiceShutdown`], in-flight calls get a
//! grace period to finish, and whatever is still running afterwards is
//! cancelled through a shared [`CancellationToken`].

use crate::server::telemetry::{decrement_calls_inflight, increment_calls_inflight};
use blog_tonic_core::Error;
use core::time::Duration;
use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicUsize, Ordering},
};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting = 0,
    Serving = 1,
    Draining = 2,
    Stopped = 3,
}

impl LifecycleState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Serving,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

pub struct Lifecycle {
    state: AtomicU8,
    inflight: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Starting as u8),
            inflight: AtomicUsize::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the state forward to `next`. Returns `false` if the lifecycle was
    /// already at or past `next`.
    fn advance(&self, next: LifecycleState) -> bool {
        let prev = self.state.fetch_max(next as u8, Ordering::AcqRel);
        prev < next as u8
    }

    pub fn mark_serving(&self) -> bool {
        self.advance(LifecycleState::Serving)
    }

    pub fn begin_drain(&self) -> bool {
        self.advance(LifecycleState::Draining)
    }

    pub fn mark_stopped(&self) -> bool {
        self.advance(LifecycleState::Stopped)
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Token cancelled once the drain grace period is over.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Registers a new call.
    ///
    /// The returned guard keeps the call counted as in flight until it is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once draining has started.
    pub fn admit(self: &Arc<Self>) -> Result<InflightGuard, Error> {
        if self.state() >= LifecycleState::Draining {
            return Err(Error::ServiceShutdown);
        }

        self.inflight.fetch_add(1, Ordering::AcqRel);
        let guard = InflightGuard {
            lifecycle: Arc::clone(self),
        };
        increment_calls_inflight();

        // Draining may have started between the check and the increment; the
        // guard's drop undoes the count.
        if self.state() >= LifecycleState::Draining {
            return Err(Error::ServiceShutdown);
        }
        Ok(guard)
    }

    /// Stops admitting calls and waits up to `grace` for in-flight calls to
    /// finish, then cancels whatever is left.
    ///
    /// Returns `true` if every in-flight call finished within the grace
    /// period.
    pub async fn drain(&self, grace: Duration) -> bool {
        // === Phase 0: Stop accepting new calls ===
        self.begin_drain();
        tracing::info!("Refusing new calls");

        // === Phase 1: Wait for in-flight calls to finish ===
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        let deadline = Instant::now() + grace;
        while self.inflight() > 0 && Instant::now() < deadline {
            sleep(DRAIN_POLL_INTERVAL).await;
        }

        let drained = self.inflight() == 0;
        if drained {
            tracing::debug!("All in-flight calls finished");
        } else {
            tracing::warn!(
                "Graceful drain timed out ({} calls still active)",
                self.inflight()
            );
        }

        // === Phase 2: Cancel any remaining work ===
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        drained
    }
}

/// Counts one admitted call as in flight for as long as it lives.
#[must_use]
pub struct InflightGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_calls_inflight();
    }
}
