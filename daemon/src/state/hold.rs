//! Deferred dispatch for hold-duration triggers
//!
//! At most one hold timer is outstanding. Its state moves from pending to
//! either fired or cancelled exactly once, so a key-up racing the timer
//! results in zero or one dispatch, never both.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Cancellable handle to a scheduled hold
#[derive(Debug, Clone)]
pub struct HoldHandle {
    state: Arc<AtomicU8>,
}

impl HoldHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Prevent the hold from firing; false if it already fired
    pub fn cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::SeqCst) == FIRED
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

struct Scheduled {
    key_code: u16,
    handle: HoldHandle,
    task: JoinHandle<()>,
}

pub struct HoldScheduler {
    runtime: Handle,
    current: Option<Scheduled>,
}

impl HoldScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            current: None,
        }
    }

    /// Run `work` after `after` unless cancelled first. Replaces any
    /// outstanding hold.
    pub fn schedule<F>(&mut self, key_code: u16, after: Duration, work: F) -> HoldHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let handle = HoldHandle::new();
        let timer = handle.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            if timer.transition(FIRED) {
                work();
            } else {
                trace!(key_code, "hold cancelled before it fired");
            }
        });

        trace!(key_code, after_ms = after.as_millis() as u64, "hold scheduled");
        self.current = Some(Scheduled {
            key_code,
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Cancel the outstanding hold; true if a dispatch was prevented
    pub fn cancel(&mut self) -> bool {
        let Some(scheduled) = self.current.take() else {
            return false;
        };
        let prevented = scheduled.handle.cancel();
        scheduled.task.abort();
        prevented
    }

    /// Cancel only if the outstanding hold belongs to `key_code`
    pub fn cancel_for(&mut self, key_code: u16) -> bool {
        match &self.current {
            Some(scheduled) if scheduled.key_code == key_code => self.cancel(),
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|scheduled| scheduled.handle.is_pending())
    }
}

impl Drop for HoldScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
