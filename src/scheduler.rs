//! Explicit, cancelable timers.
//!
//! All delayed work in the simulation (restart-delay completions,
//! real-time telemetry ticks, periodic load simulation) goes through this
//! module instead of ad-hoc spawned sleeps, so every pending timer has a
//! handle that its owner can cancel on teardown.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Handle to a scheduled timer or repeating task
#[derive(Debug)]
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the timer. Work that has not started will never run; a
    /// callback already executing is interrupted at its next await point.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Whether the underlying task has finished (completed or canceled)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run `task` once after `delay` elapses.
///
/// The returned handle cancels the pending run; dropping the handle does
/// not (the owner decides when a timer dies).
pub fn schedule_once<F>(delay: Duration, task: F) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    });
    TimerHandle { handle }
}

/// Run a task produced by `make_task` every `period`, starting after one
/// full period.
pub fn schedule_repeating<M, F>(period: Duration, mut make_task: M) -> TimerHandle
where
    M: FnMut() -> F + Send + 'static,
    F: Future<Output = ()> + Send,
{
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick of a tokio interval fires immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            make_task().await;
        }
    });
    TimerHandle { handle }
}
