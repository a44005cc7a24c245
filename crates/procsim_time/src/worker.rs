// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::thread::ManagedThread;
use crate::{Binding, Dependent, FromBinding, OnSignalChange, Result, Timer};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Address of the timer driving the worker that runs on this thread, zero elsewhere.
    static DRIVING_TIMER: Cell<usize> = const { Cell::new(0) };
}

fn timer_key(timer: &Timer) -> usize {
    ptr::from_ref(timer).addr()
}

/// Whether the caller runs on a worker thread bound to `timer`.
fn on_worker_of(timer: &Timer) -> bool {
    DRIVING_TIMER.with(Cell::get) == timer_key(timer)
}

/// A thread that runs a callback each time its [`Timer`] ticks.
///
/// Created with [`Timer::make_worker`]. The callback receives the signal state and tick count
/// observed on wake-up; if the callback is slower than the timer, intermediate ticks are
/// skipped rather than queued. Errors and panics raised by the callback are logged and do not
/// stop the worker.
///
/// Dropping the worker stops it.
#[derive(Debug)]
pub struct DependentWorker {
    timer: Arc<Timer>,
    on_tick: OnSignalChange,
    name: String,
    run: Mutex<Option<Run>>,
}

/// One start-to-stop lifetime of the worker thread.
#[derive(Debug)]
struct Run {
    keep_running: Arc<AtomicBool>,
    thread: ManagedThread,
}

impl DependentWorker {
    pub(crate) fn new(timer: Arc<Timer>, on_tick: OnSignalChange) -> Self {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);

        Self {
            timer,
            on_tick,
            name: format!("procsim-dependent-{id}"),
            run: Mutex::new(None),
        }
    }

    /// The timer this worker is bound to.
    #[must_use]
    pub const fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// Name given to the worker's thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub(crate) const fn on_tick(&self) -> &OnSignalChange {
        &self.on_tick
    }
}

impl FromBinding for DependentWorker {
    type Args = ();

    fn from_binding(binding: Binding, (): ()) -> Self {
        let (timer, on_tick) = binding.into_parts();
        Self::new(timer, on_tick)
    }
}

impl Dependent for DependentWorker {
    fn start(&self) -> Result<()> {
        let mut run = self.run.lock();
        if run.is_some() {
            return Ok(());
        }

        let keep_running = Arc::new(AtomicBool::new(true));
        let thread = ManagedThread::spawn(self.name.clone(), {
            let timer = Arc::clone(&self.timer);
            let on_tick = self.on_tick.clone();
            let keep_running = Arc::clone(&keep_running);
            move || run_worker(&timer, &on_tick, &keep_running)
        })?;

        *run = Some(Run { keep_running, thread });
        debug!(worker = %self.name, "worker started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let Some(Run { keep_running, thread }) = self.run.lock().take() else {
            return Ok(());
        };

        keep_running.store(false, Ordering::Release);
        self.timer.notify_waiters();

        // Workers of one timer never join each other.
        if on_worker_of(&self.timer) {
            thread.detach();
            debug!(worker = %self.name, "worker stop requested from a worker thread of its timer");
            return Ok(());
        }

        let result = thread.join_within(self.timer.join_timeout());
        debug!(worker = %self.name, "worker stopped");
        result
    }

    fn request_stop(&self) {
        if let Some(run) = self.run.lock().as_ref() {
            run.keep_running.store(false, Ordering::Release);
        }

        self.timer.notify_waiters();
    }

    fn running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| run.keep_running.load(Ordering::Acquire))
    }
}

impl Drop for DependentWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(worker = %self.name, error = %e, "failed to stop worker on drop");
        }
    }
}

/// Body of the worker thread.
#[cfg_attr(test, mutants::skip)] // Causes test timeout.
fn run_worker(timer: &Timer, on_tick: &OnSignalChange, keep_running: &AtomicBool) {
    DRIVING_TIMER.with(|driving| driving.set(timer_key(timer)));

    let cancelled = || !keep_running.load(Ordering::Acquire);
    let mut last_seen = timer.tick_count();

    while !cancelled() {
        let observed = {
            let mut lock = timer.tick_lock();
            timer.wait_for_tick_after(&mut lock, last_seen, cancelled)
        };

        let Some((state, tick)) = observed else {
            break;
        };

        if cancelled() {
            break;
        }

        last_seen = tick;

        match panic::catch_unwind(AssertUnwindSafe(|| on_tick.call(state, tick))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tick, %state, error = %e, "tick callback failed"),
            Err(_) => warn!(tick, %state, "tick callback panicked"),
        }
    }
}
