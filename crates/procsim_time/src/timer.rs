// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::registry::DependentRegistry;
use crate::running_time::RunningTime;
use crate::thread::ManagedThread;
use crate::{
    Binding, Dependent, DependentWorker, Error, FromBinding, OnSignalChange, Result, SignalPolicy, SignalState, TickCount,
    TickOutcome, TimerBuilder,
};

/// The heartbeat of a simulation: a dedicated thread that ticks at a fixed resolution and
/// releases every thread waiting for the next tick.
///
/// Each tick increments the tick count and recomputes the [`SignalState`] through the timer's
/// [`SignalPolicy`]. Work that should run once per tick is expressed as a [`Dependent`],
/// created with [`make_worker`][Self::make_worker] or [`make_dependant`][Self::make_dependant].
///
/// Timers are always shared; constructors return an `Arc<Timer>`. Dropping the last reference
/// to an active timer stops it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use procsim_time::{Dependent, Timer};
///
/// let timer = Timer::new(Duration::from_millis(1))?;
/// let worker = timer.make_worker(|state, tick| println!("tick {tick}: {state}"));
///
/// worker.start()?;
/// timer.start()?;
/// std::thread::sleep(Duration::from_millis(10));
/// timer.stop()?;
///
/// assert!(!worker.running());
/// assert!(timer.tick_count() > 0);
/// # Ok::<(), procsim_time::Error>(())
/// ```
pub struct Timer {
    core: Arc<TimerCore>,
    thread_name: String,
    join_timeout: Duration,
    generator: Mutex<Option<Generator>>,
    dependents: DependentRegistry,
}

/// One start-to-stop lifetime of the generator thread.
///
/// Each run has its own shutdown flag, so a generator left detached by a timed-out stop never
/// resumes ticking after a restart.
#[derive(Debug)]
struct Generator {
    shutdown: Arc<AtomicBool>,
    thread: ManagedThread,
}

/// Holds the lock that [`Timer::wait_for_tick`] releases while waiting.
///
/// Obtained from [`Timer::tick_lock`].
#[derive(Debug)]
pub struct TickGuard<'a>(MutexGuard<'a, ()>);

/// State shared between a [`Timer`] and its generator thread.
struct TimerCore {
    resolution: Duration,
    policy: Box<dyn SignalPolicy>,
    active: AtomicBool,
    signal: RwLock<Signal>,

    // Waiters for the next tick.
    tick: Mutex<()>,
    tick_cv: Condvar,

    control: Mutex<Control>,
    control_cv: Condvar,

    running_time: Mutex<RunningTime>,
}

#[derive(Debug, Default)]
struct Signal {
    state: SignalState,
    tick_count: TickCount,
}

/// Instructions for the generator thread.
#[derive(Debug, Default)]
struct Control {
    paused: bool,
    // Ticks left before pausing again, zero when free-running.
    steps: i32,
}

impl Timer {
    /// Creates a square-wave timer that ticks every `resolution`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroResolution`] if `resolution` is zero.
    pub fn new(resolution: Duration) -> Result<Arc<Self>> {
        Self::builder().resolution(resolution).build()
    }

    /// Starts configuring a timer.
    #[must_use]
    pub fn builder() -> TimerBuilder {
        TimerBuilder::new()
    }

    pub(crate) fn from_parts(resolution: Duration, policy: Box<dyn SignalPolicy>, thread_name: String, join_timeout: Duration) -> Self {
        Self {
            core: Arc::new(TimerCore {
                resolution,
                policy,
                active: AtomicBool::new(false),
                signal: RwLock::new(Signal::default()),
                tick: Mutex::new(()),
                tick_cv: Condvar::new(),
                control: Mutex::new(Control::default()),
                control_cv: Condvar::new(),
                running_time: Mutex::new(RunningTime::default()),
            }),
            thread_name,
            join_timeout,
            generator: Mutex::new(None),
            dependents: DependentRegistry::new(),
        }
    }

    /// Spawns the generator thread. The first tick fires one resolution after this call.
    ///
    /// A stopped timer can be started again; the tick count carries on from where it stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] if the timer is running, or [`Error::Spawn`] if the
    /// generator thread cannot be created.
    pub fn start(&self) -> Result<()> {
        let mut generator = self.generator.lock();

        if self
            .core
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::AlreadyActive);
        }

        self.core.running_time.lock().start(Instant::now());

        let shutdown = Arc::new(AtomicBool::new(false));
        let body = {
            let core = Arc::clone(&self.core);
            let shutdown = Arc::clone(&shutdown);
            move || core.generate(&shutdown)
        };

        match ManagedThread::spawn(self.thread_name.clone(), body) {
            Ok(thread) => {
                *generator = Some(Generator { shutdown, thread });
                info!(thread = %self.thread_name, resolution = ?self.core.resolution, "timer started");
                Ok(())
            }
            Err(e) => {
                self.core.active.store(false, Ordering::Release);
                self.core.running_time.lock().stop(Instant::now());
                Err(e)
            }
        }
    }

    /// Stops the generator thread and every live dependent, then waits for them to exit.
    ///
    /// Idempotent, and safe to call from any thread, including from inside a tick callback.
    /// Once it returns, the timer reports [`SignalState::HighImpedance`] (or
    /// [`SignalState::Undefined`] if it never ticked).
    ///
    /// # Errors
    ///
    /// Returns [`Error::JoinTimeout`] if a thread did not exit within the join timeout. The
    /// remaining threads are still stopped.
    pub fn stop(&self) -> Result<()> {
        let mut result = self.stop_generator();

        // Every dependent is asked first so that none waits for another's join.
        let dependents = self.dependents.live();
        for dependent in &dependents {
            dependent.request_stop();
        }

        for dependent in &dependents {
            if let Err(e) = dependent.stop() {
                result = result.and(Err(e));
            }
        }

        result
    }

    fn stop_generator(&self) -> Result<()> {
        let mut generator = self.generator.lock();

        let was_active = self.core.active.swap(false, Ordering::AcqRel);
        let run = generator.take();
        if let Some(run) = &run {
            // Set under the control lock so the generator cannot miss it between check and wait.
            let _control = self.core.control.lock();
            run.shutdown.store(true, Ordering::Release);
        }
        self.core.control_cv.notify_all();
        self.core.notify_waiters();

        let Some(Generator { thread, .. }) = run else {
            return Ok(());
        };

        let result = thread.join_within(self.join_timeout);
        if was_active {
            self.core.running_time.lock().stop(Instant::now());
            info!(thread = %self.thread_name, ticks = self.tick_count(), "timer stopped");
        }

        result
    }

    /// Suspends ticking after the tick in flight, if any, has fired.
    pub fn pause(&self) {
        {
            let mut control = self.core.control.lock();
            control.paused = true;
            control.steps = 0;
        }
        self.core.control_cv.notify_all();

        debug!(thread = %self.thread_name, "timer paused");
    }

    /// Returns to free-running. Same as `set_step_for(0)`.
    pub fn resume(&self) {
        self.set_step_for(0);
    }

    /// Lets exactly `steps` more ticks fire and then pauses again.
    ///
    /// A budget of zero or less clears any budget and resumes free-running.
    pub fn set_step_for(&self, steps: i32) {
        {
            let mut control = self.core.control.lock();
            control.steps = steps.max(0);
            control.paused = false;
        }
        self.core.control_cv.notify_all();

        if steps > 0 {
            debug!(thread = %self.thread_name, steps, "timer stepping");
        } else {
            debug!(thread = %self.thread_name, "timer resumed");
        }
    }

    /// Ticks left before the timer pauses again; zero when free-running.
    #[must_use]
    pub fn step_for(&self) -> i32 {
        self.core.control.lock().steps
    }

    /// Whether ticking is suspended by [`pause`][Self::pause] or an exhausted step budget.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.core.control.lock().paused
    }

    /// Whether the generator thread is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.core.active.load(Ordering::Acquire)
    }

    /// Interval between ticks.
    #[must_use]
    pub fn resolution(&self) -> Duration {
        self.core.resolution
    }

    /// Upper bound on how long stopping waits for each thread.
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        self.join_timeout
    }

    /// Ticks generated since the timer was created.
    #[must_use]
    pub fn tick_count(&self) -> TickCount {
        self.core.signal.read().tick_count
    }

    /// The current value of the clock line.
    #[must_use]
    pub fn signal_state(&self) -> SignalState {
        self.core.snapshot().0
    }

    /// Wall time spent running since the last start, excluding paused intervals.
    ///
    /// Zero if the timer never started; frozen once the timer stops.
    #[must_use]
    pub fn running_time(&self) -> Duration {
        self.core.running_time.lock().elapsed(Instant::now())
    }

    /// Acquires the lock to pass to [`wait_for_tick`][Self::wait_for_tick].
    #[must_use]
    pub fn tick_lock(&self) -> TickGuard<'_> {
        TickGuard(self.core.tick.lock())
    }

    /// Blocks until the tick count advances past its value on entry or the timer becomes
    /// inactive, then returns the signal state and the tick count.
    ///
    /// The lock is released while waiting and held again on return.
    #[cfg_attr(test, mutants::skip)] // Causes test timeout.
    pub fn wait_for_tick(&self, lock: &mut TickGuard<'_>) -> (SignalState, TickCount) {
        let observed = self.tick_count();

        loop {
            let (state, tick) = self.core.snapshot();
            if tick != observed || !self.is_active() {
                return (state, tick);
            }

            _ = self.core.tick_cv.wait_for(&mut lock.0, self.core.resolution);
        }
    }

    /// Blocks until the tick count exceeds `after`, regardless of whether the timer is active.
    ///
    /// Returns `None` once `cancelled` reports true. Whoever flips the condition behind
    /// `cancelled` must then call [`notify_waiters`][Self::notify_waiters].
    #[cfg_attr(test, mutants::skip)] // Causes test timeout.
    pub(crate) fn wait_for_tick_after(
        &self,
        lock: &mut TickGuard<'_>,
        after: TickCount,
        cancelled: impl Fn() -> bool,
    ) -> Option<(SignalState, TickCount)> {
        loop {
            let (state, tick) = self.core.snapshot();
            if tick > after {
                return Some((state, tick));
            }

            if cancelled() {
                return None;
            }

            _ = self.core.tick_cv.wait_for(&mut lock.0, self.core.resolution);
        }
    }

    /// Wakes every thread blocked in a tick wait.
    pub(crate) fn notify_waiters(&self) {
        self.core.notify_waiters();
    }

    /// Creates a dependent of type `T` bound to this timer.
    ///
    /// The timer keeps only a weak reference to the dependent, so the returned handle decides
    /// how long it lives.
    pub fn make_dependant<T, F, R>(self: &Arc<Self>, on_tick: F, args: T::Args) -> Arc<T>
    where
        T: FromBinding,
        F: Fn(SignalState, TickCount) -> R + Send + Sync + 'static,
        R: TickOutcome,
    {
        let binding = Binding::new(Arc::clone(self), OnSignalChange::new(on_tick));
        let dependent = Arc::new(T::from_binding(binding, args));

        let weak = Arc::downgrade(&dependent) as Weak<dyn Dependent>;
        self.dependents.bind(weak);
        debug!(thread = %self.thread_name, dependants = self.dependents.len(), "dependent bound");

        dependent
    }

    /// Creates a [`DependentWorker`] that runs `on_tick` once per observed tick.
    ///
    /// The worker does nothing until started.
    pub fn make_worker<F, R>(self: &Arc<Self>, on_tick: F) -> Arc<DependentWorker>
    where
        F: Fn(SignalState, TickCount) -> R + Send + Sync + 'static,
        R: TickOutcome,
    {
        self.make_dependant::<DependentWorker, _, _>(on_tick, ())
    }

    /// Number of live dependents bound to this timer.
    #[must_use]
    pub fn dependant_count(&self) -> usize {
        self.dependents.len()
    }

    /// The live dependents bound to this timer.
    #[must_use]
    pub fn dependants(&self) -> Vec<Arc<dyn Dependent>> {
        self.dependents.live()
    }

    /// Unbinds a dependent so that the timer no longer stops it. Returns `false` if it was not
    /// bound.
    pub fn remove_dependant<T: Dependent + ?Sized>(&self, dependent: &Arc<T>) -> bool {
        self.dependents.remove(dependent)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("thread_name", &self.thread_name)
            .field("resolution", &self.core.resolution)
            .field("active", &self.is_active())
            .field("tick_count", &self.tick_count())
            .field("dependents", &self.dependents)
            .finish_non_exhaustive()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if self.is_active() {
            warn!(thread = %self.thread_name, "timer dropped while active, stopping it");
        }

        if let Err(e) = self.stop() {
            error!(thread = %self.thread_name, error = %e, "failed to stop timer on drop");
        }
    }
}

impl TimerCore {
    /// Reads the signal state and tick count together.
    fn snapshot(&self) -> (SignalState, TickCount) {
        let signal = self.signal.read();

        let state = if signal.tick_count == 0 {
            SignalState::Undefined
        } else if self.active.load(Ordering::Acquire) {
            signal.state
        } else {
            SignalState::HighImpedance
        };

        (state, signal.tick_count)
    }

    fn tick(&self) {
        let next = self.signal.read().tick_count.wrapping_add(1);
        let state = self.policy.state_at(next);

        {
            let mut signal = self.signal.write();
            signal.tick_count = next;
            signal.state = state;
        }

        self.notify_waiters();
    }

    fn notify_waiters(&self) {
        let _guard = self.tick.lock();
        self.tick_cv.notify_all();
    }

    /// Body of the generator thread.
    #[cfg_attr(test, mutants::skip)] // Causes test timeout.
    fn generate(&self, shutdown: &AtomicBool) {
        let stopping = || shutdown.load(Ordering::Acquire);
        let mut next_due = Instant::now() + self.resolution;
        let mut control = self.control.lock();

        loop {
            if control.paused && !stopping() {
                self.running_time.lock().pause(Instant::now());
                while control.paused && !stopping() {
                    self.control_cv.wait(&mut control);
                }

                let now = Instant::now();
                self.running_time.lock().resume(now);
                next_due = now + self.resolution;
            }

            // Pausing does not interrupt this wait, so the tick in flight still fires.
            while !stopping() && Instant::now() < next_due {
                _ = self.control_cv.wait_until(&mut control, next_due);
            }

            if stopping() {
                break;
            }

            MutexGuard::unlocked(&mut control, || self.tick());

            if control.steps > 0 {
                control.steps -= 1;
                control.paused = control.steps == 0;
            }

            let now = Instant::now();
            next_due += self.resolution;
            if next_due < now {
                // Fell behind; skip the missed ticks instead of bursting through them.
                next_due = now;
            }
        }
    }
}
