// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use crate::{CallbackError, Result, SignalState, TickCount, Timer};

/// A unit of concurrent execution bound to a [`Timer`].
///
/// Dependents are created through [`Timer::make_dependant`], which hands out shared ownership
/// of the dependent while the timer keeps only a weak reference for bookkeeping. Dropping the
/// last strong reference stops the dependent.
pub trait Dependent: Send + Sync + 'static {
    /// Starts the dependent's thread. Starting a running dependent does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`][crate::Error::Spawn] if the thread cannot be created.
    fn start(&self) -> Result<()>;

    /// Stops the dependent and waits for its thread to exit. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JoinTimeout`][crate::Error::JoinTimeout] if the thread did not exit
    /// within the timer's join timeout.
    fn stop(&self) -> Result<()>;

    /// Asks the dependent to stop without waiting for its thread.
    ///
    /// [`Timer::stop`] calls this on every dependent before stopping any of them. A later
    /// [`stop`][Self::stop] still has to be called. Does nothing unless overridden.
    fn request_stop(&self) {}

    /// Whether the dependent's thread is running.
    fn running(&self) -> bool;
}

/// Constructs a [`Dependent`] from the [`Binding`] produced by [`Timer::make_dependant`].
///
/// A [`Binding`] can only be created by a timer, so every dependent is bound and registered
/// from the moment it exists.
pub trait FromBinding: Dependent + Sized {
    /// Extra constructor arguments forwarded by [`Timer::make_dependant`].
    type Args;

    /// Creates the dependent.
    fn from_binding(binding: Binding, args: Self::Args) -> Self;
}

/// Converts the value returned by a tick callback into a success or failure.
///
/// Implemented for `()` and for `Result<(), E>` with any error convertible into
/// [`CallbackError`], so callbacks can be written either way.
pub trait TickOutcome {
    /// Converts into a result.
    ///
    /// # Errors
    ///
    /// Returns the callback's error, if it reported one.
    fn into_result(self) -> std::result::Result<(), CallbackError>;
}

impl TickOutcome for () {
    fn into_result(self) -> std::result::Result<(), CallbackError> {
        Ok(())
    }
}

impl<E> TickOutcome for std::result::Result<(), E>
where
    E: Into<CallbackError>,
{
    fn into_result(self) -> std::result::Result<(), CallbackError> {
        self.map_err(Into::into)
    }
}

type TickFn = dyn Fn(SignalState, TickCount) -> std::result::Result<(), CallbackError> + Send + Sync;

/// The per-tick action of a dependent, invoked with the observed signal state and tick count.
///
/// Cloning is inexpensive and every clone invokes the same closure.
#[derive(Clone)]
pub struct OnSignalChange(Arc<TickFn>);

impl OnSignalChange {
    /// Wraps a callback.
    pub fn new<F, R>(on_tick: F) -> Self
    where
        F: Fn(SignalState, TickCount) -> R + Send + Sync + 'static,
        R: TickOutcome,
    {
        Self(Arc::new(move |state, tick| on_tick(state, tick).into_result()))
    }

    /// Invokes the callback.
    ///
    /// # Errors
    ///
    /// Returns whatever error the callback reported.
    pub fn call(&self, state: SignalState, tick: TickCount) -> std::result::Result<(), CallbackError> {
        (self.0)(state, tick)
    }
}

impl fmt::Debug for OnSignalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnSignalChange").finish_non_exhaustive()
    }
}

/// Everything a dependent needs to attach to its timer: shared ownership of the timer and the
/// callback to run on each tick.
#[derive(Debug)]
pub struct Binding {
    timer: Arc<Timer>,
    on_tick: OnSignalChange,
}

impl Binding {
    pub(crate) const fn new(timer: Arc<Timer>, on_tick: OnSignalChange) -> Self {
        Self { timer, on_tick }
    }

    /// The timer being bound to.
    #[must_use]
    pub const fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// Replaces the callback, typically by wrapping the original one.
    #[must_use]
    pub fn map_on_tick(self, f: impl FnOnce(OnSignalChange) -> OnSignalChange) -> Self {
        Self {
            timer: self.timer,
            on_tick: f(self.on_tick),
        }
    }

    /// Splits the binding into the timer and the callback.
    #[must_use]
    pub fn into_parts(self) -> (Arc<Timer>, OnSignalChange) {
        (self.timer, self.on_tick)
    }
}
