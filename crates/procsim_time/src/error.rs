// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use thiserror::Error;

/// The result type for fallible lifecycle operations of the timing engine.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type returned by a dependent's tick callback.
///
/// Callback errors never cross into the [`Timer`][crate::Timer] or into other dependents.
/// They are caught at the worker loop boundary and logged.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error reported synchronously by the timing engine.
///
/// Only lifecycle misuse and environment faults surface through this type. Failures inside
/// tick callbacks are isolated to the dependent that raised them.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// [`Timer::start`][crate::Timer::start] was called on a timer whose generator is already running.
    #[error("timer is already active")]
    AlreadyActive,

    /// A timer was configured with a zero resolution.
    #[error("timer resolution must be greater than zero")]
    ZeroResolution,

    /// A clock descriptor declared a period shorter than [`MINIMUM_CLOCK_PERIOD`][crate::MINIMUM_CLOCK_PERIOD].
    #[error("clock period {period:?} is shorter than the minimum of {minimum:?}")]
    PeriodTooShort {
        /// The rejected period.
        period: Duration,
        /// The smallest accepted period.
        minimum: Duration,
    },

    /// A clock cycle was split into zero ticks, or into more ticks than its period allows.
    #[error("a clock period of {period:?} cannot be split into {ticks_per_cycle} ticks")]
    InvalidTicksPerCycle {
        /// The clock period being subdivided.
        period: Duration,
        /// The requested number of ticks per cycle.
        ticks_per_cycle: u32,
    },

    /// The operating system refused to create a thread.
    #[error("failed to spawn thread '{thread}'")]
    Spawn {
        /// Name of the thread that could not be created.
        thread: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A thread did not exit within the bounded stop interval.
    ///
    /// Every blocking wait in the engine is bounded by the timer resolution, so this indicates
    /// that a callback blocked indefinitely or the liveness guarantees were otherwise violated.
    #[error("thread '{thread}' did not stop within {timeout:?}")]
    JoinTimeout {
        /// Name of the thread that failed to stop.
        thread: String,
        /// How long the stop waited before giving up.
        timeout: Duration,
    },
}

impl Error {
    pub(crate) fn spawn(thread: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            thread: thread.into(),
            source,
        }
    }

    pub(crate) fn join_timeout(thread: impl Into<String>, timeout: Duration) -> Self {
        Self::JoinTimeout {
            thread: thread.into(),
            timeout,
        }
    }
}
