// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring timers.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::{ClockDescriptor, DEFAULT_TICKS_PER_CYCLE, Error, Result, SignalPolicy, SquareWave, Timer};

const DEFAULT_THREAD_NAME: &str = "procsim-timer";
const MINIMUM_JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT_RESOLUTIONS: u32 = 16;

/// Builder for configuring a [`Timer`].
///
/// Either [`resolution`][Self::resolution] or [`clock`][Self::clock] must be set. Settings
/// made explicitly take precedence over the ones derived from a clock descriptor, regardless
/// of the order in which they are made.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use procsim_time::{ClockDescriptor, PulseType, Timer};
///
/// let clock = ClockDescriptor::new(Duration::from_millis(2), PulseType::Pulse)?.with_name("bus");
/// let timer = Timer::builder().clock(&clock).build()?;
///
/// assert_eq!(timer.resolution(), Duration::from_millis(1));
/// # Ok::<(), procsim_time::Error>(())
/// ```
#[must_use]
pub struct TimerBuilder {
    resolution: Option<Duration>,
    policy: Option<Box<dyn SignalPolicy>>,
    thread_name: Option<String>,
    join_timeout: Option<Duration>,
    clock: Option<(ClockDescriptor, NonZeroU32)>,
}

impl Default for TimerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerBuilder {
    /// Creates a builder with default settings: a [`SquareWave`] policy and no resolution.
    pub fn new() -> Self {
        Self {
            resolution: None,
            policy: None,
            thread_name: None,
            join_timeout: None,
            clock: None,
        }
    }

    /// Sets the interval between ticks.
    pub const fn resolution(mut self, resolution: Duration) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Sets the policy that maps tick counts to signal states.
    pub fn signal_policy(mut self, policy: impl SignalPolicy) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Names the generator thread.
    ///
    /// Defaults to `procsim-timer`, suffixed with the clock name when built from a named
    /// clock descriptor.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Sets how long stopping waits for each thread to exit.
    ///
    /// Defaults to sixteen resolutions, but no less than one second.
    pub const fn join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = Some(timeout);
        self
    }

    /// Derives the resolution, signal policy and thread name from a clock descriptor, rendering
    /// each clock cycle with [`DEFAULT_TICKS_PER_CYCLE`] ticks.
    pub fn clock(self, clock: &ClockDescriptor) -> Self {
        self.clock_with_ticks(clock, DEFAULT_TICKS_PER_CYCLE)
    }

    /// Derives the resolution, signal policy and thread name from a clock descriptor, rendering
    /// each clock cycle with `ticks_per_cycle` ticks.
    pub fn clock_with_ticks(mut self, clock: &ClockDescriptor, ticks_per_cycle: NonZeroU32) -> Self {
        self.clock = Some((clock.clone(), ticks_per_cycle));
        self
    }

    /// Creates the timer. The timer is not started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroResolution`] if no resolution was configured or it is zero, and
    /// [`Error::InvalidTicksPerCycle`] if the clock period cannot be split into the requested
    /// ticks.
    pub fn build(self) -> Result<Arc<Timer>> {
        let (clock_resolution, clock_policy, clock_name) = match &self.clock {
            Some((clock, ticks_per_cycle)) => (
                Some(clock.tick_resolution(*ticks_per_cycle)?),
                Some(clock.pulse_type().policy(*ticks_per_cycle)),
                clock.name().map(|name| format!("{DEFAULT_THREAD_NAME}-{name}")),
            ),
            None => (None, None, None),
        };

        let resolution = self.resolution.or(clock_resolution).ok_or(Error::ZeroResolution)?;
        if resolution.is_zero() {
            return Err(Error::ZeroResolution);
        }

        let policy = self
            .policy
            .or_else(|| clock_policy.map(|policy| Box::new(policy) as Box<dyn SignalPolicy>))
            .unwrap_or_else(|| Box::new(SquareWave));

        let thread_name = self
            .thread_name
            .or(clock_name)
            .unwrap_or_else(|| DEFAULT_THREAD_NAME.to_owned());

        let join_timeout = self.join_timeout.unwrap_or_else(|| {
            resolution
                .saturating_mul(JOIN_TIMEOUT_RESOLUTIONS)
                .max(MINIMUM_JOIN_TIMEOUT)
        });

        Ok(Arc::new(Timer::from_parts(resolution, policy, thread_name, join_timeout)))
    }
}

impl fmt::Debug for TimerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerBuilder")
            .field("resolution", &self.resolution)
            .field("custom_policy", &self.policy.is_some())
            .field("thread_name", &self.thread_name)
            .field("join_timeout", &self.join_timeout)
            .field("clock", &self.clock)
            .finish()
    }
}
