// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::{Error, PulseTrain, Result};

/// The shortest clock period a [`ClockDescriptor`] accepts.
pub const MINIMUM_CLOCK_PERIOD: Duration = Duration::from_micros(1);

/// Number of timer ticks used to represent one clock cycle when none is configured.
///
/// Two ticks per cycle give every pulse shape one high and one low half.
pub const DEFAULT_TICKS_PER_CYCLE: NonZeroU32 = NonZeroU32::MIN.saturating_add(1);

/// The waveform a configured clock produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PulseType {
    /// High for the first half of every cycle, low for the second.
    #[default]
    Square,
    /// A single high tick at the start of every cycle.
    Pulse,
    /// A single low tick at the start of every cycle.
    InvertedPulse,
}

impl PulseType {
    /// The configuration name of this pulse type, as used by clock definitions.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Square => "SQUARE",
            Self::Pulse => "PULSE",
            Self::InvertedPulse => "INV_PULSE",
        }
    }

    /// Builds the tick-level signal shape for a cycle made of `ticks_per_cycle` ticks.
    #[must_use]
    pub fn policy(self, ticks_per_cycle: NonZeroU32) -> PulseTrain {
        let cycle = NonZeroU64::from(ticks_per_cycle);

        match self {
            Self::Square => PulseTrain::new(cycle, cycle.get().div_ceil(2)),
            Self::Pulse => PulseTrain::new(cycle, 1),
            Self::InvertedPulse => PulseTrain::new(cycle, 1).inverted(),
        }
    }
}

impl fmt::Display for PulseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PulseType::{}", self.name())
    }
}

/// Returned when a string does not name a [`PulseType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a pulse type, expected one of SQUARE, PULSE, INV_PULSE")]
pub struct ParsePulseTypeError(String);

impl FromStr for PulseType {
    type Err = ParsePulseTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim();
        let name = name.strip_prefix("PulseType::").unwrap_or(name);

        match name {
            "SQUARE" => Ok(Self::Square),
            "PULSE" => Ok(Self::Pulse),
            "INV_PULSE" => Ok(Self::InvertedPulse),
            other => Err(ParsePulseTypeError(other.to_owned())),
        }
    }
}

#[cfg(feature = "serde")]
impl serde_core::Serialize for PulseType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde_core::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde_core::Deserialize<'de> for PulseType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde_core::Deserializer<'de>,
    {
        let name: String = serde_core::Deserialize::deserialize(deserializer)?;
        name.parse().map_err(serde_core::de::Error::custom)
    }
}

/// A clock as declared by the processor configuration.
///
/// Descriptors arrive from the configuration layer already validated; the timing engine only
/// reads them to pick a timer resolution and a [`SignalPolicy`][crate::SignalPolicy]. See
/// [`TimerBuilder::clock`][crate::TimerBuilder::clock].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use procsim_time::{ClockDescriptor, PulseType};
///
/// let clock = ClockDescriptor::new(Duration::from_millis(2), PulseType::Square)?
///     .with_name("cpu");
///
/// assert_eq!(clock.name(), Some("cpu"));
/// assert_eq!(clock.period(), Duration::from_millis(2));
/// # Ok::<(), procsim_time::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClockDescriptor {
    name: Option<String>,
    period: Duration,
    pulse_type: PulseType,
}

impl ClockDescriptor {
    /// Creates an unnamed clock descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeriodTooShort`] if `period` is below [`MINIMUM_CLOCK_PERIOD`].
    pub fn new(period: Duration, pulse_type: PulseType) -> Result<Self> {
        if period < MINIMUM_CLOCK_PERIOD {
            return Err(Error::PeriodTooShort {
                period,
                minimum: MINIMUM_CLOCK_PERIOD,
            });
        }

        Ok(Self {
            name: None,
            period,
            pulse_type,
        })
    }

    /// Names the clock.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The clock name, if one was declared.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Duration of one full clock cycle.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// The waveform of the clock.
    #[must_use]
    pub const fn pulse_type(&self) -> PulseType {
        self.pulse_type
    }

    /// Timer resolution needed to render one cycle with `ticks_per_cycle` ticks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTicksPerCycle`] if the period is too short to be split
    /// into that many non-zero ticks.
    pub fn tick_resolution(&self, ticks_per_cycle: NonZeroU32) -> Result<Duration> {
        let resolution = self.period / ticks_per_cycle.get();

        if resolution.is_zero() {
            return Err(Error::InvalidTicksPerCycle {
                period: self.period,
                ticks_per_cycle: ticks_per_cycle.get(),
            });
        }

        Ok(resolution)
    }
}

impl fmt::Display for ClockDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Clock{{name: {}, period: {:?}, pulse: {}}}",
            self.name().unwrap_or("<anonymous>"),
            self.period,
            self.pulse_type
        )
    }
}
