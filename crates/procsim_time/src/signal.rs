// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use thiserror::Error;

/// Number of ticks a [`Timer`][crate::Timer] has generated since construction.
pub type TickCount = u64;

/// The instantaneous value of a simulated clock line.
///
/// Modeled on four-valued digital logic: besides the two driven levels, a line may be
/// undriven ([`HighImpedance`][Self::HighImpedance]) or carry an unknown value
/// ([`Undefined`][Self::Undefined]).
///
/// A [`Timer`][crate::Timer] reports `Undefined` until its first tick, `HighImpedance`
/// whenever it is not active after having ticked, and otherwise whatever its
/// [`SignalPolicy`] dictates.
///
/// # Examples
///
/// ```
/// use procsim_time::SignalState;
///
/// assert_eq!(SignalState::High.level(), 5);
/// assert_eq!(SignalState::HighImpedance.to_string(), "Z");
/// assert_eq!("0".parse::<SignalState>().unwrap(), SignalState::Low);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignalState {
    /// Unknown value, written `X`.
    #[default]
    Undefined,
    /// Undriven line, written `Z`.
    HighImpedance,
    /// Logic low, written `0`.
    Low,
    /// Logic high, written `1`.
    High,
}

impl SignalState {
    /// Voltage-like level used by the rest of the simulator to compare states numerically.
    ///
    /// `Undefined` and `HighImpedance` sit at the extremes of the `i16` range so that they
    /// never compare equal to a driven level.
    #[must_use]
    pub const fn level(self) -> i16 {
        match self {
            Self::Undefined => i16::MIN,
            Self::HighImpedance => i16::MAX,
            Self::Low => 0,
            Self::High => 5,
        }
    }

    /// Maps a level produced by [`level`][Self::level] back to a state.
    #[must_use]
    pub const fn from_level(level: i16) -> Option<Self> {
        match level {
            i16::MIN => Some(Self::Undefined),
            i16::MAX => Some(Self::HighImpedance),
            0 => Some(Self::Low),
            5 => Some(Self::High),
            _ => None,
        }
    }

    /// Returns `true` for the two driven levels.
    #[must_use]
    pub const fn is_driven(self) -> bool {
        matches!(self, Self::Low | Self::High)
    }

    /// The opposite driven level. Undriven and unknown states are returned unchanged.
    #[must_use]
    pub const fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
            other => other,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Undefined => "X",
            Self::HighImpedance => "Z",
            Self::Low => "0",
            Self::High => "1",
        }
    }
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Returned when a string is not one of `X`, `Z`, `0` or `1`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a signal state, expected one of X, Z, 0, 1")]
pub struct ParseSignalStateError(String);

impl FromStr for SignalState {
    type Err = ParseSignalStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" | "x" => Ok(Self::Undefined),
            "Z" | "z" => Ok(Self::HighImpedance),
            "0" => Ok(Self::Low),
            "1" => Ok(Self::High),
            other => Err(ParseSignalStateError(other.to_owned())),
        }
    }
}

#[cfg(feature = "serde")]
impl serde_core::Serialize for SignalState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde_core::Serializer,
    {
        serializer.serialize_str(self.symbol())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde_core::Deserialize<'de> for SignalState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde_core::Deserializer<'de>,
    {
        let symbol: String = serde_core::Deserialize::deserialize(deserializer)?;
        symbol.parse().map_err(serde_core::de::Error::custom)
    }
}

/// Decides which driven level a timer reports on each tick.
///
/// The policy is consulted once per generated tick with the new tick count (always `>= 1`)
/// while the timer is active. The engine itself applies `Undefined` before the first tick and
/// `HighImpedance` while inactive, so policies only describe the shape of the running clock.
///
/// Any `Fn(TickCount) -> SignalState` closure is a policy:
///
/// ```
/// use std::time::Duration;
///
/// use procsim_time::{SignalState, TickCount, Timer};
///
/// // Stays high for the first eight ticks, then drops low for good.
/// let timer = Timer::builder()
///     .resolution(Duration::from_millis(1))
///     .signal_policy(|tick: TickCount| if tick <= 8 { SignalState::High } else { SignalState::Low })
///     .build()
///     .unwrap();
/// # drop(timer);
/// ```
pub trait SignalPolicy: Send + Sync + 'static {
    /// The state the clock line takes once `tick` has been generated.
    fn state_at(&self, tick: TickCount) -> SignalState;
}

impl<F> SignalPolicy for F
where
    F: Fn(TickCount) -> SignalState + Send + Sync + 'static,
{
    fn state_at(&self, tick: TickCount) -> SignalState {
        self(tick)
    }
}

/// The default policy: a 50% duty square wave that toggles on every tick.
///
/// Odd ticks are high and even ticks are low, so the first tick is a rising edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SquareWave;

impl SignalPolicy for SquareWave {
    fn state_at(&self, tick: TickCount) -> SignalState {
        if tick % 2 == 1 { SignalState::High } else { SignalState::Low }
    }
}

/// A periodic pulse shape measured in ticks.
///
/// Each cycle spans `cycle` ticks. The first `high_ticks` ticks of every cycle are high and
/// the rest are low; an inverted train swaps the two levels.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU64;
///
/// use procsim_time::{PulseTrain, SignalPolicy, SignalState};
///
/// let pulse = PulseTrain::new(NonZeroU64::new(4).unwrap(), 1);
///
/// let shape: Vec<_> = (1..=8).map(|tick| pulse.state_at(tick)).collect();
/// assert_eq!(shape[0], SignalState::High);
/// assert_eq!(&shape[1..4], &[SignalState::Low; 3]);
/// assert_eq!(shape[4], SignalState::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTrain {
    cycle: NonZeroU64,
    high_ticks: u64,
    inverted: bool,
}

impl PulseTrain {
    /// Creates a pulse train whose cycles are `cycle` ticks long with `high_ticks` high ticks each.
    ///
    /// `high_ticks` is clamped to the cycle length.
    #[must_use]
    pub fn new(cycle: NonZeroU64, high_ticks: u64) -> Self {
        Self {
            cycle,
            high_ticks: high_ticks.min(cycle.get()),
            inverted: false,
        }
    }

    /// Swaps the high and low portions of every cycle.
    #[must_use]
    pub const fn inverted(mut self) -> Self {
        self.inverted = !self.inverted;
        self
    }

    /// Length of one cycle in ticks.
    #[must_use]
    pub const fn cycle(&self) -> NonZeroU64 {
        self.cycle
    }

    /// Number of ticks per cycle spent in the (non-inverted) high level.
    #[must_use]
    pub const fn high_ticks(&self) -> u64 {
        self.high_ticks
    }
}

impl SignalPolicy for PulseTrain {
    fn state_at(&self, tick: TickCount) -> SignalState {
        let position = tick.saturating_sub(1) % self.cycle.get();
        let state = if position < self.high_ticks {
            SignalState::High
        } else {
            SignalState::Low
        };

        if self.inverted { state.inverted() } else { state }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    fn shape(policy: &impl SignalPolicy, ticks: TickCount) -> String {
        (1..=ticks).map(|tick| policy.state_at(tick).to_string()).collect()
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(SignalState: Send, Sync, Copy);
        static_assertions::assert_impl_all!(PulseTrain: SignalPolicy);
    }

    #[test]
    fn default_is_undefined() {
        assert_eq!(SignalState::default(), SignalState::Undefined);
    }

    #[test]
    fn levels_round_trip() {
        for state in [
            SignalState::Undefined,
            SignalState::HighImpedance,
            SignalState::Low,
            SignalState::High,
        ] {
            assert_eq!(SignalState::from_level(state.level()), Some(state));
        }

        assert_eq!(SignalState::from_level(3), None);
    }

    #[test]
    fn undriven_states_do_not_invert() {
        assert_eq!(SignalState::Undefined.inverted(), SignalState::Undefined);
        assert_eq!(SignalState::HighImpedance.inverted(), SignalState::HighImpedance);
        assert!(!SignalState::HighImpedance.is_driven());
        assert!(SignalState::Low.is_driven());
    }

    #[test]
    fn parse_rejects_unknown_symbols() {
        let error = "H".parse::<SignalState>().unwrap_err();

        assert_eq!(error.to_string(), "'H' is not a signal state, expected one of X, Z, 0, 1");
        assert_eq!("z".parse::<SignalState>().unwrap(), SignalState::HighImpedance);
    }

    #[test]
    fn square_wave_alternates() {
        assert_eq!(shape(&SquareWave, 6), "101010");
    }

    #[test]
    fn pulse_train_shapes() {
        let cycle = NonZeroU64::new(4).unwrap();

        assert_eq!(shape(&PulseTrain::new(cycle, 2), 8), "11001100");
        assert_eq!(shape(&PulseTrain::new(cycle, 1), 8), "10001000");
        assert_eq!(shape(&PulseTrain::new(cycle, 1).inverted(), 8), "01110111");
    }

    #[test]
    fn pulse_train_clamps_high_ticks() {
        let train = PulseTrain::new(NonZeroU64::new(3).unwrap(), 10);

        assert_eq!(train.high_ticks(), 3);
        assert_eq!(shape(&train, 3), "111");
    }

    #[test]
    fn closures_are_policies() {
        let policy = |tick: TickCount| if tick > 2 { SignalState::Low } else { SignalState::High };

        assert_eq!(shape(&policy, 4), "1100");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_symbols() {
        let serialized = serde_json::to_string(&SignalState::HighImpedance).unwrap();
        assert_eq!(serialized, "\"Z\"");

        let deserialized: SignalState = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(deserialized, SignalState::High);

        serde_json::from_str::<SignalState>("\"Q\"").unwrap_err();
    }
}
