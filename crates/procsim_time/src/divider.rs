// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Binding, Dependent, DependentWorker, FromBinding, OnSignalChange, Result, Timer};

/// A dependent that runs its callback at a fraction of its timer's rate.
///
/// The callback runs at most once per `divisor` ticks, on the first tick observed in each new
/// period, which models a component clocked slower than the timer that drives it.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU64;
/// use std::time::Duration;
///
/// use procsim_time::{ClockDivider, Dependent, Timer};
///
/// let timer = Timer::new(Duration::from_millis(1))?;
/// let divisor = NonZeroU64::new(4).unwrap();
/// let divider = timer.make_dependant::<ClockDivider, _, _>(|_, tick| println!("slow tick {tick}"), divisor);
///
/// assert_eq!(divider.divisor(), divisor);
/// # Ok::<(), procsim_time::Error>(())
/// ```
#[derive(Debug)]
pub struct ClockDivider {
    worker: DependentWorker,
    divisor: NonZeroU64,
}

impl ClockDivider {
    /// Number of timer ticks per callback.
    #[must_use]
    pub const fn divisor(&self) -> NonZeroU64 {
        self.divisor
    }

    /// The timer this divider is bound to.
    #[must_use]
    pub const fn timer(&self) -> &Arc<Timer> {
        self.worker.timer()
    }
}

impl FromBinding for ClockDivider {
    type Args = NonZeroU64;

    fn from_binding(binding: Binding, divisor: NonZeroU64) -> Self {
        let last_period = Arc::new(AtomicU64::new(binding.timer().tick_count() / divisor));

        let binding = binding.map_on_tick(|on_tick| {
            OnSignalChange::new(move |state, tick| {
                let period = tick / divisor;
                if last_period.fetch_max(period, Ordering::AcqRel) < period {
                    on_tick.call(state, tick)
                } else {
                    Ok(())
                }
            })
        });

        Self {
            worker: DependentWorker::from_binding(binding, ()),
            divisor,
        }
    }
}

impl Dependent for ClockDivider {
    fn start(&self) -> Result<()> {
        self.worker.start()
    }

    fn stop(&self) -> Result<()> {
        self.worker.stop()
    }

    fn request_stop(&self) {
        self.worker.request_stop();
    }

    fn running(&self) -> bool {
        self.worker.running()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::SignalState;

    fn divisor(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(ClockDivider: Send, Sync, Dependent);
    }

    #[test]
    fn forwards_first_tick_of_each_period() {
        let timer = Timer::new(Duration::from_millis(1)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let divider = timer.make_dependant::<ClockDivider, _, _>(
            {
                let seen = Arc::clone(&seen);
                move |_, tick| seen.lock().unwrap().push(tick)
            },
            divisor(3),
        );

        for tick in [1, 2, 3, 4, 5, 7, 8, 13] {
            divider.worker.on_tick().call(SignalState::High, tick).unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![3, 7, 13]);
        assert_eq!(divider.divisor(), divisor(3));
        assert!(Arc::ptr_eq(divider.timer(), &timer));
    }

    #[test]
    fn divisor_of_one_forwards_every_tick() {
        let timer = Timer::new(Duration::from_millis(1)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let divider = timer.make_dependant::<ClockDivider, _, _>(
            {
                let seen = Arc::clone(&seen);
                move |_, tick| seen.lock().unwrap().push(tick)
            },
            divisor(1),
        );

        for tick in 1..=4 {
            divider.worker.on_tick().call(SignalState::Low, tick).unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    }
}
