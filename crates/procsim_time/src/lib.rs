// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::unchecked_time_subtraction,
        reason = "allow these lints in tests to improve the readability of the tests"
    )
)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The clock that drives a processor simulation.
//!
//! A [`Timer`] owns a generator thread that ticks at a fixed resolution. Every tick advances
//! the tick count, recomputes the simulated clock line ([`SignalState`]) and wakes every
//! thread waiting for it. Simulated components run on their own threads as
//! [`Dependent`]s of the timer and execute one step of work per observed tick.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::time::Duration;
//!
//! use procsim_time::{Dependent, SignalState, Timer};
//!
//! let timer = Timer::new(Duration::from_millis(1))?;
//!
//! let rising_edges = Arc::new(AtomicU64::new(0));
//! let worker = timer.make_worker({
//!     let rising_edges = Arc::clone(&rising_edges);
//!     move |state, _tick| {
//!         if state == SignalState::High {
//!             rising_edges.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//! });
//!
//! worker.start()?;
//! timer.start()?;
//! std::thread::sleep(Duration::from_millis(20));
//!
//! // Stopping the timer also stops its workers.
//! timer.stop()?;
//! assert!(!worker.running());
//! assert_eq!(timer.signal_state(), SignalState::HighImpedance);
//! # Ok::<(), procsim_time::Error>(())
//! ```
//!
//! # Overview
//!
//! - [`Timer`] - Generates ticks and tracks the dependents bound to it. Supports pausing and
//!   single stepping through [`Timer::pause`] and [`Timer::set_step_for`].
//! - [`TimerBuilder`] - Configures a timer, either directly or from a [`ClockDescriptor`].
//! - [`SignalPolicy`] - Shapes the clock line: [`SquareWave`], [`PulseTrain`] or any closure.
//! - [`DependentWorker`] - Runs a callback once per observed tick.
//! - [`ClockDivider`] - Runs a callback at a fraction of the timer's rate.
//! - [`Dependent`] and [`FromBinding`] - Plug custom dependents into
//!   [`Timer::make_dependant`].
//!
//! The timer only holds weak references to its dependents; whoever created a dependent
//! decides how long it lives, and dropping it stops its thread.
//!
//! # Logging
//!
//! Lifecycle events and callback failures are reported through [`tracing`]. The crate never
//! installs a subscriber.
//!
//! # Features
//!
//! - `serde` - Serialization of [`SignalState`] and [`PulseType`] through their textual form.

mod builder;
mod clock;
mod dependent;
mod divider;
mod error;
mod registry;
mod running_time;
mod signal;
mod thread;
mod timer;
mod worker;

pub use builder::TimerBuilder;
pub use clock::{ClockDescriptor, DEFAULT_TICKS_PER_CYCLE, MINIMUM_CLOCK_PERIOD, ParsePulseTypeError, PulseType};
pub use dependent::{Binding, Dependent, FromBinding, OnSignalChange, TickOutcome};
pub use divider::ClockDivider;
pub use error::{CallbackError, Error, Result};
pub use signal::{ParseSignalStateError, PulseTrain, SignalPolicy, SignalState, SquareWave, TickCount};
pub use timer::{TickGuard, Timer};
pub use worker::DependentWorker;
