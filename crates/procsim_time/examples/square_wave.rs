// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! This example drives two components and a slower divided clock from one timer, then
//! single-steps the timer before stopping it.

use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use procsim_time::{ClockDescriptor, ClockDivider, Dependent, PulseType, SignalState, Timer};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    // A 20ms square clock rendered with two ticks per cycle ticks every 10ms.
    let clock = ClockDescriptor::new(Duration::from_millis(20), PulseType::Square)?.with_name("cpu");
    let timer = Timer::builder().clock(&clock).build()?;
    println!("{clock} ticks every {:?}", timer.resolution());

    // The fetch unit reacts to every rising edge.
    let fetched = Arc::new(AtomicU64::new(0));
    let fetch = timer.make_worker({
        let fetched = Arc::clone(&fetched);
        move |state, tick| {
            if state == SignalState::High {
                let count = fetched.fetch_add(1, Ordering::Relaxed) + 1;
                println!("fetch #{count} on tick {tick}");
            }
        }
    });

    // The bus runs at a quarter of the timer rate and is busy every other time it runs.
    let bus = timer.make_dependant::<ClockDivider, _, _>(
        |state, tick| {
            if tick % 8 == 4 {
                return Err(format!("bus busy on tick {tick}"));
            }
            println!("bus transfer on tick {tick} ({state})");
            Ok(())
        },
        NonZeroU64::new(4).ok_or_else(|| anyhow::anyhow!("divisor must not be zero"))?,
    );

    fetch.start()?;
    bus.start()?;
    timer.start()?;
    thread::sleep(Duration::from_millis(200));

    // Freeze the simulation and advance it three ticks at a time.
    timer.pause();
    for _ in 0..3 {
        let before = timer.tick_count();
        timer.set_step_for(3);
        thread::sleep(Duration::from_millis(100));
        println!("stepped from tick {before} to tick {}", timer.tick_count());
    }

    timer.stop()?;
    println!(
        "stopped after {} ticks and {:?} of running time, {} fetches, signal is {}",
        timer.tick_count(),
        timer.running_time(),
        fetched.load(Ordering::Relaxed),
        timer.signal_state()
    );

    Ok(())
}
