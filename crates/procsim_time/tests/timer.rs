// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "test code")]

//! Timing, pausing and lifecycle behavior of `Timer`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use procsim_time::{Dependent, Error, SignalState, TickCount, Timer};
use testing_aids::{TEST_TIMEOUT, eventually, execute_or_abandon, log_to_stdout};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn never_started_timer_is_undefined() {
    let timer = Timer::new(ms(10)).unwrap();

    assert_eq!(timer.tick_count(), 0);
    assert_eq!(timer.signal_state(), SignalState::Undefined);
    assert_eq!(timer.running_time(), Duration::ZERO);
}

#[test]
fn ticks_are_never_early() {
    log_to_stdout();

    execute_or_abandon(|| {
        let resolution = ms(5);
        let timer = Timer::new(resolution).unwrap();

        let started = Instant::now();
        timer.start().unwrap();
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() >= 5));
        let elapsed = started.elapsed();
        let ticks = timer.tick_count();
        timer.stop().unwrap();

        let ticks = u32::try_from(ticks).unwrap();
        assert!(elapsed >= resolution * (ticks - 1), "{ticks} ticks after {elapsed:?}");
    })
    .unwrap();
}

#[test]
fn square_wave_over_a_hundred_milliseconds() {
    log_to_stdout();

    execute_or_abandon(|| {
        let timer = Timer::new(ms(10)).unwrap();
        let observed = Arc::new(Mutex::new(Vec::<(SignalState, TickCount)>::new()));
        let worker = timer.make_worker({
            let observed = Arc::clone(&observed);
            move |state, tick| observed.lock().unwrap().push((state, tick))
        });
        worker.start().unwrap();

        let started = Instant::now();
        timer.start().unwrap();
        thread::sleep(ms(100));
        timer.stop().unwrap();
        let elapsed = started.elapsed();

        let ticks = timer.tick_count();
        assert!((8..=12).contains(&ticks), "{ticks} ticks in {elapsed:?}");
        assert!(u128::from(ticks) <= elapsed.as_millis() / 10, "{ticks} ticks in {elapsed:?}");
        assert_eq!(timer.signal_state(), SignalState::HighImpedance);

        let observed = observed.lock().unwrap();
        assert!(!observed.is_empty());
        for &(state, tick) in observed.iter() {
            let expected = if tick % 2 == 1 { SignalState::High } else { SignalState::Low };
            assert!(
                state == expected || state == SignalState::HighImpedance,
                "tick {tick} observed as {state}"
            );
        }

        let driven: Vec<_> = observed.iter().filter(|(state, _)| state.is_driven()).collect();
        assert!(driven.len() >= 2, "{observed:?}");
        for pair in driven.windows(2) {
            let ((earlier_state, earlier), (later_state, later)) = (pair[0], pair[1]);
            assert_eq!(
                earlier_state != later_state,
                (later - earlier) % 2 == 1,
                "{earlier_state} at tick {earlier} then {later_state} at tick {later}"
            );
        }
    })
    .unwrap();
}

#[test]
fn start_twice_is_rejected() {
    let timer = Timer::new(ms(10)).unwrap();

    timer.start().unwrap();
    assert!(matches!(timer.start(), Err(Error::AlreadyActive)));
    assert!(timer.is_active());

    timer.stop().unwrap();
}

#[test]
fn stop_is_idempotent_and_bounded() {
    execute_or_abandon(|| {
        let timer = Timer::new(ms(5)).unwrap();
        let workers: Vec<_> = (0..16).map(|_| timer.make_worker(|_, _| ())).collect();
        for worker in &workers {
            worker.start().unwrap();
        }

        timer.start().unwrap();
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() >= 2));

        let stopping = Instant::now();
        timer.stop().unwrap();
        timer.stop().unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(1), "stopping took {:?}", stopping.elapsed());

        assert!(!timer.is_active());
        assert!(workers.iter().all(|worker| !worker.running()));
    })
    .unwrap();
}

#[test]
fn stop_before_first_tick() {
    execute_or_abandon(|| {
        let timer = Timer::new(Duration::from_secs(5)).unwrap();
        let calls = Arc::new(Mutex::new(0_u32));
        let worker = timer.make_worker({
            let calls = Arc::clone(&calls);
            move |_, _| *calls.lock().unwrap() += 1
        });
        worker.start().unwrap();
        timer.start().unwrap();

        let stopping = Instant::now();
        timer.stop().unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(1));

        assert!(!worker.running());
        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(timer.tick_count(), 0);
        assert_eq!(timer.signal_state(), SignalState::Undefined);
    })
    .unwrap();
}

#[test]
fn pause_lets_the_tick_in_flight_fire() {
    execute_or_abandon(|| {
        let timer = Timer::new(ms(50)).unwrap();
        let observed = Arc::new(Mutex::new(Vec::<(SignalState, TickCount)>::new()));
        let worker = timer.make_worker({
            let observed = Arc::clone(&observed);
            move |state, tick| observed.lock().unwrap().push((state, tick))
        });
        worker.start().unwrap();

        timer.start().unwrap();
        thread::sleep(ms(10));
        timer.pause();

        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() == 1));
        assert!(eventually(TEST_TIMEOUT, || !observed.lock().unwrap().is_empty()));
        thread::sleep(ms(150));
        assert_eq!(timer.tick_count(), 1);
        assert!(timer.is_paused());
        assert_eq!(timer.signal_state(), SignalState::High);
        assert_eq!(*observed.lock().unwrap(), vec![(SignalState::High, 1)]);

        timer.resume();
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() >= 2));

        timer.stop().unwrap();
    })
    .unwrap();
}

#[test]
fn step_budget_fires_exact_ticks() {
    execute_or_abandon(|| {
        let resolution = ms(2);
        let timer = Timer::new(resolution).unwrap();

        timer.start().unwrap();
        timer.pause();
        thread::sleep(resolution * 10);
        let base = timer.tick_count();

        timer.set_step_for(3);
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() == base + 3));
        thread::sleep(resolution * 10);
        assert_eq!(timer.tick_count(), base + 3);
        assert!(timer.is_paused());
        assert_eq!(timer.step_for(), 0);

        timer.set_step_for(0);
        assert!(!timer.is_paused());
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() >= base + 5));

        timer.stop().unwrap();
    })
    .unwrap();
}

#[test]
fn stop_wakes_a_paused_generator() {
    execute_or_abandon(|| {
        let timer = Timer::new(ms(1)).unwrap();

        timer.pause();
        timer.start().unwrap();
        thread::sleep(ms(20));
        assert_eq!(timer.tick_count(), 0);

        timer.stop().unwrap();
        assert!(!timer.is_active());
    })
    .unwrap();
}

#[test]
fn running_time_excludes_pauses_and_freezes_on_stop() {
    execute_or_abandon(|| {
        let timer = Timer::new(ms(1)).unwrap();

        timer.start().unwrap();
        thread::sleep(ms(20));
        timer.pause();
        thread::sleep(ms(20));
        let paused = timer.running_time();
        thread::sleep(ms(50));
        assert_eq!(timer.running_time(), paused);

        timer.resume();
        thread::sleep(ms(20));
        timer.stop().unwrap();

        let stopped = timer.running_time();
        assert!(stopped > paused);
        thread::sleep(ms(20));
        assert_eq!(timer.running_time(), stopped);
    })
    .unwrap();
}

#[test]
fn restart_keeps_counting() {
    execute_or_abandon(|| {
        let timer = Timer::new(ms(2)).unwrap();

        timer.start().unwrap();
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() >= 3));
        timer.stop().unwrap();
        let first_run = timer.tick_count();
        assert_eq!(timer.signal_state(), SignalState::HighImpedance);

        timer.start().unwrap();
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() > first_run));
        assert!(timer.signal_state().is_driven());
        timer.stop().unwrap();
    })
    .unwrap();
}

#[test]
fn restart_after_timed_out_stop_runs_one_generator() {
    log_to_stdout();

    execute_or_abandon(|| {
        let gate_open = Arc::new(AtomicBool::new(false));
        let blocked_once = Arc::new(AtomicBool::new(false));
        let callers = Arc::new(Mutex::new(Vec::<ThreadId>::new()));

        // The very first tick blocks its generator until the gate opens.
        let policy = {
            let gate_open = Arc::clone(&gate_open);
            let blocked_once = Arc::clone(&blocked_once);
            let callers = Arc::clone(&callers);
            move |tick: TickCount| {
                callers.lock().unwrap().push(thread::current().id());
                if !blocked_once.swap(true, Ordering::AcqRel) {
                    while !gate_open.load(Ordering::Acquire) {
                        thread::sleep(ms(1));
                    }
                }
                if tick % 2 == 1 { SignalState::High } else { SignalState::Low }
            }
        };
        let timer = Timer::builder()
            .resolution(ms(2))
            .join_timeout(ms(50))
            .signal_policy(policy)
            .build()
            .unwrap();

        timer.start().unwrap();
        assert!(eventually(TEST_TIMEOUT, || !callers.lock().unwrap().is_empty()));
        let stuck = callers.lock().unwrap()[0];

        assert!(matches!(timer.stop(), Err(Error::JoinTimeout { .. })));
        timer.start().unwrap();
        gate_open.store(true, Ordering::Release);

        assert!(eventually(TEST_TIMEOUT, || {
            callers.lock().unwrap().iter().filter(|&&id| id != stuck).count() >= 10
        }));
        timer.stop().unwrap();

        let stuck_calls = callers.lock().unwrap().iter().filter(|&&id| id == stuck).count();
        assert_eq!(stuck_calls, 1);
    })
    .unwrap();
}

#[test]
fn dropping_an_active_timer_stops_it() {
    execute_or_abandon(|| {
        let timer = Timer::new(ms(1)).unwrap();
        timer.start().unwrap();
        assert!(eventually(TEST_TIMEOUT, || timer.tick_count() >= 1));

        drop(timer);
    })
    .unwrap();
}
