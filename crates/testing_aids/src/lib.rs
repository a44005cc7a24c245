// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! An unpublished crate containing testing utilities for use within this repo.

use std::sync::mpsc;
use std::time::{Duration, Instant};
use std::{env, thread};

mod log;

pub use log::*;

/// If something (whatever) does not happen in a test within this time, the test will fail.
///
/// This is only meant to break out of deadlocks, not to bound anything a test actually expects
/// to wait for.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How often [`eventually`] re-evaluates its condition.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Whether the tests run under `cargo mutants` (signalled through `MUTATION_TESTING=1`).
#[must_use]
pub fn is_mutation_testing() -> bool {
    env::var("MUTATION_TESTING").as_deref() == Ok("1")
}

/// Executes a thread-safe function on a background thread and abandons it if
/// it does not complete before [`TEST_TIMEOUT`].
///
/// Returns `None` if the function panicked or timed out.
#[cfg_attr(test, mutants::skip)] // This is test logic - pointless to mutate.
#[must_use]
pub fn execute_or_abandon<F, R>(f: F) -> Option<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if is_mutation_testing() {
        // Timeouts under mutation testing must show up as "timeout" results.
        return Some(f());
    }

    let (sender, receiver) = mpsc::channel();

    // A panic drops the sender without sending, which also ends the wait below.
    thread::spawn(move || {
        let result = f();
        _ = sender.send(result);
    });

    receiver.recv_timeout(TEST_TIMEOUT).ok()
}

/// Polls `condition` until it holds or `timeout` elapses. Returns the final outcome.
///
/// For assertions on state that other threads settle asynchronously, such as a thread
/// noticing that it has been asked to stop.
#[cfg_attr(test, mutants::skip)] // This is test logic - pointless to mutate.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
        if condition() {
            return true;
        }

        if Instant::now() >= deadline {
            return false;
        }

        thread::sleep(POLL_INTERVAL);
    }
}
