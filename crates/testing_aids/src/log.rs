// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Once;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::is_mutation_testing;

/// Enables logging of test output to the standard output stream.
///
/// Output is limited to DEBUG and above and goes through the test harness capture, so it only
/// shows up for failing tests or with `--nocapture`.
///
/// Logging is global state and will last until end of process. Calling this more than once is
/// harmless.
///
/// Logging is disabled under mutation testing - this becomes a no-op.
pub fn log_to_stdout() {
    if is_mutation_testing() {
        return;
    }

    LOGGING_INITIALIZER.call_once(|| {
        let terminal_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_thread_names(true)
            .with_filter(LevelFilter::from_level(Level::DEBUG));

        // Fails only if something besides testing_aids has configured logging, in which case
        // that configuration stays in charge.
        _ = tracing_subscriber::registry().with(terminal_layer).try_init();
    });
}

static LOGGING_INITIALIZER: Once = Once::new();
