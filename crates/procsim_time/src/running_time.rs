// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

/// Measures how long a timer has been running, excluding the time it spent paused.
///
/// The measurement starts on [`start`][Self::start], is frozen while paused, and is frozen for
/// good by [`stop`][Self::stop] until the next start.
#[derive(Debug, Default)]
pub(crate) struct RunningTime {
    started: Option<Instant>,
    paused_since: Option<Instant>,
    paused_total: Duration,
    stopped: Option<Instant>,
}

impl RunningTime {
    pub(crate) fn start(&mut self, now: Instant) {
        *self = Self {
            started: Some(now),
            ..Self::default()
        };
    }

    pub(crate) fn pause(&mut self, now: Instant) {
        if self.started.is_some() && self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub(crate) fn resume(&mut self, now: Instant) {
        if let Some(paused_since) = self.paused_since.take() {
            self.paused_total = self.paused_total.saturating_add(now.saturating_duration_since(paused_since));
        }
    }

    pub(crate) fn stop(&mut self, now: Instant) {
        if self.started.is_some() && self.stopped.is_none() {
            self.resume(now);
            self.stopped = Some(now);
        }
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };

        let end = self.stopped.or(self.paused_since).unwrap_or(now);

        end.saturating_duration_since(started).saturating_sub(self.paused_total)
    }
}
