// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long configurations and tests take.
//!
//! Descriptors record wall-clock timestamps, but durations are measured with the monotonic clock
//! so that reported elapsed times never go backwards.

use chrono::{DateTime, FixedOffset, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// Returns the current local time as a fixed-offset timestamp.
pub(crate) fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<FixedOffset>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls will happen imperceptibly close to each other, which is good
            // enough for our purposes.
            start_time: now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<FixedOffset>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    pub(crate) fn end_time(&self) -> DateTime<FixedOffset> {
        self.start_time + self.duration
    }
}

/// Returns the elapsed time between two optional timestamps, or zero if either is missing or the
/// end precedes the start.
pub(crate) fn elapsed_between(
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
) -> Duration {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    }
}
