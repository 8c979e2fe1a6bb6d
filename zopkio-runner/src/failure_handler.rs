// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracking of consecutive setup and teardown failures.
//!
//! Two independent handlers exist during a run. One is scoped to suite-level setup and teardown
//! and decides whether whole configurations are skipped. The other is created fresh for each
//! configuration and decides whether the remaining tests in it are skipped. Test body and
//! validation failures never reach a handler.

use crate::config::AbortThreshold;

/// Whether further units of work should run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AbortStatus {
    /// Keep going.
    Continue,

    /// The threshold was exceeded: skip subsequent units without attempting setup.
    Abort,
}

/// Counts consecutive non-test failures and decides when to abort.
#[derive(Clone, Debug)]
pub struct FailureHandler {
    threshold: AbortThreshold,
    failure_count: usize,
}

impl FailureHandler {
    /// Creates a new handler with the given threshold.
    pub fn new(threshold: AbortThreshold) -> Self {
        Self {
            threshold,
            failure_count: 0,
        }
    }

    /// Records a success, resetting the failure count.
    pub fn notify_success(&mut self) {
        self.failure_count = 0;
    }

    /// Records a failure.
    pub fn notify_failure(&mut self) {
        self.failure_count += 1;
    }

    /// Returns whether subsequent units should run.
    pub fn abort_status(&self) -> AbortStatus {
        if self.threshold.is_exceeded(self.failure_count) {
            AbortStatus::Abort
        } else {
            AbortStatus::Continue
        }
    }

    /// Returns true if subsequent units should be skipped.
    pub fn is_aborted(&self) -> bool {
        self.abort_status() == AbortStatus::Abort
    }

    /// Returns the number of consecutive failures seen so far.
    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    /// Returns the threshold this handler was created with.
    pub fn threshold(&self) -> AbortThreshold {
        self.threshold
    }
}

impl Default for FailureHandler {
    fn default() -> Self {
        Self::new(AbortThreshold::DEFAULT)
    }
}
