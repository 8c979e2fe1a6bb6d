// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    outcome::{SkipReason, UnitError},
    test_list::TestPhase,
};
use std::time::Duration;
use zopkio_metadata::{ResultCounts, ResultKind};

/// An event that occurs during a run.
///
/// Events are always delivered on the thread that called
/// [`TestRunner::execute`](super::TestRunner::execute), including events produced by tests
/// running concurrently in a group.
#[derive(Clone, Debug)]
pub enum RunEvent {
    /// The run started.
    RunStarted {
        /// The number of configurations that will run.
        config_count: usize,

        /// The number of tests that will run per configuration.
        test_count: usize,
    },

    /// A configuration started: suite setup is about to run.
    ConfigStarted {
        /// The configuration name.
        config_name: String,
    },

    /// A configuration was skipped without running suite setup, or suite setup failed.
    ConfigSkipped {
        /// The configuration name.
        config_name: String,

        /// Why the configuration was skipped.
        reason: SkipReason,

        /// The suite setup failure, if that was the reason.
        error: Option<UnitError>,
    },

    /// A test (or every test in a group) is about to run setup.
    TestStarted {
        /// The configuration name.
        config_name: String,

        /// The test name.
        test_name: String,

        /// The phase of the test.
        phase: TestPhase,
    },

    /// One iteration of a test body finished, including inline validation if any.
    IterationFinished {
        /// The configuration name.
        config_name: String,

        /// The test name.
        test_name: String,

        /// The iteration number, starting at 1.
        iteration: u32,

        /// The total number of iterations.
        total: u32,

        /// The iteration's result.
        result: ResultKind,
    },

    /// A test was skipped.
    TestSkipped {
        /// The configuration name.
        config_name: String,

        /// The test name.
        test_name: String,

        /// Why the test was skipped.
        reason: SkipReason,
    },

    /// A test finished, including its teardown.
    TestFinished {
        /// The configuration name.
        config_name: String,

        /// The test name.
        test_name: String,

        /// The test's result so far. Post-run validation may still downgrade it.
        result: ResultKind,

        /// The most recent failure.
        error: Option<UnitError>,

        /// Time taken, including setup and teardown.
        elapsed: Duration,
    },

    /// A configuration finished and was handed to the results collector.
    ConfigFinished {
        /// The configuration name.
        config_name: String,

        /// The configuration's result.
        result: ResultKind,

        /// Counts of test results in this configuration.
        counts: ResultCounts,

        /// Time taken, including suite setup and teardown.
        elapsed: Duration,
    },

    /// The run finished.
    RunFinished {
        /// Statistics for the run.
        run_stats: RunStats,

        /// Time taken by the whole run.
        elapsed: Duration,
    },
}

/// Statistics for a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of configurations that ran suite setup.
    pub configs_run: usize,

    /// The number of configurations that were skipped due to an abort.
    pub configs_skipped: usize,

    /// The number of tests that passed, summed over configurations.
    pub passed: usize,

    /// The number of tests that failed, summed over configurations.
    pub failed: usize,

    /// The number of tests that were skipped, summed over configurations.
    pub skipped: usize,
}

impl RunStats {
    /// Returns the number of tests that passed.
    pub fn success_count(&self) -> usize {
        self.passed
    }

    /// Returns the number of tests that failed.
    pub fn fail_count(&self) -> usize {
        self.failed
    }

    /// Returns true if this run is considered a success.
    ///
    /// Skipped tests and skipped configurations are not considered failures.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub(super) fn add_counts(&mut self, counts: &ResultCounts) {
        self.passed += counts.passed;
        self.failed += counts.failed;
        self.skipped += counts.skipped;
    }
}
