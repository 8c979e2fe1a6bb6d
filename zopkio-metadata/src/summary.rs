// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// The final result of a test or a configuration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    /// The unit was never started.
    #[default]
    NotRun,

    /// The unit ran and passed.
    Passed,

    /// The unit ran and failed.
    Failed,

    /// The unit was skipped, either because an abort threshold was exceeded or because setup
    /// failed.
    Skipped,
}

impl ResultKind {
    /// Returns the lowercase string used for this result in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKind::NotRun => "not-run",
            ResultKind::Passed => "passed",
            ResultKind::Failed => "failed",
            ResultKind::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts of tests by result.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResultCounts {
    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,

    /// The number of tests that never ran.
    pub not_run: usize,
}

impl ResultCounts {
    /// Adds a single result to the counts.
    pub fn add(&mut self, result: ResultKind) {
        match result {
            ResultKind::Passed => self.passed += 1,
            ResultKind::Failed => self.failed += 1,
            ResultKind::Skipped => self.skipped += 1,
            ResultKind::NotRun => self.not_run += 1,
        }
    }

    /// Returns the count for a single result kind.
    pub fn get(&self, result: ResultKind) -> usize {
        match result {
            ResultKind::Passed => self.passed,
            ResultKind::Failed => self.failed,
            ResultKind::Skipped => self.skipped,
            ResultKind::NotRun => self.not_run,
        }
    }

    /// Returns the total number of tests counted.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.not_run
    }

    /// Returns true if no test failed.
    ///
    /// Skipped tests are not considered failures.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl std::ops::AddAssign for ResultCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.passed += rhs.passed;
        self.failed += rhs.failed;
        self.skipped += rhs.skipped;
        self.not_run += rhs.not_run;
    }
}

/// A summary of an entire zopkio run across all configurations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// The name of the report, typically the suite name plus a timestamp.
    pub report_name: String,

    /// When the run started.
    pub start_time: DateTime<FixedOffset>,

    /// When the run finished, if it did.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// The sum of the execution times of every configuration, in seconds.
    pub total_config_exec_secs: f64,

    /// Counts of test results across all configurations.
    pub counts: ResultCounts,

    /// Per-configuration summaries, in execution order.
    pub configs: IndexMap<String, ConfigSummary>,
}

/// A summary of a single configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigSummary {
    /// The configuration name.
    pub name: String,

    /// The configuration's result.
    pub result: ResultKind,

    /// When the configuration started executing.
    pub start_time: Option<DateTime<FixedOffset>>,

    /// When the configuration finished executing.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Any messages recorded against the configuration, such as setup failure traces.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Counts of test results within this configuration.
    pub counts: ResultCounts,

    /// Per-test summaries, in execution order.
    pub tests: IndexMap<String, TestSummary>,
}

/// A summary of a single test within a configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSummary {
    /// The test name.
    pub name: String,

    /// The test description, built from the test's and validator's documentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The phase the test ran in, or `None` for the default sequential phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,

    /// The final result, i.e. the result of the last executed iteration.
    pub result: ResultKind,

    /// The result of every iteration, keyed by iteration number starting at 1.
    pub iteration_results: BTreeMap<u32, ResultKind>,

    /// Start of the test including setup.
    pub start_time: Option<DateTime<FixedOffset>>,

    /// End of the test including teardown.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Start of the test body.
    pub func_start_time: Option<DateTime<FixedOffset>>,

    /// End of the test body.
    pub func_end_time: Option<DateTime<FixedOffset>>,

    /// Captured messages and traces.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// The captured error, if the test failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
