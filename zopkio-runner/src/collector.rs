// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation of per-configuration results for reporting.
//!
//! The collector stores copies of finished configurations and their tests, keyed by
//! configuration name. Because it stores copies, resetting and rerunning the live descriptors
//! does not affect collected history.

use crate::{config::Configuration, stopwatch::elapsed_between, test_list::Test};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use std::time::Duration;
use zopkio_metadata::{ConfigSummary, ResultCounts, ResultKind, RunSummary};

/// The format used when timestamps are displayed in reports.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp for display.
pub fn format_timestamp(time: DateTime<FixedOffset>) -> String {
    time.format(DISPLAY_TIME_FORMAT).to_string()
}

/// The collected results of one configuration.
#[derive(Clone, Debug)]
pub struct ConfigResults {
    config: Configuration,
    tests: IndexMap<String, Test>,
    skipped_tests: Vec<String>,
}

impl ConfigResults {
    /// Returns the configuration as it was when collected.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Returns the collected tests. Empty if the configuration was skipped.
    pub fn tests(&self) -> &IndexMap<String, Test> {
        &self.tests
    }

    /// Returns the names of the tests that would have run, if the configuration was skipped.
    pub fn skipped_tests(&self) -> &[String] {
        &self.skipped_tests
    }

    /// Returns counts of the collected tests by result.
    pub fn counts(&self) -> ResultCounts {
        let mut counts = ResultCounts::default();
        for test in self.tests.values() {
            counts.add(test.result);
        }
        counts
    }
}

/// Stores results with fast access to individual results, along with common aggregations.
#[derive(Clone, Debug)]
pub struct ResultsCollector {
    results: IndexMap<String, ConfigResults>,
    start_time: DateTime<FixedOffset>,
    end_time: Option<DateTime<FixedOffset>>,
}

impl ResultsCollector {
    /// Creates an empty collector for a run that started at `start_time`.
    pub fn new(start_time: DateTime<FixedOffset>) -> Self {
        Self {
            results: IndexMap::new(),
            start_time,
            end_time: None,
        }
    }

    /// Stores copies of a configuration and its tests under the configuration's name, replacing
    /// any earlier entry for it.
    ///
    /// If the configuration was skipped, no tests are stored.
    pub fn collect<'a>(&mut self, config: &Configuration, tests: impl IntoIterator<Item = &'a Test>) {
        let mut collected = IndexMap::new();
        let mut skipped_tests = Vec::new();
        for test in tests {
            if config.result == ResultKind::Skipped {
                skipped_tests.push(test.name().to_owned());
            } else {
                collected.insert(test.name().to_owned(), test.clone());
            }
        }
        self.results.insert(
            config.name().to_owned(),
            ConfigResults {
                config: config.clone(),
                tests: collected,
                skipped_tests,
            },
        );
    }

    /// Records the end of the run.
    pub fn set_end_time(&mut self, end_time: DateTime<FixedOffset>) {
        self.end_time = Some(end_time);
    }

    /// Returns the number of tests collected for a configuration.
    pub fn count_tests(&self, config_name: &str) -> usize {
        self.results
            .get(config_name)
            .map_or(0, |results| results.tests.len())
    }

    /// Returns the number of tests in a configuration with the given result.
    pub fn count_tests_with_result(&self, config_name: &str, result: ResultKind) -> usize {
        self.results
            .get(config_name)
            .map_or(0, |results| results.counts().get(result))
    }

    /// Returns the number of tests collected across all configurations.
    pub fn count_all_tests(&self) -> usize {
        self.results.values().map(|results| results.tests.len()).sum()
    }

    /// Returns the number of tests across all configurations with the given result.
    pub fn count_all_tests_with_result(&self, result: ResultKind) -> usize {
        self.results
            .values()
            .map(|results| results.counts().get(result))
            .sum()
    }

    /// Returns counts of tests by result across all configurations.
    pub fn counts(&self) -> ResultCounts {
        let mut counts = ResultCounts::default();
        for results in self.results.values() {
            counts += results.counts();
        }
        counts
    }

    /// Returns how long a test took, including setup and teardown.
    pub fn test_exec_time(&self, config_name: &str, test_name: &str) -> Option<Duration> {
        let test = self.test_result(config_name, test_name)?;
        test.end_time?;
        Some(elapsed_between(test.start_time, test.end_time))
    }

    /// Returns when a test started.
    pub fn test_start_time(&self, config_name: &str, test_name: &str) -> Option<DateTime<FixedOffset>> {
        self.test_result(config_name, test_name)?.start_time
    }

    /// Returns when a test ended.
    pub fn test_end_time(&self, config_name: &str, test_name: &str) -> Option<DateTime<FixedOffset>> {
        self.test_result(config_name, test_name)?.end_time
    }

    /// Returns how long a configuration took.
    pub fn config_exec_time(&self, config_name: &str) -> Option<Duration> {
        let config = self.config_result(config_name)?;
        config.start_time?;
        config.end_time?;
        Some(elapsed_between(config.start_time, config.end_time))
    }

    /// Returns when a configuration started.
    pub fn config_start_time(&self, config_name: &str) -> Option<DateTime<FixedOffset>> {
        self.config_result(config_name)?.start_time
    }

    /// Returns when a configuration ended.
    pub fn config_end_time(&self, config_name: &str) -> Option<DateTime<FixedOffset>> {
        self.config_result(config_name)?.end_time
    }

    /// Returns the total execution time of every configuration that ran.
    pub fn total_config_exec_time(&self) -> Duration {
        self.results
            .keys()
            .filter_map(|name| self.config_exec_time(name))
            .sum()
    }

    /// Returns when the run started.
    pub fn summary_start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    /// Returns when the run ended, if it has.
    pub fn summary_end_time(&self) -> Option<DateTime<FixedOffset>> {
        self.end_time
    }

    /// Returns the collected configuration.
    pub fn config_result(&self, config_name: &str) -> Option<&Configuration> {
        self.results.get(config_name).map(|results| &results.config)
    }

    /// Returns the collected results for a configuration.
    pub fn config_results(&self, config_name: &str) -> Option<&ConfigResults> {
        self.results.get(config_name)
    }

    /// Returns a collected test.
    pub fn test_result(&self, config_name: &str, test_name: &str) -> Option<&Test> {
        self.results.get(config_name)?.tests.get(test_name)
    }

    /// Iterates over the collected tests of a configuration.
    pub fn test_results(&self, config_name: &str) -> impl Iterator<Item = &Test> + '_ {
        self.results
            .get(config_name)
            .into_iter()
            .flat_map(|results| results.tests.values())
    }

    /// Iterates over configuration names, in collection order.
    pub fn config_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.results.keys().map(String::as_str)
    }

    /// Iterates over the test names of a configuration.
    pub fn test_names(&self, config_name: &str) -> impl Iterator<Item = &str> + '_ {
        self.results
            .get(config_name)
            .into_iter()
            .flat_map(|results| results.tests.keys().map(String::as_str))
    }

    /// Iterates over all collected configurations.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigResults> + '_ {
        self.results.values()
    }

    /// Returns the number of collected configurations.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Builds a serializable summary of the run.
    pub fn to_summary(&self, report_name: &str) -> RunSummary {
        let configs = self
            .results
            .iter()
            .map(|(name, results)| {
                let config = &results.config;
                let summary = ConfigSummary {
                    name: name.clone(),
                    result: config.result,
                    start_time: config.start_time,
                    end_time: config.end_time,
                    message: config.message.clone(),
                    counts: results.counts(),
                    tests: results
                        .tests
                        .iter()
                        .map(|(name, test)| (name.clone(), test.to_summary()))
                        .collect(),
                };
                (name.clone(), summary)
            })
            .collect();

        RunSummary {
            report_name: report_name.to_owned(),
            start_time: self.start_time,
            end_time: self.end_time,
            total_config_exec_secs: self.total_config_exec_time().as_secs_f64(),
            counts: self.counts(),
            configs,
        }
    }
}
