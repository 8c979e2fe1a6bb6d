// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Where a suite's logs live, and what performance analysis should be run on them.

use crate::config::Configuration;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use regex::Regex;

/// The pattern that matches no file names.
pub const MATCH_NOTHING: &str = "^$";

/// Describes the logs produced by a suite's processes.
pub trait LogSource: Send + Sync {
    /// Remote log paths for a type of service.
    fn process_logs(&self, _service_name: &str) -> Vec<Utf8PathBuf> {
        Vec::new()
    }

    /// Remote machine-level log paths for a process.
    fn machine_logs(&self, _unique_id: &str) -> Vec<Utf8PathBuf> {
        Vec::new()
    }

    /// Remote log paths consumed by performance analysis for a process.
    fn naarad_logs(&self, _unique_id: &str) -> Vec<Utf8PathBuf> {
        Vec::new()
    }

    /// A file name filter applied to a process's install directory when fetching logs.
    fn log_pattern(&self, _unique_id: &str) -> Regex {
        match_nothing()
    }

    /// The performance-analysis configuration for a configuration, or for one test within it.
    fn perf_config(&self, _config: &Configuration, _test_name: Option<&str>) -> Option<Utf8PathBuf> {
        None
    }

    /// Where fetched logs are written, unless the master configuration overrides it.
    fn logs_directory(&self) -> Option<&Utf8Path> {
        None
    }

    /// Where performance-analysis output is written, unless the master configuration overrides
    /// it.
    fn output_directory(&self) -> Option<&Utf8Path> {
        None
    }
}

pub(crate) fn match_nothing() -> Regex {
    Regex::new(MATCH_NOTHING).expect("the match-nothing pattern is valid")
}

/// A [`LogSource`] described by fixed maps.
#[derive(Clone, Debug, Default)]
pub struct StaticLogSource {
    process_logs: IndexMap<String, Vec<Utf8PathBuf>>,
    machine_logs: IndexMap<String, Vec<Utf8PathBuf>>,
    naarad_logs: IndexMap<String, Vec<Utf8PathBuf>>,
    log_patterns: IndexMap<String, Regex>,
    perf_config: Option<Utf8PathBuf>,
    logs_directory: Option<Utf8PathBuf>,
    output_directory: Option<Utf8PathBuf>,
}

impl StaticLogSource {
    /// Creates a log source with no logs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds log paths for a type of service.
    pub fn with_process_logs(
        mut self,
        service_name: impl Into<String>,
        logs: impl IntoIterator<Item = impl Into<Utf8PathBuf>>,
    ) -> Self {
        self.process_logs
            .entry(service_name.into())
            .or_default()
            .extend(logs.into_iter().map(Into::into));
        self
    }

    /// Adds machine-level log paths for a process.
    pub fn with_machine_logs(
        mut self,
        unique_id: impl Into<String>,
        logs: impl IntoIterator<Item = impl Into<Utf8PathBuf>>,
    ) -> Self {
        self.machine_logs
            .entry(unique_id.into())
            .or_default()
            .extend(logs.into_iter().map(Into::into));
        self
    }

    /// Adds performance-analysis log paths for a process.
    pub fn with_naarad_logs(
        mut self,
        unique_id: impl Into<String>,
        logs: impl IntoIterator<Item = impl Into<Utf8PathBuf>>,
    ) -> Self {
        self.naarad_logs
            .entry(unique_id.into())
            .or_default()
            .extend(logs.into_iter().map(Into::into));
        self
    }

    /// Sets the install-directory file filter for a process.
    pub fn with_log_pattern(mut self, unique_id: impl Into<String>, pattern: Regex) -> Self {
        self.log_patterns.insert(unique_id.into(), pattern);
        self
    }

    /// Sets the performance-analysis configuration used for every configuration and test.
    pub fn with_perf_config(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.perf_config = Some(path.into());
        self
    }

    /// Sets the logs directory.
    pub fn with_logs_directory(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.logs_directory = Some(path.into());
        self
    }

    /// Sets the performance-analysis output directory.
    pub fn with_output_directory(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.output_directory = Some(path.into());
        self
    }
}

impl LogSource for StaticLogSource {
    fn process_logs(&self, service_name: &str) -> Vec<Utf8PathBuf> {
        self.process_logs.get(service_name).cloned().unwrap_or_default()
    }

    fn machine_logs(&self, unique_id: &str) -> Vec<Utf8PathBuf> {
        self.machine_logs.get(unique_id).cloned().unwrap_or_default()
    }

    fn naarad_logs(&self, unique_id: &str) -> Vec<Utf8PathBuf> {
        self.naarad_logs.get(unique_id).cloned().unwrap_or_default()
    }

    fn log_pattern(&self, unique_id: &str) -> Regex {
        self.log_patterns
            .get(unique_id)
            .cloned()
            .unwrap_or_else(match_nothing)
    }

    fn perf_config(&self, _config: &Configuration, _test_name: Option<&str>) -> Option<Utf8PathBuf> {
        self.perf_config.clone()
    }

    fn logs_directory(&self) -> Option<&Utf8Path> {
        self.logs_directory.as_deref()
    }

    fn output_directory(&self) -> Option<&Utf8Path> {
        self.output_directory.as_deref()
    }
}
