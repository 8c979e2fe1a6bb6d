// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed views over the configuration keys that control the execution engine.

use super::{AbortThreshold, Configuration};
use crate::errors::ConfigValueError;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;

/// Configuration keys recognized by the engine.
pub mod keys {
    /// Suite-level failure handler threshold. Read from the master configuration.
    pub const MAX_SUITE_FAILURES_BEFORE_ABORT: &str = "max_suite_failures_before_abort";

    /// Per-test failure handler threshold.
    pub const MAX_FAILURES_PER_SUITE_BEFORE_ABORT: &str = "max_failures_per_suite_before_abort";

    /// Skips performance capture and analysis.
    pub const NO_PERF: &str = "no_perf";

    /// Skips displaying the rendered report.
    pub const NO_DISPLAY: &str = "no-display";

    /// Toggles log retrieval after each configuration.
    pub const SHOULD_FETCH_LOGS: &str = "should_fetch_logs";

    /// Outer repetition multiplier applied to every test.
    pub const LOOP_ALL_TESTS: &str = "loop_all_tests";

    /// Forces inline validation even for single-iteration tests.
    pub const VERIFY_AFTER_EACH_TEST: &str = "verify_after_each_test";

    /// Consecutive failures tolerated before a test is no longer retried.
    pub const CONSECUTIVE_FAILURES_PER_TEST: &str = "consecutive_failures_per_test";

    /// Where fetched logs are written.
    pub const LOGS_DIRECTORY: &str = "LOGS_DIRECTORY";

    /// Where performance analysis output is written.
    pub const OUTPUT_DIRECTORY: &str = "OUTPUT_DIRECTORY";
}

/// Run-level options, read from the master configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineOptions {
    /// Threshold for the suite-level failure handler.
    pub max_suite_failures_before_abort: AbortThreshold,

    /// Whether performance capture is disabled.
    pub no_perf: bool,

    /// Whether displaying the report is disabled.
    pub no_display: bool,

    /// Whether logs are fetched after each configuration.
    pub should_fetch_logs: bool,

    /// Overrides the log source's logs directory.
    pub logs_directory: Option<Utf8PathBuf>,

    /// Overrides the log source's performance output directory.
    pub output_directory: Option<Utf8PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_suite_failures_before_abort: AbortThreshold::DEFAULT,
            no_perf: false,
            no_display: false,
            should_fetch_logs: true,
            logs_directory: None,
            output_directory: None,
        }
    }
}

impl EngineOptions {
    /// Reads run-level options from the master configuration.
    pub fn from_master(master: &Configuration) -> Result<Self, ConfigValueError> {
        let lookup = Lookup::new(master, None);
        let defaults = Self::default();
        Ok(Self {
            max_suite_failures_before_abort: lookup
                .threshold(keys::MAX_SUITE_FAILURES_BEFORE_ABORT)?
                .unwrap_or(defaults.max_suite_failures_before_abort),
            no_perf: lookup.bool(keys::NO_PERF)?.unwrap_or(defaults.no_perf),
            no_display: lookup.bool(keys::NO_DISPLAY)?.unwrap_or(defaults.no_display),
            should_fetch_logs: lookup
                .bool(keys::SHOULD_FETCH_LOGS)?
                .unwrap_or(defaults.should_fetch_logs),
            logs_directory: lookup.path(keys::LOGS_DIRECTORY)?,
            output_directory: lookup.path(keys::OUTPUT_DIRECTORY)?,
        })
    }
}

/// Per-configuration options, read from the variant and falling back to the master.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigOptions {
    /// Threshold for the per-test failure handler.
    pub max_failures_per_suite_before_abort: AbortThreshold,

    /// Whether every test is validated inline, right after its body.
    pub verify_after_each_test: bool,

    /// Consecutive failures tolerated before a test stops being retried. `None` means a failed
    /// test is never retried on later iterations.
    pub consecutive_failures_per_test: Option<u32>,

    /// How many times the whole suite is looped within this configuration. Always at least 1.
    pub loop_all_tests: u32,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            max_failures_per_suite_before_abort: AbortThreshold::DEFAULT,
            verify_after_each_test: false,
            consecutive_failures_per_test: None,
            loop_all_tests: 1,
        }
    }
}

impl ConfigOptions {
    /// Reads the options for `config`, falling back to `master` for keys the variant doesn't
    /// set.
    pub fn resolve(master: &Configuration, config: &Configuration) -> Result<Self, ConfigValueError> {
        let lookup = Lookup::new(config, Some(master));
        let defaults = Self::default();

        let loop_all_tests = match lookup.u32(keys::LOOP_ALL_TESTS)? {
            Some(0) => {
                return Err(lookup.invalid(
                    keys::LOOP_ALL_TESTS,
                    &Value::from(0),
                    "a positive integer",
                ));
            }
            Some(n) => n,
            None => defaults.loop_all_tests,
        };

        Ok(Self {
            max_failures_per_suite_before_abort: lookup
                .threshold(keys::MAX_FAILURES_PER_SUITE_BEFORE_ABORT)?
                .unwrap_or(defaults.max_failures_per_suite_before_abort),
            verify_after_each_test: lookup
                .bool(keys::VERIFY_AFTER_EACH_TEST)?
                .unwrap_or(defaults.verify_after_each_test),
            consecutive_failures_per_test: lookup.u32(keys::CONSECUTIVE_FAILURES_PER_TEST)?,
            loop_all_tests,
        })
    }
}

/// Looks up keys in a primary configuration, then an optional fallback.
struct Lookup<'a> {
    primary: &'a Configuration,
    fallback: Option<&'a Configuration>,
}

impl<'a> Lookup<'a> {
    fn new(primary: &'a Configuration, fallback: Option<&'a Configuration>) -> Self {
        Self { primary, fallback }
    }

    fn get(&self, key: &str) -> Option<(&'a Configuration, &'a Value)> {
        let primary = self.primary;
        primary
            .get(key)
            .map(|value| (primary, value))
            .or_else(|| {
                self.fallback
                    .and_then(|fallback| fallback.get(key).map(|value| (fallback, value)))
            })
            .filter(|(_, value)| !value.is_null())
    }

    fn invalid(&self, key: &str, value: &Value, expected: &'static str) -> ConfigValueError {
        ConfigValueError::new(self.primary.name(), key, value, expected)
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigValueError> {
        let Some((config, value)) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| ConfigValueError::new(config.name(), key, value, "a boolean"))
    }

    fn u32(&self, key: &str) -> Result<Option<u32>, ConfigValueError> {
        let Some((config, value)) = self.get(key) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| {
            ConfigValueError::new(config.name(), key, value, "a non-negative integer")
        })
    }

    fn threshold(&self, key: &str) -> Result<Option<AbortThreshold>, ConfigValueError> {
        let Some((config, value)) = self.get(key) else {
            return Ok(None);
        };
        AbortThreshold::deserialize(value).map(Some).map_err(|_| {
            ConfigValueError::new(
                config.name(),
                key,
                value,
                "a non-negative integer, -1 or \"never\"",
            )
        })
    }

    fn path(&self, key: &str) -> Result<Option<Utf8PathBuf>, ConfigValueError> {
        let Some((config, value)) = self.get(key) else {
            return Ok(None);
        };
        match value {
            Value::String(s) => Ok(Some(Utf8PathBuf::from(s))),
            _ => Err(ConfigValueError::new(config.name(), key, value, "a path")),
        }
    }
}
