// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State shared across a single zopkio invocation.

use crate::{
    collector::ResultsCollector,
    config::Configuration,
    deployer::DeployerRegistry,
    perf::PerfStats,
    stopwatch::now,
    test_list::Test,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

/// Timing and metrics for a test in the configuration currently running.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActiveTest {
    /// Start of the test including setup.
    pub start_time: Option<DateTime<FixedOffset>>,

    /// End of the test including teardown.
    pub end_time: Option<DateTime<FixedOffset>>,

    /// Statistics from performance analysis.
    pub metrics: Option<PerfStats>,
}

#[derive(Debug, Default)]
struct Credentials {
    username: Option<String>,
    password: DebugIgnore<Option<String>>,
}

/// State shared by the engine, deployers, test code, and reporters for one invocation.
///
/// Test bodies, validators, and deployment hooks all receive a `&RunContext`. It is safe to read
/// from concurrently running tests.
#[derive(Debug)]
pub struct RunContext {
    init_time: DateTime<FixedOffset>,
    output_dir: Utf8PathBuf,
    credentials: RwLock<Credentials>,
    machines: RwLock<IndexMap<String, String>>,
    deployers: DeployerRegistry,
    active_config: RwLock<Option<Configuration>>,
    active_tests: RwLock<IndexMap<String, ActiveTest>>,
    collector: Mutex<ResultsCollector>,
}

impl RunContext {
    /// Creates a new context writing output to `output_dir`.
    pub fn new(output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self::with_init_time(output_dir, now())
    }

    /// Creates a new context with an explicit initialization time.
    pub fn with_init_time(output_dir: impl Into<Utf8PathBuf>, init_time: DateTime<FixedOffset>) -> Self {
        Self {
            init_time,
            output_dir: output_dir.into(),
            credentials: RwLock::default(),
            machines: RwLock::default(),
            deployers: DeployerRegistry::new(),
            active_config: RwLock::default(),
            active_tests: RwLock::default(),
            collector: Mutex::new(ResultsCollector::new(init_time)),
        }
    }

    /// Returns the default output directory for a run started at `init_time`:
    /// `zopkio_<YYYYmmdd_HHMMSS>` under `base`.
    pub fn default_output_dir(base: &Utf8Path, init_time: DateTime<FixedOffset>) -> Utf8PathBuf {
        base.join(init_time.format("zopkio_%Y%m%d_%H%M%S").to_string())
    }

    /// Returns when this run was initialized.
    pub fn init_time(&self) -> DateTime<FixedOffset> {
        self.init_time
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Returns the directory reports are written under.
    pub fn reports_dir(&self) -> Utf8PathBuf {
        self.output_dir.join("reports")
    }

    /// Sets the credentials used by deployers to reach remote hosts.
    pub fn set_user(&self, username: Option<String>, password: Option<String>) {
        let mut credentials = write(&self.credentials);
        credentials.username = username;
        credentials.password = DebugIgnore(password);
    }

    /// Returns the user name of the user running the suite.
    pub fn username(&self) -> Option<String> {
        read(&self.credentials).username.clone()
    }

    /// Returns the password of the user running the suite.
    pub fn password(&self) -> Option<String> {
        read(&self.credentials).password.0.clone()
    }

    /// Sets the mapping from logical machine names to physical hosts.
    pub fn set_machines(&self, machines: IndexMap<String, String>) {
        *write(&self.machines) = machines;
    }

    /// Returns the physical host for a logical machine name.
    pub fn get_machine(&self, machine_name: &str) -> Option<String> {
        read(&self.machines).get(machine_name).cloned()
    }

    /// Returns the deployer registry.
    pub fn deployers(&self) -> &DeployerRegistry {
        &self.deployers
    }

    /// Returns the results collector.
    pub fn collector(&self) -> MutexGuard<'_, ResultsCollector> {
        self.collector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_active_config(&self, config: &Configuration) {
        *write(&self.active_config) = Some(config.clone());
    }

    /// Returns the value of a key in the configuration currently running.
    pub fn active_config(&self, key: &str) -> Option<Value> {
        read(&self.active_config)
            .as_ref()
            .and_then(|config| config.get(key).cloned())
    }

    /// Returns the value of a key in the configuration currently running, or `default`.
    pub fn active_config_or(&self, key: &str, default: Value) -> Value {
        self.active_config(key).unwrap_or(default)
    }

    /// Returns the name of the configuration currently running.
    pub fn active_config_name(&self) -> Option<String> {
        read(&self.active_config)
            .as_ref()
            .map(|config| config.name().to_owned())
    }

    pub(crate) fn set_active_tests<'a>(&self, tests: impl IntoIterator<Item = &'a Test>) {
        let mut active_tests = write(&self.active_tests);
        for test in tests {
            active_tests.insert(
                test.name().to_owned(),
                ActiveTest {
                    start_time: test.start_time,
                    end_time: test.end_time,
                    metrics: test.perf.stats.clone(),
                },
            );
        }
    }

    pub(crate) fn clear_active_tests(&self) {
        write(&self.active_tests).clear();
    }

    /// Returns timing and metrics for a test in the configuration currently running.
    pub fn active_test(&self, test_name: &str) -> Option<ActiveTest> {
        read(&self.active_tests).get(test_name).cloned()
    }

    /// Returns the start time of a test in the configuration currently running.
    pub fn active_test_start_time(&self, test_name: &str) -> Option<DateTime<FixedOffset>> {
        self.active_test(test_name).and_then(|test| test.start_time)
    }

    /// Returns the end time of a test in the configuration currently running.
    pub fn active_test_end_time(&self, test_name: &str) -> Option<DateTime<FixedOffset>> {
        self.active_test(test_name).and_then(|test| test.end_time)
    }

    /// Returns the performance metrics of a test in the configuration currently running.
    pub fn active_test_metrics(&self, test_name: &str) -> Option<PerfStats> {
        self.active_test(test_name).and_then(|test| test.metrics)
    }

    /// Clears everything back to a fresh state, keeping the init time and output directory.
    pub fn reset(&self) {
        *write(&self.credentials) = Credentials::default();
        write(&self.machines).clear();
        self.deployers.reset();
        *write(&self.active_config) = None;
        self.clear_active_tests();
        *self.collector() = ResultsCollector::new(self.init_time);
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
