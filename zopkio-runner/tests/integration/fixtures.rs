// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use itertools::Itertools;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use zopkio_runner::{
    config::{ConfigMap, ConfigSet, Configuration, MASTER_CONFIG_NAME},
    context::RunContext,
    deployer::{Deployer, Deployment, Process},
    errors::DeployError,
    outcome::{BoxError, UnitResult},
    perf::{PerfAnalyzer, PerfRunId, PerfStats, SlaResult},
    runner::{RunEvent, RunStats, TestRunnerBuilder},
    test_list::{Test, TestList, TestModule},
};

/// A shared, ordered log of calls made by test bodies and hooks.
#[derive(Clone, Debug, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub(crate) fn record(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == call).count()
    }
}

/// Deployment hooks that record every call, and fail on request.
#[derive(Debug, Default)]
pub(crate) struct RecordingDeployment {
    log: CallLog,
    failing_suite_setups: Vec<String>,
    fail_setup: bool,
    fail_teardown: bool,
}

impl RecordingDeployment {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }

    pub(crate) fn fail_suite_setup_for(mut self, config_name: &str) -> Self {
        self.failing_suite_setups.push(config_name.to_owned());
        self
    }

    pub(crate) fn fail_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    pub(crate) fn fail_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }
}

fn config_name(ctx: &RunContext) -> String {
    ctx.active_config_name().unwrap_or_default()
}

impl Deployment for RecordingDeployment {
    fn setup_suite(&self, ctx: &RunContext) -> UnitResult {
        let name = config_name(ctx);
        self.log.record(format!("setup_suite:{name}"));
        if self.failing_suite_setups.contains(&name) {
            return Err(format!("cannot provision {name}").into());
        }
        Ok(())
    }

    fn teardown_suite(&self, ctx: &RunContext) -> UnitResult {
        self.log.record(format!("teardown_suite:{}", config_name(ctx)));
        Ok(())
    }

    fn setup(&self, _ctx: &RunContext) -> UnitResult {
        self.log.record("setup");
        if self.fail_setup {
            return Err("broker did not come up".into());
        }
        Ok(())
    }

    fn teardown(&self, _ctx: &RunContext) -> UnitResult {
        self.log.record("teardown");
        if self.fail_teardown {
            panic!("broker refused to stop");
        }
        Ok(())
    }
}

/// A deployer that owns a fixed set of processes and records log fetches and kills.
///
/// Log fetches are recorded as `fetch_logs:<unique_id>:<logs>:<pattern>`, with the log paths
/// joined by commas.
#[derive(Debug)]
pub(crate) struct RecordingDeployer {
    log: CallLog,
    processes: Vec<Process>,
}

impl RecordingDeployer {
    pub(crate) fn new(log: &CallLog, service_name: &str, unique_ids: &[&str]) -> Self {
        let processes = unique_ids
            .iter()
            .map(|unique_id| Process {
                unique_id: (*unique_id).to_owned(),
                service_name: service_name.to_owned(),
                hostname: "localhost".to_owned(),
                install_path: None,
            })
            .collect();
        Self {
            log: log.clone(),
            processes,
        }
    }
}

impl Deployer for RecordingDeployer {
    fn install(&self, unique_id: &str, _: &ConfigMap) -> Result<(), DeployError> {
        self.log.record(format!("install:{unique_id}"));
        Ok(())
    }

    fn start(&self, unique_id: &str, _: &ConfigMap) -> Result<(), DeployError> {
        self.log.record(format!("start:{unique_id}"));
        Ok(())
    }

    fn stop(&self, unique_id: &str, _: &ConfigMap) -> Result<(), DeployError> {
        self.log.record(format!("stop:{unique_id}"));
        Ok(())
    }

    fn uninstall(&self, unique_id: &str, _: &ConfigMap) -> Result<(), DeployError> {
        self.log.record(format!("uninstall:{unique_id}"));
        Ok(())
    }

    fn get_pid(&self, _: &str, _: &ConfigMap) -> Result<Vec<u32>, DeployError> {
        Ok(Vec::new())
    }

    fn get_host(&self, unique_id: &str) -> Option<String> {
        self.processes
            .iter()
            .find(|process| process.unique_id == unique_id)
            .map(|process| process.hostname.clone())
    }

    fn get_processes(&self) -> Vec<Process> {
        self.processes.clone()
    }

    fn fetch_logs(
        &self,
        unique_id: &str,
        logs: &[Utf8PathBuf],
        dest: &Utf8Path,
        pattern: &Regex,
    ) -> Result<(), DeployError> {
        assert!(dest.is_dir(), "logs directory {dest} exists before fetching");
        self.log.record(format!(
            "fetch_logs:{unique_id}:{}:{pattern}",
            logs.iter().join(",")
        ));
        Ok(())
    }

    fn kill_all_process(&self) -> Result<(), DeployError> {
        self.log.record("kill_all_process");
        Ok(())
    }
}

/// An analyzer whose statistics for a capture are `{"capture": <id>}`.
#[derive(Debug, Default)]
pub(crate) struct StatsPerfAnalyzer {
    next_id: AtomicU64,
}

impl PerfAnalyzer for StatsPerfAnalyzer {
    fn signal_start(&self, _config: Option<&Utf8Path>) -> PerfRunId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        PerfRunId::new(format!("capture-{id}"))
    }

    fn signal_stop(&self, _id: &PerfRunId) {}

    fn analyze(&self, _logs_dir: &Utf8Path, _output_dir: &Utf8Path) -> Result<(), BoxError> {
        Ok(())
    }

    fn diff(&self, _current: &PerfRunId, _previous: &PerfRunId) -> Result<(), BoxError> {
        Ok(())
    }

    fn stats(&self, id: &PerfRunId) -> Option<PerfStats> {
        Some(json!({ "capture": id.as_str() }))
    }

    fn sla_results(&self, _id: &PerfRunId) -> Vec<SlaResult> {
        Vec::new()
    }
}

/// Builds a configuration mapping from key-value pairs.
pub(crate) fn mapping<const N: usize>(pairs: [(&str, Value); N]) -> ConfigMap {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

/// Builds a configuration set with the given master mapping and named variants.
pub(crate) fn config_set(master: ConfigMap, configs: Vec<(&str, ConfigMap)>) -> ConfigSet {
    ConfigSet::new(
        Configuration::new(MASTER_CONFIG_NAME, master),
        configs
            .into_iter()
            .map(|(name, mapping)| Configuration::new(name, mapping))
            .collect(),
    )
}

/// Everything left behind by a run.
pub(crate) struct RunOutput {
    pub(crate) ctx: RunContext,
    pub(crate) stats: RunStats,
    pub(crate) events: Vec<RunEvent>,
    pub(crate) test_list: TestList,
    // Keeps the output directory alive until the test finishes.
    _output_dir: Utf8TempDir,
}

impl RunOutput {
    /// Returns a copy of the collected result of a test.
    pub(crate) fn collected(&self, config_name: &str, test_name: &str) -> Test {
        self.ctx
            .collector()
            .test_result(config_name, test_name)
            .cloned()
            .unwrap_or_else(|| panic!("no collected result for {test_name} in {config_name}"))
    }

    /// Returns a copy of a collected configuration.
    pub(crate) fn collected_config(&self, config_name: &str) -> Configuration {
        self.ctx
            .collector()
            .config_result(config_name)
            .cloned()
            .unwrap_or_else(|| panic!("no collected configuration {config_name}"))
    }
}

/// Runs `modules` against `config_set` with the given deployment hooks.
pub(crate) fn run_suite(
    modules: &[TestModule],
    config_set: &mut ConfigSet,
    deployment: Arc<dyn Deployment>,
) -> Result<RunOutput> {
    run_suite_with(modules, config_set, deployment, |_, _| {})
}

/// Like [`run_suite`], but lets `customize` register deployers on the context and set up the
/// builder before the run starts.
pub(crate) fn run_suite_with(
    modules: &[TestModule],
    config_set: &mut ConfigSet,
    deployment: Arc<dyn Deployment>,
    customize: impl FnOnce(&RunContext, &mut TestRunnerBuilder),
) -> Result<RunOutput> {
    let output_dir = Utf8TempDir::new()?;
    let ctx = RunContext::new(output_dir.path());
    let mut test_list = TestList::discover(modules, None)?;

    let mut events = Vec::new();
    let stats = {
        let mut builder = TestRunnerBuilder::new();
        builder.set_deployment(deployment);
        customize(&ctx, &mut builder);
        let mut runner = builder.build(&ctx, &mut test_list, config_set)?;
        runner.execute(|event| events.push(event))
    };

    Ok(RunOutput {
        ctx,
        stats,
        events,
        test_list,
        _output_dir: output_dir,
    })
}
