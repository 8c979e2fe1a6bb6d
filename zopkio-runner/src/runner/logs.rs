// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval of logs from deployed processes.

use crate::{
    config::EngineOptions, context::RunContext, errors::DisplayErrorChain, log_source::LogSource,
};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

/// Resolved locations for fetched logs and performance-analysis output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct LogDirs {
    pub(super) logs_dir: Utf8PathBuf,
    pub(super) output_dir: Utf8PathBuf,
}

impl LogDirs {
    /// The master configuration wins over the log source, which wins over the run's output
    /// directory.
    pub(super) fn resolve(
        options: &EngineOptions,
        log_source: &dyn LogSource,
        ctx: &RunContext,
    ) -> Self {
        let logs_dir = options
            .logs_directory
            .clone()
            .or_else(|| log_source.logs_directory().map(Utf8Path::to_path_buf))
            .unwrap_or_else(|| ctx.output_dir().join("logs"));
        let output_dir = options
            .output_directory
            .clone()
            .or_else(|| log_source.output_directory().map(Utf8Path::to_path_buf))
            .unwrap_or_else(|| ctx.output_dir().to_path_buf());
        Self {
            logs_dir,
            output_dir,
        }
    }
}

/// Copies logs from every process of every registered deployer into `logs_dir`.
///
/// Failures are logged and otherwise ignored: missing logs never change a test's result.
pub(super) fn fetch_all_logs(ctx: &RunContext, log_source: &dyn LogSource, logs_dir: &Utf8Path) {
    if let Err(err) = std::fs::create_dir_all(logs_dir) {
        warn!(
            "failed to create logs directory {logs_dir}: {}",
            DisplayErrorChain::new(err)
        );
        return;
    }

    for deployer in ctx.deployers().all() {
        for process in deployer.get_processes() {
            let mut logs = log_source.machine_logs(&process.unique_id);
            logs.extend(log_source.naarad_logs(&process.unique_id));
            logs.extend(log_source.process_logs(&process.service_name));
            let pattern = log_source.log_pattern(&process.unique_id);

            debug!(
                unique_id = %process.unique_id,
                count = logs.len(),
                "fetching logs into {logs_dir}"
            );
            if let Err(err) = deployer.fetch_logs(&process.unique_id, &logs, logs_dir, &pattern) {
                warn!(
                    "failed to fetch logs for {}: {}",
                    process.unique_id,
                    DisplayErrorChain::new(err)
                );
            }
        }
    }
}

/// Terminates every process started by any registered deployer.
pub(super) fn kill_all_processes(ctx: &RunContext) {
    for deployer in ctx.deployers().all() {
        if let Err(err) = deployer.kill_all_process() {
            warn!(
                "failed to kill deployed processes: {}",
                DisplayErrorChain::new(err)
            );
        }
    }
}
