// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reusable fault-injection test bodies.
//!
//! These recipes stop a randomly chosen process, bring it back, and wait for the system to report
//! that it recovered. They are meant to be called from test bodies.

use crate::{
    config::ConfigMap,
    deployer::{Deployer, DeployerRegistry},
    errors::RecoveryError,
};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, warn};

/// A predicate that returns true once a process has recovered.
pub type RecoveryCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// How to restart and verify each process a recipe may kill.
#[derive(Clone, Debug)]
pub struct RecoveryPlan {
    restart_configs: IndexMap<String, ConfigMap>,
    verify_recovery: IndexMap<String, DebugIgnore<RecoveryCheck>>,
    timeouts: IndexMap<String, Duration>,
    default_timeout: Duration,
    poll_interval: Duration,
}

impl Default for RecoveryPlan {
    fn default() -> Self {
        Self {
            restart_configs: IndexMap::new(),
            verify_recovery: IndexMap::new(),
            timeouts: IndexMap::new(),
            default_timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RecoveryPlan {
    /// How long to wait for recovery when no timeout is set for a process.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// How often recovery predicates are polled by default.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration a process is restarted with.
    pub fn restart_config(mut self, unique_id: impl Into<String>, configs: ConfigMap) -> Self {
        self.restart_configs.insert(unique_id.into(), configs);
        self
    }

    /// Sets the predicate polled after a process is restarted.
    pub fn verify_recovery<F>(mut self, unique_id: impl Into<String>, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let check: RecoveryCheck = Arc::new(check);
        self.verify_recovery
            .insert(unique_id.into(), DebugIgnore(check));
        self
    }

    /// Sets how long a process may take to recover.
    pub fn timeout(mut self, unique_id: impl Into<String>, timeout: Duration) -> Self {
        self.timeouts.insert(unique_id.into(), timeout);
        self
    }

    /// Sets how often recovery predicates are polled.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Polls `predicate` every `poll_interval` until it returns true or `timeout` passes.
///
/// Returns whether the predicate succeeded. It is always called at least once. A timeout too
/// large to represent as an [`Instant`], such as [`Duration::MAX`], waits forever.
pub fn wait_until(
    mut predicate: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if predicate() {
            return true;
        }
        let sleep_for = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                poll_interval.min(deadline - now)
            }
            None => poll_interval,
        };
        std::thread::sleep(sleep_for);
    }
}

/// Stops one randomly chosen process, restarts it, and waits for it to recover.
///
/// Returns the id of the process that was killed. A process without a restart configuration is
/// left stopped, and one without a recovery predicate is not waited on.
pub fn kill_recovery(
    deployer: &dyn Deployer,
    process_ids: &[String],
    plan: &RecoveryPlan,
) -> Result<String, RecoveryError> {
    let unique_id = process_ids
        .choose(&mut rand::rng())
        .ok_or(RecoveryError::NoProcesses)?
        .clone();

    info!(%unique_id, "stopping process");
    deployer
        .stop(&unique_id, &ConfigMap::new())
        .map_err(|err| RecoveryError::Deploy {
            operation: "stop",
            unique_id: unique_id.clone(),
            err,
        })?;

    match plan.restart_configs.get(&unique_id) {
        Some(configs) => {
            deployer
                .start(&unique_id, configs)
                .map_err(|err| RecoveryError::Deploy {
                    operation: "start",
                    unique_id: unique_id.clone(),
                    err,
                })?;
        }
        None => warn!(%unique_id, "no restart configuration, leaving the process stopped"),
    }

    if let Some(check) = plan.verify_recovery.get(&unique_id) {
        let timeout = plan
            .timeouts
            .get(&unique_id)
            .copied()
            .unwrap_or(plan.default_timeout);
        if !wait_until(|| (check.0)(), timeout, plan.poll_interval) {
            return Err(RecoveryError::Timeout { unique_id, timeout });
        }
        info!(%unique_id, "process recovered");
    }

    Ok(unique_id)
}

/// Picks a random deployer among `service_names` and applies [`kill_recovery`] to it.
///
/// Candidate processes come from `process_ids` if it has an entry for the service, otherwise
/// from every process the deployer reports. Plans are looked up by service name.
pub fn kill_random_deployer_process(
    registry: &DeployerRegistry,
    service_names: &[&str],
    process_ids: &IndexMap<String, Vec<String>>,
    plans: &IndexMap<String, RecoveryPlan>,
) -> Result<String, RecoveryError> {
    let candidates: Vec<_> = service_names
        .iter()
        .filter_map(|name| registry.get(name).map(|deployer| (*name, deployer)))
        .collect();
    let (service_name, deployer) = candidates
        .choose(&mut rand::rng())
        .ok_or(RecoveryError::NoDeployers)?;

    let ids = match process_ids.get(*service_name) {
        Some(ids) => ids.clone(),
        None => deployer
            .get_processes()
            .into_iter()
            .map(|process| process.unique_id)
            .collect(),
    };
    let default_plan = RecoveryPlan::default();
    let plan = plans.get(*service_name).unwrap_or(&default_plan);

    kill_recovery(deployer.as_ref(), &ids, plan)
}
