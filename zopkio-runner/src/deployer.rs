// Copyright (c) The zopkio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deployment hooks and the registry of remote processes.
//!
//! zopkio does not know how services are deployed. A suite supplies a [`Deployment`] whose hooks
//! run around configurations and tests, and registers [`Deployer`]s that install, start, and stop
//! remote processes. The engine only ever fetches logs from deployers and kills their processes
//! once a configuration finishes.

use crate::{
    config::ConfigMap,
    context::RunContext,
    errors::DeployError,
    outcome::{UnitFn, UnitResult},
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use indexmap::IndexMap;
use regex::Regex;
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

/// Hooks run around configurations and tests. Every hook defaults to a no-op.
pub trait Deployment: Send + Sync {
    /// Runs once per configuration, before any test.
    fn setup_suite(&self, _ctx: &RunContext) -> UnitResult {
        Ok(())
    }

    /// Runs once per configuration, after every test. Runs even if `setup_suite` failed.
    fn teardown_suite(&self, _ctx: &RunContext) -> UnitResult {
        Ok(())
    }

    /// Runs once per test, or once per concurrent group of tests.
    fn setup(&self, _ctx: &RunContext) -> UnitResult {
        Ok(())
    }

    /// Runs once per test, or once per concurrent group of tests. Runs even if `setup` failed.
    fn teardown(&self, _ctx: &RunContext) -> UnitResult {
        Ok(())
    }
}

/// A [`Deployment`] assembled from optional closures.
#[derive(Clone, Debug, Default)]
pub struct DeploymentHooks {
    setup_suite: Option<DebugIgnore<UnitFn>>,
    teardown_suite: Option<DebugIgnore<UnitFn>>,
    setup: Option<DebugIgnore<UnitFn>>,
    teardown: Option<DebugIgnore<UnitFn>>,
}

macro_rules! hook_setter {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        pub fn $name<F>(mut self, f: F) -> Self
        where
            F: Fn(&RunContext) -> UnitResult + Send + Sync + 'static,
        {
            let f: UnitFn = Arc::new(f);
            self.$name = Some(DebugIgnore(f));
            self
        }
    };
}

impl DeploymentHooks {
    /// Creates a set of hooks that all do nothing.
    pub fn new() -> Self {
        Self::default()
    }

    hook_setter!(setup_suite, "Sets the `setup_suite` hook.");
    hook_setter!(teardown_suite, "Sets the `teardown_suite` hook.");
    hook_setter!(setup, "Sets the `setup` hook.");
    hook_setter!(teardown, "Sets the `teardown` hook.");
}

fn call_hook(hook: Option<&DebugIgnore<UnitFn>>, ctx: &RunContext) -> UnitResult {
    match hook {
        Some(hook) => (hook.0)(ctx),
        None => Ok(()),
    }
}

impl Deployment for DeploymentHooks {
    fn setup_suite(&self, ctx: &RunContext) -> UnitResult {
        call_hook(self.setup_suite.as_ref(), ctx)
    }

    fn teardown_suite(&self, ctx: &RunContext) -> UnitResult {
        call_hook(self.teardown_suite.as_ref(), ctx)
    }

    fn setup(&self, ctx: &RunContext) -> UnitResult {
        call_hook(self.setup.as_ref(), ctx)
    }

    fn teardown(&self, ctx: &RunContext) -> UnitResult {
        call_hook(self.teardown.as_ref(), ctx)
    }
}

/// A service installed on a host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Process {
    /// The logical name of the process, unique within a run.
    pub unique_id: String,

    /// The type of service.
    pub service_name: String,

    /// The host the service is on.
    pub hostname: String,

    /// Where the service is installed on the host.
    pub install_path: Option<Utf8PathBuf>,
}

/// A signal that can be sent to a remote process.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Signal {
    /// `SIGSTOP`.
    Stop,

    /// `SIGCONT`.
    Continue,

    /// `SIGKILL`.
    Kill,

    /// `SIGTERM`.
    Terminate,

    /// `SIGHUP`.
    Hangup,
}

impl Signal {
    /// Returns the operation name used in errors.
    pub fn operation(self) -> &'static str {
        match self {
            Signal::Stop => "pause",
            Signal::Continue => "resume",
            Signal::Kill => "kill",
            Signal::Terminate => "terminate",
            Signal::Hangup => "hangup",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Stop => "SIGSTOP",
            Signal::Continue => "SIGCONT",
            Signal::Kill => "SIGKILL",
            Signal::Terminate => "SIGTERM",
            Signal::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Installs, starts, and stops remote processes, and keeps track of them.
///
/// Deployers are shared across threads, so implementations keep their process table behind
/// interior mutability. Callers must not issue conflicting operations on the same process
/// concurrently.
pub trait Deployer: Send + Sync {
    /// Installs the service.
    fn install(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError>;

    /// Starts the service.
    fn start(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError>;

    /// Stops the service.
    fn stop(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError>;

    /// Uninstalls the service, cleaning up every directory it touched.
    fn uninstall(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError>;

    /// Returns the pids of the process. Empty if the process isn't running.
    fn get_pid(&self, unique_id: &str, configs: &ConfigMap) -> Result<Vec<u32>, DeployError>;

    /// Returns the host of the process, if known.
    fn get_host(&self, unique_id: &str) -> Option<String>;

    /// Returns every process started by this deployer.
    fn get_processes(&self) -> Vec<Process>;

    /// Copies `logs` from the process's host into `dest`, along with any files under its install
    /// path matching `pattern`.
    fn fetch_logs(
        &self,
        unique_id: &str,
        logs: &[Utf8PathBuf],
        dest: &Utf8Path,
        pattern: &Regex,
    ) -> Result<(), DeployError>;

    /// Terminates every process this deployer started.
    fn kill_all_process(&self) -> Result<(), DeployError>;

    /// Sends a signal to the process.
    fn send_signal(
        &self,
        _unique_id: &str,
        signal: Signal,
        _configs: &ConfigMap,
    ) -> Result<(), DeployError> {
        Err(DeployError::Unsupported {
            operation: signal.operation(),
        })
    }

    /// Installs and starts the service.
    fn deploy(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.install(unique_id, configs)?;
        self.start(unique_id, configs)
    }

    /// Stops and uninstalls the service.
    fn undeploy(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.stop(unique_id, configs)?;
        self.uninstall(unique_id, configs)
    }

    /// Stops and restarts the service.
    fn soft_bounce(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.stop(unique_id, configs)?;
        self.start(unique_id, configs)
    }

    /// Kills and restarts the service.
    fn hard_bounce(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.kill(unique_id, configs)?;
        self.start(unique_id, configs)
    }

    /// Pauses the process for `delay`, then resumes it.
    fn sleep(&self, unique_id: &str, delay: Duration, configs: &ConfigMap) -> Result<(), DeployError> {
        self.pause(unique_id, configs)?;
        std::thread::sleep(delay);
        self.resume(unique_id, configs)
    }

    /// Sends `SIGSTOP` to the process.
    fn pause(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.send_signal(unique_id, Signal::Stop, configs)
    }

    /// Sends `SIGCONT` to the process.
    fn resume(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.send_signal(unique_id, Signal::Continue, configs)
    }

    /// Sends `SIGKILL` to the process.
    fn kill(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.send_signal(unique_id, Signal::Kill, configs)
    }

    /// Sends `SIGTERM` to the process.
    fn terminate(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.send_signal(unique_id, Signal::Terminate, configs)
    }

    /// Sends `SIGHUP` to the process.
    fn hangup(&self, unique_id: &str, configs: &ConfigMap) -> Result<(), DeployError> {
        self.send_signal(unique_id, Signal::Hangup, configs)
    }
}

/// Name-keyed registry of the deployers active in a run.
#[derive(Default)]
pub struct DeployerRegistry {
    deployers: RwLock<IndexMap<String, Arc<dyn Deployer>>>,
}

impl DeployerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the deployer for a service, replacing any previous one.
    pub fn set(&self, service_name: impl Into<String>, deployer: Arc<dyn Deployer>) {
        self.write().insert(service_name.into(), deployer);
    }

    /// Returns the deployer for a service.
    pub fn get(&self, service_name: &str) -> Option<Arc<dyn Deployer>> {
        self.read().get(service_name).cloned()
    }

    /// Removes the deployer for a service, if it exists.
    pub fn remove(&self, service_name: &str) -> Option<Arc<dyn Deployer>> {
        self.write().shift_remove(service_name)
    }

    /// Removes every deployer.
    pub fn reset(&self) {
        self.write().clear();
    }

    /// Returns every deployer, in registration order.
    pub fn all(&self) -> Vec<Arc<dyn Deployer>> {
        self.read().values().cloned().collect()
    }

    /// Returns the number of registered deployers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no deployers are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, Arc<dyn Deployer>>> {
        self.deployers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, Arc<dyn Deployer>>> {
        self.deployers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DeployerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployerRegistry")
            .field("services", &self.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
